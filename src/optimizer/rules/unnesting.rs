//! # Subquery Unnesting
//!
//! Rewrites `attr IN (subquery)` and `EXISTS (subquery)` Selections into
//! semijoins, and their negations into antijoins, when the subquery is
//! correlated to the outer block through exactly one equality conjunct.
//!
//! ## Transformation
//!
//! ```text
//! Before:                                     After:
//! σ [o.x IN (subquery)]                       ⋉ [t.z = o.w]
//!   └─ outer               where subquery =     ├─ outer
//!                          π [t.y]              └─ π [t.y]
//!                            └─ σ [t.z = o.w]        └─ T AS t
//!                                 └─ T AS t
//! ```
//!
//! The correlation Selection is spliced out of the subquery tree and its
//! equality becomes the semijoin/antijoin predicate; the rest of the
//! subquery tree (its own projection and local filters) becomes the inner
//! child unchanged.
//!
//! ## Unsupported shapes
//!
//! Left untouched and flagged once in the trace:
//! - zero or more than one correlated conjunct,
//! - correlation through anything but an attribute equality,
//! - a subquery containing a GroupAggregate (no provable one-to-one
//!   correlation without functional-dependency reasoning).
//!
//! This is not a standalone pipeline stage: selection pushdown consults it
//! for every Selection it visits, before moving the Selection anywhere, so
//! subquery predicates are seen before they are pushed further down.

use crate::algebra::{AlgebraNode, Predicate, Scalar, SelectionNode};
use crate::optimizer::trace::TraceRecorder;
use bumpalo::Bump;
use eyre::Result;
use std::collections::HashSet;

/// Trace entries from unnesting are recorded under this name.
pub(crate) const RULE_NAME: &str = "unnesting";

enum Correlation<'a> {
    /// Exactly one correlated equality, held by this Selection node.
    Single {
        selection: &'a AlgebraNode<'a>,
        equality: &'a Predicate<'a>,
    },
    Unsupported(&'static str),
}

/// Attempts to rewrite one Selection wrapping an `IN`/`EXISTS` predicate.
/// Returns `Ok(None)` and leaves the tree alone for every shape outside
/// the supported pattern.
pub(crate) fn try_unnest<'a>(
    sel: &SelectionNode<'a>,
    arena: &'a Bump,
    trace: &mut TraceRecorder<'a>,
) -> Result<Option<&'a AlgebraNode<'a>>> {
    let (subquery, negated) = match sel.predicate {
        Predicate::InSubquery {
            subquery, negated, ..
        } => (*subquery, *negated),
        Predicate::Exists { subquery, negated } => (*subquery, *negated),
        _ => return Ok(None),
    };

    match find_correlation(subquery) {
        Correlation::Single {
            selection,
            equality,
        } => {
            let inner = remove_node(subquery, selection, arena);
            let rewritten = if negated {
                AlgebraNode::anti_join(arena, sel.input, inner, equality)
            } else {
                AlgebraNode::semi_join(arena, sel.input, inner, equality)
            };
            Ok(Some(rewritten))
        }
        Correlation::Unsupported(reason) => {
            trace.record_skip(
                RULE_NAME,
                subquery,
                format!("not unnested — unsupported shape: {}", reason),
            );
            Ok(None)
        }
    }
}

fn find_correlation<'a>(subquery: &'a AlgebraNode<'a>) -> Correlation<'a> {
    if contains_aggregate(subquery) {
        return Correlation::Unsupported("aggregate subquery");
    }

    let inner_aliases = subquery.aliases_under();
    let mut found: Option<(&'a AlgebraNode<'a>, &'a Predicate<'a>)> = None;

    let mut stack = vec![subquery];
    while let Some(node) = stack.pop() {
        if let AlgebraNode::Selection(sel) = node {
            if references_outer(sel.predicate, &inner_aliases) {
                if !is_attr_equality(sel.predicate) {
                    return Correlation::Unsupported("non-equality correlation");
                }
                if found.is_some() {
                    return Correlation::Unsupported("multi-predicate correlation");
                }
                found = Some((node, sel.predicate));
            }
        }
        stack.extend(node.inputs());
    }

    match found {
        Some((selection, equality)) => Correlation::Single {
            selection,
            equality,
        },
        None => Correlation::Unsupported("no correlated equality"),
    }
}

/// True when the predicate references a qualified attribute whose relation
/// is not part of the subquery itself.
fn references_outer<'a>(pred: &Predicate<'a>, inner_aliases: &HashSet<&'a str>) -> bool {
    pred.referenced_attrs()
        .iter()
        .any(|attr| matches!(attr.relation, Some(rel) if !inner_aliases.contains(rel)))
}

fn is_attr_equality(pred: &Predicate<'_>) -> bool {
    matches!(
        pred,
        Predicate::Compare {
            left: Scalar::Attr(_),
            op: crate::algebra::CmpOp::Eq,
            right: Scalar::Attr(_),
        }
    )
}

fn contains_aggregate(node: &AlgebraNode<'_>) -> bool {
    if matches!(node, AlgebraNode::GroupAggregate(_)) {
        return true;
    }
    node.inputs().iter().any(|child| contains_aggregate(child))
}

/// Rebuilds `root` with the Selection `target` replaced by its input.
/// Identity is by node address: the caller found `target` inside `root`.
fn remove_node<'a>(
    root: &'a AlgebraNode<'a>,
    target: &'a AlgebraNode<'a>,
    arena: &'a Bump,
) -> &'a AlgebraNode<'a> {
    if std::ptr::eq(root, target) {
        if let AlgebraNode::Selection(sel) = root {
            return sel.input;
        }
    }
    let children = root.inputs();
    if children.is_empty() {
        return root;
    }
    let new_children: smallvec::SmallVec<[&'a AlgebraNode<'a>; 2]> = children
        .iter()
        .map(|child| remove_node(child, target, arena))
        .collect();
    root.with_inputs(&new_children, arena)
}
