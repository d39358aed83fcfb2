//! # Selection Pushdown Rule
//!
//! Moves Selections as close to their base relations as the predicate's
//! attribute references allow, so filters run before joins multiply rows.
//!
//! ## Pushdown conditions
//!
//! | Child of σ | Can move below | Condition |
//! |------------|----------------|-----------|
//! | Join | One side | All qualified refs on that side |
//! | Projection | Yes | Every ref exposed as a plain column |
//! | Order | Yes | Always |
//! | Selection | Yes | The moved filter keeps sinking below it |
//! | GroupAggregate | No | HAVING promotion is a later stage |
//! | Relation | No | The selection is at rest |
//!
//! Two stacked Selections commute, but swapping them unconditionally
//! would oscillate; the swap happens only when the outer filter actually
//! sinks past the inner one's input, so every rewrite moves a predicate
//! strictly closer to a leaf.
//!
//! A predicate with no qualified attribute references (a constant filter,
//! or one the front-end could not qualify) is never moved: without a
//! schema there is no safe way to pick a join side for it.
//!
//! ## Transformation
//!
//! ```text
//! Before:                      After:
//! σ [d.region = 'West']        ⨝
//!   └─ ⨝                         ├─ σ [d.region = 'West']
//!        ├─ Dept AS d            │    └─ Dept AS d
//!        └─ Emp AS e             └─ Emp AS e
//! ```
//!
//! One pass moves each candidate Selection one level; the engine re-runs
//! the rule until a full traversal changes nothing. When unnesting is
//! enabled, every visited Selection is first offered to the unnesting
//! module, so `IN`/`EXISTS` predicates are rewritten before they sink.

use super::{transform_children, unnesting};
use crate::algebra::{AlgebraNode, OutputColumn, SelectionNode};
use crate::optimizer::trace::TraceRecorder;
use crate::optimizer::RewriteRule;
use bumpalo::Bump;
use eyre::Result;
use std::collections::HashSet;

pub struct SelectionPushdown {
    unnesting_enabled: bool,
}

impl SelectionPushdown {
    pub fn new(unnesting_enabled: bool) -> Self {
        Self { unnesting_enabled }
    }
}

impl RewriteRule for SelectionPushdown {
    fn name(&self) -> &'static str {
        "selection_pushdown"
    }

    fn apply<'a>(
        &self,
        root: &'a AlgebraNode<'a>,
        arena: &'a Bump,
        trace: &mut TraceRecorder<'a>,
    ) -> Result<Option<&'a AlgebraNode<'a>>> {
        self.transform(root, arena, trace)
    }
}

impl SelectionPushdown {
    fn transform<'a>(
        &self,
        node: &'a AlgebraNode<'a>,
        arena: &'a Bump,
        trace: &mut TraceRecorder<'a>,
    ) -> Result<Option<&'a AlgebraNode<'a>>> {
        if let AlgebraNode::Selection(sel) = node {
            if self.unnesting_enabled {
                if let Some(unnested) = unnesting::try_unnest(sel, arena, trace)? {
                    return Ok(Some(unnested));
                }
            }

            if let Some(moved) = self.try_push(sel, arena) {
                return Ok(Some(moved));
            }

            if let Some(new_input) = self.transform(sel.input, arena, trace)? {
                return Ok(Some(AlgebraNode::selection(arena, new_input, sel.predicate)));
            }
            return Ok(None);
        }

        transform_children(node, arena, &mut |child| self.transform(child, arena, trace))
    }

    /// Moves `sel` one level below its child if safe. Returns the subtree
    /// that replaces `sel`, or `None` when the selection is at rest here.
    fn try_push<'a>(
        &self,
        sel: &SelectionNode<'a>,
        arena: &'a Bump,
    ) -> Option<&'a AlgebraNode<'a>> {
        let involved: HashSet<&str> = sel
            .predicate
            .referenced_attrs()
            .iter()
            .filter_map(|attr| attr.relation)
            .collect();
        if involved.is_empty() {
            return None;
        }

        match sel.input {
            AlgebraNode::Join(join) => {
                let left_aliases = join.left.aliases_under();
                if involved.is_subset(&left_aliases) {
                    let new_left = AlgebraNode::selection(arena, join.left, sel.predicate);
                    return Some(rebuild_join(arena, new_left, join.right, join.predicate));
                }
                let right_aliases = join.right.aliases_under();
                if involved.is_subset(&right_aliases) {
                    let new_right = AlgebraNode::selection(arena, join.right, sel.predicate);
                    return Some(rebuild_join(arena, join.left, new_right, join.predicate));
                }
                // straddles both sides: stays for joinization
                None
            }
            AlgebraNode::Projection(proj) => {
                if predicate_covered_by(sel, proj.columns) {
                    let filtered = AlgebraNode::selection(arena, proj.input, sel.predicate);
                    return Some(AlgebraNode::projection(arena, filtered, proj.columns));
                }
                None
            }
            AlgebraNode::Order(ord) => {
                let filtered = AlgebraNode::selection(arena, ord.input, sel.predicate);
                Some(AlgebraNode::order(arena, filtered, ord.keys))
            }
            AlgebraNode::Selection(inner) => {
                let synthetic = SelectionNode {
                    input: inner.input,
                    predicate: sel.predicate,
                };
                let moved = self.try_push(&synthetic, arena)?;
                Some(AlgebraNode::selection(arena, moved, inner.predicate))
            }
            _ => None,
        }
    }
}

fn rebuild_join<'a>(
    arena: &'a Bump,
    left: &'a AlgebraNode<'a>,
    right: &'a AlgebraNode<'a>,
    predicate: Option<&'a crate::algebra::Predicate<'a>>,
) -> &'a AlgebraNode<'a> {
    match predicate {
        Some(pred) => AlgebraNode::join_on(arena, left, right, pred),
        None => AlgebraNode::cross(arena, left, right),
    }
}

/// Every attribute the predicate references must be exposed by the
/// projection as a plain column; an aggregate alias does not count, since
/// the underlying attribute does not exist below the projection.
fn predicate_covered_by(sel: &SelectionNode<'_>, columns: &[OutputColumn<'_>]) -> bool {
    sel.predicate.referenced_attrs().iter().all(|needed| {
        columns.iter().any(|col| match col {
            OutputColumn::Attr(exposed) => exposed.matches(needed),
            OutputColumn::Star => true,
            OutputColumn::Aggregate(_) => false,
        })
    })
}
