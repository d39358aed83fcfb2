//! # Projection Pushdown Rule
//!
//! Inserts reduced Projections above join inputs so only attributes that
//! are consumed further up survive the join. Runs top-down in a single
//! pass, carrying the set of attributes the ancestors need.
//!
//! ## Transformation
//!
//! ```text
//! Before:                          After:
//! π [e.name]                       π [e.name]
//!   └─ σ [e.dept_id = d.id]          └─ σ [e.dept_id = d.id]
//!        └─ ×                             └─ ×
//!             ├─ Dept AS d                     ├─ π [d.id]
//!             └─ Emp AS e                      │    └─ Dept AS d
//!                                              └─ π [e.dept_id, e.name]
//!                                                   └─ Emp AS e
//! ```
//!
//! ## Safety rules
//!
//! - A `*` anywhere in the demand, or an unqualified attribute, disables
//!   insertion below that point: without a schema the rule cannot tell
//!   which side of a join provides the attribute.
//! - Correlated attributes inside `IN`/`EXISTS` subquery trees are added
//!   to the demand, so the columns a subquery reaches out for are never
//!   projected away beneath it.
//! - A side whose demand is empty is left bare rather than given an
//!   empty projection.
//!
//! Inserted columns are sorted by qualifier then name, and a side already
//! capped by a projection with the exact demanded set is not wrapped
//! again, so a second run reproduces the same tree and reports no change.

use super::transform_children;
use crate::algebra::{AlgebraNode, Attr, OutputColumn};
use crate::optimizer::trace::TraceRecorder;
use crate::optimizer::RewriteRule;
use bumpalo::Bump;
use eyre::Result;
use std::collections::HashSet;

pub struct ProjectionPushdown;

/// The attribute demand flowing down from the ancestors.
#[derive(Clone)]
struct Demand<'a> {
    /// A `SELECT *` above: everything is needed, no insertion below.
    star: bool,
    attrs: HashSet<Attr<'a>>,
}

impl<'a> Demand<'a> {
    fn everything() -> Self {
        Self {
            star: true,
            attrs: HashSet::new(),
        }
    }

    fn empty() -> Self {
        Self {
            star: false,
            attrs: HashSet::new(),
        }
    }

    fn add(&mut self, attr: Attr<'a>) {
        self.attrs.insert(attr);
    }

    fn has_unqualified(&self) -> bool {
        self.attrs.iter().any(|a| a.relation.is_none())
    }
}

impl RewriteRule for ProjectionPushdown {
    fn name(&self) -> &'static str {
        "projection_pushdown"
    }

    fn apply<'a>(
        &self,
        root: &'a AlgebraNode<'a>,
        arena: &'a Bump,
        _trace: &mut TraceRecorder<'a>,
    ) -> Result<Option<&'a AlgebraNode<'a>>> {
        let rebuilt = push(root, &Demand::everything(), arena);
        if rebuilt == root {
            Ok(None)
        } else {
            Ok(Some(rebuilt))
        }
    }
}

fn push<'a>(
    node: &'a AlgebraNode<'a>,
    demand: &Demand<'a>,
    arena: &'a Bump,
) -> &'a AlgebraNode<'a> {
    match node {
        AlgebraNode::Relation(_) => node,
        AlgebraNode::Projection(proj) => {
            let mut below = Demand::empty();
            for col in proj.columns {
                match col {
                    OutputColumn::Attr(a) => below.add(*a),
                    OutputColumn::Aggregate(call) => {
                        if let Some(arg) = call.arg {
                            below.add(arg);
                        }
                    }
                    OutputColumn::Star => below.star = true,
                }
            }
            let input = push(proj.input, &below, arena);
            AlgebraNode::projection(arena, input, proj.columns)
        }
        AlgebraNode::Selection(sel) => {
            let mut below = demand.clone();
            for attr in sel.predicate.referenced_attrs() {
                below.add(attr);
            }
            for subquery in node.predicate_subqueries() {
                for attr in correlated_attrs(subquery) {
                    below.add(attr);
                }
            }
            let input = push(sel.input, &below, arena);
            AlgebraNode::selection(arena, input, sel.predicate)
        }
        AlgebraNode::Order(ord) => {
            let mut below = demand.clone();
            for key in ord.keys {
                below.add(key.attr);
            }
            let input = push(ord.input, &below, arena);
            AlgebraNode::order(arena, input, ord.keys)
        }
        AlgebraNode::GroupAggregate(agg) => {
            // grouping resets the demand: only keys and aggregate
            // arguments exist below this point
            let mut below = Demand::empty();
            for key in agg.group_by {
                below.add(*key);
            }
            for call in agg.aggregates {
                if let Some(arg) = call.arg {
                    below.add(arg);
                }
            }
            let input = push(agg.input, &below, arena);
            AlgebraNode::group_aggregate(arena, input, agg.group_by, agg.aggregates)
        }
        AlgebraNode::Join(join) => {
            let mut full = demand.clone();
            if let Some(pred) = join.predicate {
                for attr in pred.referenced_attrs() {
                    full.add(attr);
                }
            }
            if full.star || full.has_unqualified() {
                // cannot split the demand by side; recurse without inserting
                let left = push(join.left, &Demand::everything(), arena);
                let right = push(join.right, &Demand::everything(), arena);
                return rebuild_join(arena, join.predicate, left, right);
            }

            let left = capped_side(join.left, &full, arena);
            let right = capped_side(join.right, &full, arena);
            rebuild_join(arena, join.predicate, left, right)
        }
        AlgebraNode::SemiJoin(_) | AlgebraNode::AntiJoin(_) => {
            // the correlation predicate spans both children; recurse
            // without inserting anything at this level
            transform_children(node, arena, &mut |child| {
                let rebuilt = push(child, &Demand::everything(), arena);
                Ok(if rebuilt == child { None } else { Some(rebuilt) })
            })
            .unwrap_or(None)
            .unwrap_or(node)
        }
    }
}

/// Recurses into one join side and caps it with a projection holding the
/// side's share of the demand.
fn capped_side<'a>(
    side: &'a AlgebraNode<'a>,
    full: &Demand<'a>,
    arena: &'a Bump,
) -> &'a AlgebraNode<'a> {
    let aliases = side.aliases_under();
    let mut wanted: Vec<Attr<'a>> = full
        .attrs
        .iter()
        .filter(|a| matches!(a.relation, Some(rel) if aliases.contains(rel)))
        .copied()
        .collect();

    if wanted.is_empty() {
        return push(side, &Demand::everything(), arena);
    }
    wanted.sort_by_key(|a| (a.relation, a.name));

    let mut below = Demand::empty();
    for attr in &wanted {
        below.add(*attr);
    }
    let rebuilt = push(side, &below, arena);

    if already_caps(rebuilt, &wanted) {
        return rebuilt;
    }
    let columns: Vec<OutputColumn<'a>> = wanted.into_iter().map(OutputColumn::Attr).collect();
    AlgebraNode::projection(arena, rebuilt, &columns)
}

/// Whether `node` is a projection exposing exactly the wanted attributes.
fn already_caps<'a>(node: &AlgebraNode<'a>, wanted: &[Attr<'a>]) -> bool {
    let AlgebraNode::Projection(proj) = node else {
        return false;
    };
    if proj.columns.len() != wanted.len() {
        return false;
    }
    let exposed: HashSet<Attr<'a>> = proj
        .columns
        .iter()
        .filter_map(|col| match col {
            OutputColumn::Attr(a) => Some(*a),
            _ => None,
        })
        .collect();
    exposed.len() == proj.columns.len() && wanted.iter().all(|a| exposed.contains(a))
}

/// Attributes a subquery tree references from enclosing scopes.
fn correlated_attrs<'a>(subquery: &'a AlgebraNode<'a>) -> Vec<Attr<'a>> {
    let inner_aliases = subquery.aliases_under();
    let mut out = Vec::new();
    let mut stack = vec![subquery];
    while let Some(node) = stack.pop() {
        for attr in node.own_attrs() {
            if matches!(attr.relation, Some(rel) if !inner_aliases.contains(rel)) {
                out.push(attr);
            }
        }
        stack.extend(node.inputs());
    }
    out
}

fn rebuild_join<'a>(
    arena: &'a Bump,
    predicate: Option<&'a crate::algebra::Predicate<'a>>,
    left: &'a AlgebraNode<'a>,
    right: &'a AlgebraNode<'a>,
) -> &'a AlgebraNode<'a> {
    match predicate {
        Some(pred) => AlgebraNode::join_on(arena, left, right, pred),
        None => AlgebraNode::cross(arena, left, right),
    }
}
