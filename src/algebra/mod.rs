//! # Relational-Algebra Tree
//!
//! The canonical tree a parsed single-block SELECT lowers into, and the
//! structural operations the rewrite rules are built on. Nodes carry no
//! behavior beyond structure: attribute collection, alias collection,
//! child access/reconstruction, and the render hook in [`render`].
//!
//! ## Operators
//!
//! | Variant | Symbol | Children |
//! |---------|--------|----------|
//! | `Relation` | table AS alias | 0 |
//! | `Selection` | σ | 1 |
//! | `Projection` | π | 1 |
//! | `Join` | ⨝ (× when no predicate) | 2 |
//! | `GroupAggregate` | γ | 1 |
//! | `Order` | τ | 1 |
//! | `SemiJoin` | ⋉ | 2 (outer, inner) |
//! | `AntiJoin` | ▷ | 2 (outer, inner) |
//!
//! ## Memory model
//!
//! All nodes are arena-allocated and immutable. A rewrite allocates new
//! nodes for the path it changes and reuses unchanged subtrees by
//! reference; old roots stay valid for the lifetime of the arena, which is
//! what makes trace snapshots independent of later stages.

pub mod expr;
pub mod render;
pub mod validate;

pub use expr::{AggregateCall, AggregateFunc, Attr, CmpOp, Predicate, Scalar};
pub use validate::UnresolvedAttribute;

use bumpalo::Bump;
use smallvec::SmallVec;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub enum AlgebraNode<'a> {
    Relation(RelationNode<'a>),
    Selection(SelectionNode<'a>),
    Projection(ProjectionNode<'a>),
    Join(JoinNode<'a>),
    GroupAggregate(GroupAggregateNode<'a>),
    Order(OrderNode<'a>),
    SemiJoin(CorrelatedJoinNode<'a>),
    AntiJoin(CorrelatedJoinNode<'a>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationNode<'a> {
    pub table: &'a str,
    pub alias: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionNode<'a> {
    pub input: &'a AlgebraNode<'a>,
    pub predicate: &'a Predicate<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionNode<'a> {
    pub input: &'a AlgebraNode<'a>,
    pub columns: &'a [OutputColumn<'a>],
}

/// One entry of a Projection's ordered output list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputColumn<'a> {
    Attr(Attr<'a>),
    Aggregate(AggregateCall<'a>),
    /// `SELECT *`; resolved only by the consumer, never by the optimizer.
    Star,
}

/// Inner join. `predicate: None` is a cross product awaiting joinization.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode<'a> {
    pub left: &'a AlgebraNode<'a>,
    pub right: &'a AlgebraNode<'a>,
    pub predicate: Option<&'a Predicate<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupAggregateNode<'a> {
    pub input: &'a AlgebraNode<'a>,
    pub group_by: &'a [Attr<'a>],
    pub aggregates: &'a [AggregateCall<'a>],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortKey<'a> {
    pub attr: Attr<'a>,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderNode<'a> {
    pub input: &'a AlgebraNode<'a>,
    pub keys: &'a [SortKey<'a>],
}

/// Semijoin / antijoin produced by unnesting. Returns outer rows that do
/// (semijoin) or do not (antijoin) have an inner row satisfying the
/// correlation predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatedJoinNode<'a> {
    pub outer: &'a AlgebraNode<'a>,
    pub inner: &'a AlgebraNode<'a>,
    pub predicate: &'a Predicate<'a>,
}

impl<'a> AlgebraNode<'a> {
    pub fn relation(arena: &'a Bump, table: &'a str, alias: &'a str) -> &'a Self {
        arena.alloc(AlgebraNode::Relation(RelationNode { table, alias }))
    }

    pub fn selection(
        arena: &'a Bump,
        input: &'a AlgebraNode<'a>,
        predicate: &'a Predicate<'a>,
    ) -> &'a Self {
        arena.alloc(AlgebraNode::Selection(SelectionNode { input, predicate }))
    }

    pub fn projection(
        arena: &'a Bump,
        input: &'a AlgebraNode<'a>,
        columns: &[OutputColumn<'a>],
    ) -> &'a Self {
        arena.alloc(AlgebraNode::Projection(ProjectionNode {
            input,
            columns: arena.alloc_slice_copy(columns),
        }))
    }

    pub fn cross(arena: &'a Bump, left: &'a AlgebraNode<'a>, right: &'a AlgebraNode<'a>) -> &'a Self {
        arena.alloc(AlgebraNode::Join(JoinNode {
            left,
            right,
            predicate: None,
        }))
    }

    pub fn join_on(
        arena: &'a Bump,
        left: &'a AlgebraNode<'a>,
        right: &'a AlgebraNode<'a>,
        predicate: &'a Predicate<'a>,
    ) -> &'a Self {
        arena.alloc(AlgebraNode::Join(JoinNode {
            left,
            right,
            predicate: Some(predicate),
        }))
    }

    pub fn group_aggregate(
        arena: &'a Bump,
        input: &'a AlgebraNode<'a>,
        group_by: &[Attr<'a>],
        aggregates: &[AggregateCall<'a>],
    ) -> &'a Self {
        arena.alloc(AlgebraNode::GroupAggregate(GroupAggregateNode {
            input,
            group_by: arena.alloc_slice_copy(group_by),
            aggregates: arena.alloc_slice_copy(aggregates),
        }))
    }

    pub fn order(arena: &'a Bump, input: &'a AlgebraNode<'a>, keys: &[SortKey<'a>]) -> &'a Self {
        arena.alloc(AlgebraNode::Order(OrderNode {
            input,
            keys: arena.alloc_slice_copy(keys),
        }))
    }

    pub fn semi_join(
        arena: &'a Bump,
        outer: &'a AlgebraNode<'a>,
        inner: &'a AlgebraNode<'a>,
        predicate: &'a Predicate<'a>,
    ) -> &'a Self {
        arena.alloc(AlgebraNode::SemiJoin(CorrelatedJoinNode {
            outer,
            inner,
            predicate,
        }))
    }

    pub fn anti_join(
        arena: &'a Bump,
        outer: &'a AlgebraNode<'a>,
        inner: &'a AlgebraNode<'a>,
        predicate: &'a Predicate<'a>,
    ) -> &'a Self {
        arena.alloc(AlgebraNode::AntiJoin(CorrelatedJoinNode {
            outer,
            inner,
            predicate,
        }))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            AlgebraNode::Relation(_) => "Relation",
            AlgebraNode::Selection(_) => "Selection",
            AlgebraNode::Projection(_) => "Projection",
            AlgebraNode::Join(_) => "Join",
            AlgebraNode::GroupAggregate(_) => "GroupAggregate",
            AlgebraNode::Order(_) => "Order",
            AlgebraNode::SemiJoin(_) => "SemiJoin",
            AlgebraNode::AntiJoin(_) => "AntiJoin",
        }
    }

    /// Children in declaration order (left then right for binary nodes).
    /// This order is the traversal contract the renderer relies on.
    pub fn inputs(&self) -> SmallVec<[&'a AlgebraNode<'a>; 2]> {
        let mut out = SmallVec::new();
        match self {
            AlgebraNode::Relation(_) => {}
            AlgebraNode::Selection(n) => out.push(n.input),
            AlgebraNode::Projection(n) => out.push(n.input),
            AlgebraNode::Join(n) => {
                out.push(n.left);
                out.push(n.right);
            }
            AlgebraNode::GroupAggregate(n) => out.push(n.input),
            AlgebraNode::Order(n) => out.push(n.input),
            AlgebraNode::SemiJoin(n) | AlgebraNode::AntiJoin(n) => {
                out.push(n.outer);
                out.push(n.inner);
            }
        }
        out
    }

    /// Rebuilds this node over new children, keeping its own attributes.
    /// `new_inputs` must have the arity [`inputs`](Self::inputs) reports.
    pub fn with_inputs(&self, new_inputs: &[&'a AlgebraNode<'a>], arena: &'a Bump) -> &'a Self {
        match self {
            AlgebraNode::Relation(n) => arena.alloc(AlgebraNode::Relation(n.clone())),
            AlgebraNode::Selection(n) => arena.alloc(AlgebraNode::Selection(SelectionNode {
                input: new_inputs[0],
                predicate: n.predicate,
            })),
            AlgebraNode::Projection(n) => arena.alloc(AlgebraNode::Projection(ProjectionNode {
                input: new_inputs[0],
                columns: n.columns,
            })),
            AlgebraNode::Join(n) => arena.alloc(AlgebraNode::Join(JoinNode {
                left: new_inputs[0],
                right: new_inputs[1],
                predicate: n.predicate,
            })),
            AlgebraNode::GroupAggregate(n) => {
                arena.alloc(AlgebraNode::GroupAggregate(GroupAggregateNode {
                    input: new_inputs[0],
                    group_by: n.group_by,
                    aggregates: n.aggregates,
                }))
            }
            AlgebraNode::Order(n) => arena.alloc(AlgebraNode::Order(OrderNode {
                input: new_inputs[0],
                keys: n.keys,
            })),
            AlgebraNode::SemiJoin(n) => arena.alloc(AlgebraNode::SemiJoin(CorrelatedJoinNode {
                outer: new_inputs[0],
                inner: new_inputs[1],
                predicate: n.predicate,
            })),
            AlgebraNode::AntiJoin(n) => arena.alloc(AlgebraNode::AntiJoin(CorrelatedJoinNode {
                outer: new_inputs[0],
                inner: new_inputs[1],
                predicate: n.predicate,
            })),
        }
    }

    /// Aliases of every Relation reachable beneath (and including) this node.
    pub fn aliases_under(&self) -> HashSet<&'a str> {
        let mut out = HashSet::new();
        self.collect_aliases(&mut out);
        out
    }

    fn collect_aliases(&self, out: &mut HashSet<&'a str>) {
        if let AlgebraNode::Relation(rel) = self {
            out.insert(rel.alias);
        }
        for child in self.inputs() {
            child.collect_aliases(out);
        }
    }

    /// The attributes this node itself requires, as opposed to what its
    /// subtree requires. A Selection needs its predicate's attributes, a
    /// Projection needs whatever its output expressions reference, and so on.
    pub fn own_attrs(&self) -> SmallVec<[Attr<'a>; 4]> {
        let mut out = SmallVec::new();
        match self {
            AlgebraNode::Relation(_) => {}
            AlgebraNode::Selection(n) => out.extend(n.predicate.referenced_attrs()),
            AlgebraNode::Projection(n) => {
                for col in n.columns {
                    match col {
                        OutputColumn::Attr(a) => out.push(*a),
                        OutputColumn::Aggregate(call) => {
                            if let Some(arg) = call.arg {
                                out.push(arg);
                            }
                        }
                        OutputColumn::Star => {}
                    }
                }
            }
            AlgebraNode::Join(n) => {
                if let Some(pred) = n.predicate {
                    out.extend(pred.referenced_attrs());
                }
            }
            AlgebraNode::GroupAggregate(n) => {
                out.extend(n.group_by.iter().copied());
                for call in n.aggregates {
                    if let Some(arg) = call.arg {
                        out.push(arg);
                    }
                }
            }
            AlgebraNode::Order(n) => out.extend(n.keys.iter().map(|k| k.attr)),
            AlgebraNode::SemiJoin(n) | AlgebraNode::AntiJoin(n) => {
                out.extend(n.predicate.referenced_attrs());
            }
        }
        out
    }

    /// Canonicalized subquery trees held by this node's predicate, if any.
    pub fn predicate_subqueries(&self) -> SmallVec<[&'a AlgebraNode<'a>; 2]> {
        let mut out = SmallVec::new();
        if let Some(pred) = self.own_predicate() {
            collect_subqueries(pred, &mut out);
        }
        out
    }

    fn own_predicate(&self) -> Option<&'a Predicate<'a>> {
        match self {
            AlgebraNode::Selection(n) => Some(n.predicate),
            AlgebraNode::Join(n) => n.predicate,
            AlgebraNode::SemiJoin(n) | AlgebraNode::AntiJoin(n) => Some(n.predicate),
            _ => None,
        }
    }

    pub fn node_count(&self) -> usize {
        1 + self
            .inputs()
            .iter()
            .map(|child| child.node_count())
            .sum::<usize>()
    }
}

fn collect_subqueries<'a>(
    pred: &'a Predicate<'a>,
    out: &mut SmallVec<[&'a AlgebraNode<'a>; 2]>,
) {
    match pred {
        Predicate::InSubquery { subquery, .. } | Predicate::Exists { subquery, .. } => {
            out.push(subquery)
        }
        Predicate::And(parts) | Predicate::Or(parts) => {
            for part in *parts {
                collect_subqueries(part, out);
            }
        }
        Predicate::Compare { .. } => {}
    }
}
