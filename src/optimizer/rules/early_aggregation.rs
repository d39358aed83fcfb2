//! # Early Aggregation Rule
//!
//! Splits a GroupAggregate sitting on an equijoin into a partial
//! aggregate on the join side that feeds the aggregate arguments, plus a
//! combining aggregate above the join. The join then runs over one row
//! per partial group instead of one row per input row.
//!
//! ## Transformation
//!
//! ```text
//! Before:                               After:
//! γ [group d.name; SUM(e.sal) s]        γ [group d.name; SUM(part_s) s]
//!   └─ ⨝ [e.dept_id = d.id]               └─ ⨝ [e.dept_id = d.id]
//!        ├─ Dept AS d                          ├─ Dept AS d
//!        └─ Emp AS e                           └─ γ [group e.dept_id;
//!                                              │     SUM(e.sal) part_s]
//!                                              └─ Emp AS e
//! ```
//!
//! ## Preconditions, all required
//!
//! - every aggregate is decomposable (AVG is not) and takes a qualified
//!   argument (`COUNT(*)` has no side to push toward),
//! - all aggregate arguments resolve into the same join side,
//! - every grouping attribute is qualified,
//! - the join predicate is a conjunction of qualified equalities, and the
//!   chosen side's join keys are all grouping attributes, so partial
//!   groups line up one-to-one with final groups on that side,
//! - no two grouping attributes share a name under different qualifiers
//!   (the unqualified partial aliases could not be told apart above),
//! - the chosen side is not already an aggregate.
//!
//! Anything short of this leaves the tree unchanged; the rewrite is an
//! opportunistic win, not an obligation.

use super::transform_children;
use crate::algebra::{
    AggregateCall, AlgebraNode, Attr, CmpOp, GroupAggregateNode, JoinNode, Predicate, Scalar,
};
use crate::optimizer::trace::TraceRecorder;
use crate::optimizer::RewriteRule;
use bumpalo::Bump;
use eyre::Result;
use std::collections::HashSet;

pub struct EarlyAggregation;

impl RewriteRule for EarlyAggregation {
    fn name(&self) -> &'static str {
        "early_aggregation"
    }

    fn apply<'a>(
        &self,
        root: &'a AlgebraNode<'a>,
        arena: &'a Bump,
        _trace: &mut TraceRecorder<'a>,
    ) -> Result<Option<&'a AlgebraNode<'a>>> {
        self.transform(root, arena)
    }
}

impl EarlyAggregation {
    fn transform<'a>(
        &self,
        node: &'a AlgebraNode<'a>,
        arena: &'a Bump,
    ) -> Result<Option<&'a AlgebraNode<'a>>> {
        if let AlgebraNode::GroupAggregate(agg) = node {
            if let AlgebraNode::Join(join) = agg.input {
                if let Some(rewritten) = try_split(agg, join, arena) {
                    return Ok(Some(rewritten));
                }
            }
        }
        transform_children(node, arena, &mut |child| self.transform(child, arena))
    }
}

fn try_split<'a>(
    agg: &GroupAggregateNode<'a>,
    join: &JoinNode<'a>,
    arena: &'a Bump,
) -> Option<&'a AlgebraNode<'a>> {
    if agg.aggregates.is_empty() {
        return None;
    }
    if agg
        .aggregates
        .iter()
        .any(|call| !call.func.is_decomposable() || call.arg.is_none())
    {
        return None;
    }
    if agg.group_by.iter().any(|key| key.relation.is_none()) {
        return None;
    }
    if has_duplicate_names(agg.group_by) {
        return None;
    }

    let left_aliases = join.left.aliases_under();
    let right_aliases = join.right.aliases_under();
    let side_of = |attr: &Attr<'a>| -> Option<bool> {
        // Some(true) = left, Some(false) = right
        let rel = attr.relation?;
        if left_aliases.contains(rel) {
            Some(true)
        } else if right_aliases.contains(rel) {
            Some(false)
        } else {
            None
        }
    };

    let mut arg_sides = agg.aggregates.iter().filter_map(|call| {
        let arg = call.arg?;
        side_of(&arg)
    });
    let on_left = arg_sides.next()?;
    if arg_sides.any(|side| side != on_left) {
        return None;
    }
    let (side, other) = if on_left {
        (join.left, join.right)
    } else {
        (join.right, join.left)
    };
    if matches!(side, AlgebraNode::GroupAggregate(_)) {
        return None;
    }

    // join keys on the chosen side, from the predicate's equalities
    let mut side_keys: Vec<Attr<'a>> = Vec::new();
    for conjunct in join.predicate?.conjuncts() {
        let Predicate::Compare {
            left: Scalar::Attr(l),
            op: CmpOp::Eq,
            right: Scalar::Attr(r),
        } = conjunct
        else {
            return None;
        };
        for attr in [l, r] {
            match side_of(attr)? {
                key_on_left if key_on_left == on_left => side_keys.push(*attr),
                _ => {}
            }
        }
    }
    if side_keys.iter().any(|key| !agg.group_by.contains(key)) {
        return None;
    }

    // partial grouping: the side's share of the final keys, join keys
    // included (they already are, per the check above)
    let partial_keys: Vec<Attr<'a>> = agg
        .group_by
        .iter()
        .filter(|key| side_of(key) == Some(on_left))
        .copied()
        .collect();
    if partial_keys.is_empty() {
        return None;
    }

    let mut partial_calls: Vec<AggregateCall<'a>> = Vec::with_capacity(agg.aggregates.len());
    let mut outer_calls: Vec<AggregateCall<'a>> = Vec::with_capacity(agg.aggregates.len());
    for call in agg.aggregates {
        let combiner = call.func.combiner()?;
        let partial_alias: &'a str = arena.alloc_str(&format!("part_{}", call.alias));
        partial_calls.push(AggregateCall {
            func: call.func,
            arg: call.arg,
            alias: partial_alias,
        });
        outer_calls.push(AggregateCall {
            func: combiner,
            arg: Some(Attr::bare(partial_alias)),
            alias: call.alias,
        });
    }

    let partial = AlgebraNode::group_aggregate(arena, side, &partial_keys, &partial_calls);
    let rejoined = if on_left {
        AlgebraNode::join_on(arena, partial, other, join.predicate?)
    } else {
        AlgebraNode::join_on(arena, other, partial, join.predicate?)
    };
    Some(AlgebraNode::group_aggregate(
        arena,
        rejoined,
        agg.group_by,
        &outer_calls,
    ))
}

fn has_duplicate_names(keys: &[Attr<'_>]) -> bool {
    let mut seen = HashSet::new();
    keys.iter().any(|key| !seen.insert(key.name))
}
