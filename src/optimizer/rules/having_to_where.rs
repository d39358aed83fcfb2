//! # HAVING Promotion Rule
//!
//! Moves an aggregate-free HAVING filter below its GroupAggregate, where
//! it prunes input rows instead of finished groups. Sound for predicates
//! over grouping attributes: each group has one value per grouping
//! attribute, so filtering rows before grouping removes exactly the
//! groups the HAVING would have removed.
//!
//! ## Transformation
//!
//! ```text
//! Before:                        After:
//! σ [d.name <> 'HQ']             γ [group d.name; COUNT(*)]
//!   └─ γ [group d.name; ...]       └─ σ [d.name <> 'HQ']
//!        └─ input                       └─ input
//! ```
//!
//! A predicate comparing an aggregate result stays put, as does one
//! referencing an attribute spelled like an aggregate's output alias
//! (`cnt > 2` written without the function syntax still means the
//! aggregate).

use super::transform_children;
use crate::algebra::{AlgebraNode, GroupAggregateNode, Predicate};
use crate::optimizer::trace::TraceRecorder;
use crate::optimizer::RewriteRule;
use bumpalo::Bump;
use eyre::Result;

pub struct HavingToWhere;

impl RewriteRule for HavingToWhere {
    fn name(&self) -> &'static str {
        "having_to_where"
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

impl HavingToWhere {
    fn transform<'a>(
        &self,
        node: &'a AlgebraNode<'a>,
        arena: &'a Bump,
    ) -> Result<Option<&'a AlgebraNode<'a>>> {
        if let AlgebraNode::Selection(sel) = node {
            if let AlgebraNode::GroupAggregate(agg) = sel.input {
                if promotable(sel.predicate, agg) {
                    let filtered = AlgebraNode::selection(arena, agg.input, sel.predicate);
                    let promoted = AlgebraNode::group_aggregate(
                        arena,
                        filtered,
                        agg.group_by,
                        agg.aggregates,
                    );
                    return Ok(Some(promoted));
                }
            }
            if let Some(new_input) = self.transform(sel.input, arena)? {
                return Ok(Some(AlgebraNode::selection(arena, new_input, sel.predicate)));
            }
            return Ok(None);
        }

        transform_children(node, arena, &mut |child| self.transform(child, arena))
    }
}

fn promotable<'a>(pred: &Predicate<'a>, agg: &GroupAggregateNode<'a>) -> bool {
    if pred.references_aggregate() {
        return false;
    }
    // an attribute named like an aggregate alias is that aggregate's
    // result; it does not exist below the grouping
    pred.referenced_attrs()
        .iter()
        .all(|attr| agg.aggregates.iter().all(|call| call.alias != attr.name))
}
