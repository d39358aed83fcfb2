//! The rewrite rules, one module per pipeline stage.

mod breakup_conjuncts;
mod dedup_selections;
mod early_aggregation;
mod having_to_where;
mod joinize;
mod projection_pushdown;
mod reorder_joins;
mod selection_pushdown;
mod unnesting;

pub use breakup_conjuncts::BreakUpConjuncts;
pub use dedup_selections::DedupSelections;
pub use early_aggregation::EarlyAggregation;
pub use having_to_where::HavingToWhere;
pub use joinize::JoinizeSelections;
pub use projection_pushdown::ProjectionPushdown;
pub use reorder_joins::ReorderJoins;
pub use selection_pushdown::SelectionPushdown;

use crate::algebra::AlgebraNode;
use bumpalo::Bump;
use eyre::Result;
use smallvec::SmallVec;

/// Applies `transform` to every child of `node` and rebuilds the node if
/// any child changed. The per-rule recursion helper: rules special-case
/// the shapes they rewrite and fall through to this for everything else.
pub(crate) fn transform_children<'a, F>(
    node: &'a AlgebraNode<'a>,
    arena: &'a Bump,
    transform: &mut F,
) -> Result<Option<&'a AlgebraNode<'a>>>
where
    F: FnMut(&'a AlgebraNode<'a>) -> Result<Option<&'a AlgebraNode<'a>>>,
{
    let children = node.inputs();
    if children.is_empty() {
        return Ok(None);
    }

    let mut changed = false;
    let mut new_children: SmallVec<[&'a AlgebraNode<'a>; 2]> = SmallVec::new();
    for child in &children {
        match transform(child)? {
            Some(new_child) => {
                changed = true;
                new_children.push(new_child);
            }
            None => new_children.push(child),
        }
    }

    if changed {
        Ok(Some(node.with_inputs(&new_children, arena)))
    } else {
        Ok(None)
    }
}
