//! # Redundant Predicate Elimination
//!
//! Drops a Selection whose predicate already holds at that point because
//! an ancestor Selection on the same root-to-leaf path applies a
//! syntactically identical filter. Duplicates arise from upstream query
//! generators and from pushdown leaving a copy behind; the second
//! application can never change the result of the first.
//!
//! ## Transformation
//!
//! ```text
//! Before:                      After:
//! σ [d.region = 'West']        σ [d.region = 'West']
//!   └─ σ [active = true]         └─ σ [active = true]
//!        └─ σ [d.region = 'West']     └─ Dept AS d
//!             └─ Dept AS d
//! ```
//!
//! Identity is syntactic up to alias qualification ([`Predicate::
//! syntactically_equal`]): `region = 'West'` and `d.region = 'West'`
//! count as the same filter, `d.region = 'West'` and `e.region = 'West'`
//! do not. The outermost copy survives; there is no semantic reasoning
//! (no implication, no range subsumption).

use super::transform_children;
use crate::algebra::{AlgebraNode, Predicate};
use crate::optimizer::trace::TraceRecorder;
use crate::optimizer::RewriteRule;
use bumpalo::Bump;
use eyre::Result;

pub struct DedupSelections;

impl RewriteRule for DedupSelections {
    fn name(&self) -> &'static str {
        "dedup_selections"
    }

    fn apply<'a>(
        &self,
        root: &'a AlgebraNode<'a>,
        arena: &'a Bump,
        _trace: &mut TraceRecorder<'a>,
    ) -> Result<Option<&'a AlgebraNode<'a>>> {
        let mut seen: Vec<&'a Predicate<'a>> = Vec::new();
        transform(root, arena, &mut seen)
    }
}

fn transform<'a>(
    node: &'a AlgebraNode<'a>,
    arena: &'a Bump,
    seen: &mut Vec<&'a Predicate<'a>>,
) -> Result<Option<&'a AlgebraNode<'a>>> {
    if let AlgebraNode::Selection(sel) = node {
        if seen
            .iter()
            .any(|earlier| earlier.syntactically_equal(sel.predicate))
        {
            // drop this copy, keep walking what is underneath it
            let below = transform(sel.input, arena, seen)?.unwrap_or(sel.input);
            return Ok(Some(below));
        }

        seen.push(sel.predicate);
        let result = transform(sel.input, arena, seen)?;
        seen.pop();

        return Ok(result
            .map(|new_input| AlgebraNode::selection(arena, new_input, sel.predicate)));
    }

    // binary nodes start both children from the same ancestor path;
    // duplicates across sibling subtrees are not duplicates on a path
    transform_children(node, arena, &mut |child| transform(child, arena, seen))
}
