//! # Joinization Rule
//!
//! Folds a Selection carrying a cross-relation equality into the Join it
//! sits on, turning the canonical cross product into an equijoin. Runs
//! after pushdown, which leaves exactly these selections stranded above
//! joins (a single-side filter would already have sunk below).
//!
//! ## Transformation
//!
//! ```text
//! Before:                      After:
//! σ [e.dept_id = d.id]         ⨝ [e.dept_id = d.id]
//!   └─ ×                         ├─ Dept AS d
//!        ├─ Dept AS d            └─ Emp AS e
//!        └─ Emp AS e
//! ```
//!
//! A join that already carries a predicate accumulates further equalities
//! as an `And`. Only `attr = attr` comparisons whose qualifiers land on
//! opposite sides fold; anything else (inequalities, unqualified
//! references, same-side equalities) stays a Selection.

use super::transform_children;
use crate::algebra::{AlgebraNode, CmpOp, JoinNode, Predicate, Scalar};
use crate::optimizer::trace::TraceRecorder;
use crate::optimizer::RewriteRule;
use bumpalo::Bump;
use eyre::Result;

pub struct JoinizeSelections;

impl RewriteRule for JoinizeSelections {
    fn name(&self) -> &'static str {
        "joinize_selections"
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

impl JoinizeSelections {
    fn transform<'a>(
        &self,
        node: &'a AlgebraNode<'a>,
        arena: &'a Bump,
    ) -> Result<Option<&'a AlgebraNode<'a>>> {
        if let AlgebraNode::Selection(sel) = node {
            if let AlgebraNode::Join(join) = sel.input {
                if spans_both_sides(sel.predicate, join) {
                    let folded = fold_into(sel.predicate, join, arena);
                    // the child join may hold more foldable selections
                    return Ok(Some(
                        self.transform(folded, arena)?.unwrap_or(folded),
                    ));
                }
            }
            if let Some(new_input) = self.transform(sel.input, arena)? {
                // the input may just have become a join this selection
                // folds into, e.g. when a stacked selection below folded
                if let AlgebraNode::Join(join) = new_input {
                    if spans_both_sides(sel.predicate, join) {
                        return Ok(Some(fold_into(sel.predicate, join, arena)));
                    }
                }
                return Ok(Some(AlgebraNode::selection(arena, new_input, sel.predicate)));
            }
            return Ok(None);
        }

        transform_children(node, arena, &mut |child| self.transform(child, arena))
    }
}

fn fold_into<'a>(
    pred: &'a Predicate<'a>,
    join: &JoinNode<'a>,
    arena: &'a Bump,
) -> &'a AlgebraNode<'a> {
    let combined = match join.predicate {
        Some(existing) => Predicate::and(arena, &[existing, pred]),
        None => pred,
    };
    AlgebraNode::join_on(arena, join.left, join.right, combined)
}

/// True for `l = r` with both sides qualified attributes, one resolving
/// into each join input.
fn spans_both_sides<'a>(pred: &Predicate<'a>, join: &JoinNode<'a>) -> bool {
    let Predicate::Compare {
        left: Scalar::Attr(l),
        op: CmpOp::Eq,
        right: Scalar::Attr(r),
    } = pred
    else {
        return false;
    };
    let (Some(l_rel), Some(r_rel)) = (l.relation, r.relation) else {
        return false;
    };
    let left_aliases = join.left.aliases_under();
    let right_aliases = join.right.aliases_under();
    (left_aliases.contains(l_rel) && right_aliases.contains(r_rel))
        || (left_aliases.contains(r_rel) && right_aliases.contains(l_rel))
}
