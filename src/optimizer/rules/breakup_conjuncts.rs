//! # Conjunct Decomposition Rule
//!
//! Replaces every Selection holding a top-level `And` with a chain of
//! single-conjunct Selections, first conjunct outermost, above the
//! original child. The pushdown, joinize and redundancy rules all assume
//! atomic conjuncts, so this runs first and establishes the invariant that
//! no Selection holds a top-level `And`.
//!
//! ## Transformation
//!
//! ```text
//! Before:                      After:
//! σ [a AND (b AND c)]          σ [a]
//!   └─ input                     └─ σ [b]
//!                                    └─ σ [c]
//!                                       └─ input
//! ```
//!
//! Subquery trees held by `IN`/`EXISTS` predicates are decomposed too, so
//! correlation detection later sees atomic conjuncts inside them.
//! Idempotent: a second run finds only single-conjunct Selections and
//! reports no change.

use super::transform_children;
use crate::algebra::{AlgebraNode, Predicate};
use crate::optimizer::trace::TraceRecorder;
use crate::optimizer::RewriteRule;
use bumpalo::Bump;
use eyre::Result;
use smallvec::SmallVec;

pub struct BreakUpConjuncts;

impl RewriteRule for BreakUpConjuncts {
    fn name(&self) -> &'static str {
        "breakup_conjuncts"
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

impl BreakUpConjuncts {
    fn transform<'a>(
        &self,
        node: &'a AlgebraNode<'a>,
        arena: &'a Bump,
    ) -> Result<Option<&'a AlgebraNode<'a>>> {
        if let AlgebraNode::Selection(sel) = node {
            let new_pred = self.transform_predicate(sel.predicate, arena)?;
            let predicate = new_pred.unwrap_or(sel.predicate);

            let new_input = self.transform(sel.input, arena)?;
            let input = new_input.unwrap_or(sel.input);

            let conjuncts = predicate.conjuncts();
            if conjuncts.len() > 1 {
                let mut current = input;
                for part in conjuncts.iter().rev() {
                    current = AlgebraNode::selection(arena, current, part);
                }
                return Ok(Some(current));
            }

            if new_pred.is_some() || new_input.is_some() {
                return Ok(Some(AlgebraNode::selection(arena, input, predicate)));
            }
            return Ok(None);
        }

        transform_children(node, arena, &mut |child| self.transform(child, arena))
    }

    /// Rebuilds a predicate whose subquery trees needed decomposition.
    fn transform_predicate<'a>(
        &self,
        pred: &'a Predicate<'a>,
        arena: &'a Bump,
    ) -> Result<Option<&'a Predicate<'a>>> {
        match pred {
            Predicate::InSubquery {
                attr,
                subquery,
                negated,
            } => Ok(self
                .transform(subquery, arena)?
                .map(|sub| Predicate::in_subquery(arena, *attr, sub, *negated))),
            Predicate::Exists { subquery, negated } => Ok(self
                .transform(subquery, arena)?
                .map(|sub| Predicate::exists(arena, sub, *negated))),
            Predicate::And(parts) | Predicate::Or(parts) => {
                let mut changed = false;
                let mut new_parts: SmallVec<[&'a Predicate<'a>; 8]> = SmallVec::new();
                for part in *parts {
                    match self.transform_predicate(part, arena)? {
                        Some(new_part) => {
                            changed = true;
                            new_parts.push(new_part);
                        }
                        None => new_parts.push(part),
                    }
                }
                if !changed {
                    return Ok(None);
                }
                let rebuilt = match pred {
                    Predicate::And(_) => Predicate::and(arena, &new_parts),
                    _ => Predicate::or(arena, &new_parts),
                };
                Ok(Some(rebuilt))
            }
            Predicate::Compare { .. } => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{Attr, CmpOp, Scalar};

    fn conjunctive_tree(arena: &Bump) -> &AlgebraNode<'_> {
        let rel = AlgebraNode::relation(arena, "Emp", "e");
        let a = Predicate::compare(
            arena,
            Scalar::Attr(Attr::qualified("e", "salary")),
            CmpOp::Gt,
            Scalar::Literal("50000"),
        );
        let b = Predicate::compare(
            arena,
            Scalar::Attr(Attr::qualified("e", "age")),
            CmpOp::Lt,
            Scalar::Literal("65"),
        );
        let c = Predicate::compare(
            arena,
            Scalar::Attr(Attr::qualified("e", "active")),
            CmpOp::Eq,
            Scalar::Literal("true"),
        );
        let nested = Predicate::and(arena, &[b, c]);
        let all = Predicate::and(arena, &[a, nested]);
        AlgebraNode::selection(arena, rel, all)
    }

    #[test]
    fn test_splits_nested_and_into_chain() {
        let arena = Bump::new();
        let tree = conjunctive_tree(&arena);
        let mut trace = TraceRecorder::new(false);

        let result = BreakUpConjuncts
            .apply(tree, &arena, &mut trace)
            .unwrap()
            .expect("should change");

        // first conjunct outermost
        let AlgebraNode::Selection(top) = result else {
            panic!("expected selection at top");
        };
        assert_eq!(top.predicate.to_string(), "e.salary > 50000");
        let AlgebraNode::Selection(mid) = top.input else {
            panic!("expected selection chain");
        };
        assert_eq!(mid.predicate.to_string(), "e.age < 65");
        let AlgebraNode::Selection(bottom) = mid.input else {
            panic!("expected selection chain");
        };
        assert_eq!(bottom.predicate.to_string(), "e.active = true");
        assert!(matches!(bottom.input, AlgebraNode::Relation(_)));
    }

    #[test]
    fn test_idempotent() {
        let arena = Bump::new();
        let tree = conjunctive_tree(&arena);
        let mut trace = TraceRecorder::new(false);

        let once = BreakUpConjuncts
            .apply(tree, &arena, &mut trace)
            .unwrap()
            .unwrap();
        let twice = BreakUpConjuncts.apply(once, &arena, &mut trace).unwrap();
        assert!(twice.is_none());
    }

    #[test]
    fn test_decomposes_inside_subquery_trees() {
        let arena = Bump::new();
        let inner_rel = AlgebraNode::relation(&arena, "T", "t");
        let p = Predicate::compare(
            &arena,
            Scalar::Attr(Attr::qualified("t", "z")),
            CmpOp::Eq,
            Scalar::Literal("1"),
        );
        let q = Predicate::compare(
            &arena,
            Scalar::Attr(Attr::qualified("t", "y")),
            CmpOp::Gt,
            Scalar::Literal("0"),
        );
        let both = Predicate::and(&arena, &[p, q]);
        let subquery = AlgebraNode::selection(&arena, inner_rel, both);

        let outer_rel = AlgebraNode::relation(&arena, "O", "o");
        let in_pred = Predicate::in_subquery(&arena, Attr::qualified("o", "x"), subquery, false);
        let tree = AlgebraNode::selection(&arena, outer_rel, in_pred);

        let mut trace = TraceRecorder::new(false);
        let result = BreakUpConjuncts
            .apply(tree, &arena, &mut trace)
            .unwrap()
            .expect("subquery conjuncts should split");

        let AlgebraNode::Selection(top) = result else {
            panic!("expected selection");
        };
        let Predicate::InSubquery { subquery: sub, .. } = top.predicate else {
            panic!("expected IN predicate");
        };
        let AlgebraNode::Selection(s1) = sub else {
            panic!("expected chain in subquery");
        };
        assert!(matches!(s1.input, AlgebraNode::Selection(_)));
    }
}
