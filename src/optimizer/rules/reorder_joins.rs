//! # Join Reordering Rule
//!
//! Flattens a chain of binary joins into its factors, then rebuilds a
//! strictly left-deep spine in a greedy order: filtered factors first,
//! then factors connected to the already-placed prefix through an
//! equality, ties broken by the incoming order. A heuristic stand-in for
//! cost-based enumeration; no cardinality or selectivity estimates exist
//! here, so "has a filter" and "has a join key" are the whole signal.
//!
//! ## Transformation
//!
//! ```text
//! Before:                          After:
//! ⨝ [b.a_id = a.id]                ⨝ [c.b_id = b.id]
//!   ├─ ⨝ [c.b_id = b.id]             ├─ ⨝ [b.a_id = a.id]
//!   │    ├─ A AS a                   │    ├─ σ [b.kind = 'x']
//!   │    │                           │    │    └─ B AS b
//!   │    └─ C AS c                   │    └─ A AS a
//!   └─ σ [b.kind = 'x']              └─ C AS c
//!        └─ B AS b
//! ```
//!
//! Join predicates are re-attached at the lowest spine level where every
//! attribute they reference resolves, sorted textually within a level so
//! the output is deterministic. Conjuncts that resolve nowhere on the
//! spine come back as Selections above it. Interior projections wrapping
//! chain joins are dropped during flattening; projections capping the
//! factors themselves are kept.
//!
//! The greedy order is a function of factor order and scores only, so
//! re-running the rule on its own output chooses the same order and
//! reports no change.

use super::transform_children;
use crate::algebra::{AlgebraNode, Attr, CmpOp, Predicate, Scalar};
use crate::optimizer::trace::TraceRecorder;
use crate::optimizer::RewriteRule;
use bumpalo::Bump;
use eyre::Result;
use std::collections::HashSet;

pub struct ReorderJoins;

impl RewriteRule for ReorderJoins {
    fn name(&self) -> &'static str {
        "reorder_joins"
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

impl ReorderJoins {
    fn transform<'a>(
        &self,
        node: &'a AlgebraNode<'a>,
        arena: &'a Bump,
    ) -> Result<Option<&'a AlgebraNode<'a>>> {
        if let AlgebraNode::Join(_) = node {
            let mut factors = Vec::new();
            let mut conjuncts = Vec::new();
            collect_chain(node, &mut factors, &mut conjuncts);

            // reorder inside each factor first, then the chain itself
            let mut factor_changed = false;
            for factor in factors.iter_mut() {
                if let Some(new_factor) = self.transform(factor, arena)? {
                    *factor = new_factor;
                    factor_changed = true;
                }
            }

            let rebuilt = rebuild_chain(&factors, &conjuncts, arena);
            if factor_changed || rebuilt != node {
                return Ok(Some(rebuilt));
            }
            return Ok(None);
        }

        transform_children(node, arena, &mut |child| self.transform(child, arena))
    }
}

/// Flattens a join chain into its factor subtrees and the union of all
/// predicate conjuncts carried by the interior joins.
fn collect_chain<'a>(
    node: &'a AlgebraNode<'a>,
    factors: &mut Vec<&'a AlgebraNode<'a>>,
    conjuncts: &mut Vec<&'a Predicate<'a>>,
) {
    let chain_join = match node {
        AlgebraNode::Join(join) => Some(join),
        AlgebraNode::Projection(proj) => match proj.input {
            AlgebraNode::Join(join) => Some(join),
            _ => None,
        },
        _ => None,
    };
    match chain_join {
        Some(join) => {
            collect_chain(join.left, factors, conjuncts);
            collect_chain(join.right, factors, conjuncts);
            if let Some(pred) = join.predicate {
                conjuncts.extend(pred.conjuncts());
            }
        }
        None => factors.push(node),
    }
}

fn rebuild_chain<'a>(
    factors: &[&'a AlgebraNode<'a>],
    conjuncts: &[&'a Predicate<'a>],
    arena: &'a Bump,
) -> &'a AlgebraNode<'a> {
    let order = greedy_order(factors, conjuncts);

    let mut used = vec![false; conjuncts.len()];
    let mut spine = factors[order[0]];
    let mut placed_aliases = spine.aliases_under();

    for &idx in &order[1..] {
        let factor = factors[idx];
        placed_aliases.extend(factor.aliases_under());

        let mut level: Vec<&'a Predicate<'a>> = Vec::new();
        for (i, conjunct) in conjuncts.iter().enumerate() {
            if !used[i] && resolves_in(conjunct, &placed_aliases) {
                used[i] = true;
                level.push(conjunct);
            }
        }
        level.sort_by_key(|p| p.to_string());

        spine = match level.len() {
            0 => AlgebraNode::cross(arena, spine, factor),
            1 => AlgebraNode::join_on(arena, spine, factor, level[0]),
            _ => AlgebraNode::join_on(arena, spine, factor, Predicate::and(arena, &level)),
        };
    }

    // conjuncts that resolve nowhere on the spine surface as selections
    let mut leftovers: Vec<&'a Predicate<'a>> = conjuncts
        .iter()
        .enumerate()
        .filter(|(i, _)| !used[*i])
        .map(|(_, p)| *p)
        .collect();
    leftovers.sort_by_key(|p| p.to_string());
    for pred in leftovers {
        spine = AlgebraNode::selection(arena, spine, pred);
    }
    spine
}

/// Placement order over factor indices. Each step takes the highest-scored
/// unplaced factor: 2 for carrying a filter, 1 for an equality key into
/// the placed prefix, earliest incoming position on ties.
fn greedy_order(factors: &[&AlgebraNode<'_>], conjuncts: &[&Predicate<'_>]) -> Vec<usize> {
    let filtered: Vec<bool> = factors.iter().map(|f| contains_selection(f)).collect();
    let alias_sets: Vec<HashSet<&str>> = factors.iter().map(|f| f.aliases_under()).collect();

    let mut order = Vec::with_capacity(factors.len());
    let mut placed_aliases: HashSet<&str> = HashSet::new();
    let mut remaining: Vec<usize> = (0..factors.len()).collect();

    while !remaining.is_empty() {
        let mut best = remaining[0];
        let mut best_score = -1i32;
        for &idx in &remaining {
            let mut score = if filtered[idx] { 2 } else { 0 };
            if links_to(&alias_sets[idx], &placed_aliases, conjuncts) {
                score += 1;
            }
            if score > best_score {
                best = idx;
                best_score = score;
            }
        }
        placed_aliases.extend(alias_sets[best].iter().copied());
        remaining.retain(|&idx| idx != best);
        order.push(best);
    }
    order
}

fn contains_selection(node: &AlgebraNode<'_>) -> bool {
    if matches!(node, AlgebraNode::Selection(_)) {
        return true;
    }
    node.inputs().iter().any(|child| contains_selection(child))
}

/// Whether some equality conjunct joins an alias of `factor` with an
/// alias already placed.
fn links_to(
    factor_aliases: &HashSet<&str>,
    placed: &HashSet<&str>,
    conjuncts: &[&Predicate<'_>],
) -> bool {
    conjuncts.iter().any(|pred| {
        let Predicate::Compare {
            left: Scalar::Attr(Attr {
                relation: Some(l), ..
            }),
            op: CmpOp::Eq,
            right: Scalar::Attr(Attr {
                relation: Some(r), ..
            }),
        } = pred
        else {
            return false;
        };
        (factor_aliases.contains(l) && placed.contains(r))
            || (factor_aliases.contains(r) && placed.contains(l))
    })
}

/// All attribute references are qualified and covered by `aliases`.
fn resolves_in(pred: &Predicate<'_>, aliases: &HashSet<&str>) -> bool {
    pred.referenced_attrs()
        .iter()
        .all(|attr| matches!(attr.relation, Some(rel) if aliases.contains(rel)))
}
