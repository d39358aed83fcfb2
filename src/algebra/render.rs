//! Textual rendering of algebra trees for trace display.
//!
//! One line per node, operator symbols (σ π ⨝ γ τ, ⋉ for semijoin, ▷ for
//! antijoin, × for a predicate-less join), two-space indentation per
//! level, children rendered in declaration order. The real SQL
//! regeneration front-end lives outside this crate; this renderer only
//! has to be deterministic and readable.

use super::{AlgebraNode, OutputColumn};
use std::fmt;
use std::fmt::Write;

pub fn render(root: &AlgebraNode<'_>) -> String {
    let mut out = String::new();
    render_into(root, 0, &mut out);
    out
}

fn render_into(node: &AlgebraNode<'_>, depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    write_head(node, out);
    out.push('\n');
    for child in node.inputs() {
        render_into(child, depth + 1, out);
    }
}

fn write_head(node: &AlgebraNode<'_>, out: &mut String) {
    match node {
        AlgebraNode::Relation(rel) => {
            if rel.alias == rel.table {
                let _ = write!(out, "{}", rel.table);
            } else {
                let _ = write!(out, "{} AS {}", rel.table, rel.alias);
            }
        }
        AlgebraNode::Selection(sel) => {
            let _ = write!(out, "σ [{}]", sel.predicate);
        }
        AlgebraNode::Projection(proj) => {
            out.push_str("π [");
            for (i, col) in proj.columns.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match col {
                    OutputColumn::Attr(a) => {
                        let _ = write!(out, "{}", a);
                    }
                    OutputColumn::Aggregate(call) => {
                        let _ = write!(out, "{}", call);
                    }
                    OutputColumn::Star => out.push('*'),
                }
            }
            out.push(']');
        }
        AlgebraNode::Join(join) => match join.predicate {
            Some(pred) => {
                let _ = write!(out, "⨝ [{}]", pred);
            }
            None => out.push('×'),
        },
        AlgebraNode::GroupAggregate(group) => {
            out.push_str("γ [by:");
            for (i, attr) in group.group_by.iter().enumerate() {
                out.push(if i == 0 { ' ' } else { ',' });
                let _ = write!(out, "{}", attr);
            }
            for call in group.aggregates {
                let _ = write!(out, " | {}", call);
            }
            out.push(']');
        }
        AlgebraNode::Order(order) => {
            out.push_str("τ [");
            for (i, key) in order.keys.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(
                    out,
                    "{} {}",
                    key.attr,
                    if key.ascending { "ASC" } else { "DESC" }
                );
            }
            out.push(']');
        }
        AlgebraNode::SemiJoin(sj) => {
            let _ = write!(out, "⋉ [{}]", sj.predicate);
        }
        AlgebraNode::AntiJoin(aj) => {
            let _ = write!(out, "▷ [{}]", aj.predicate);
        }
    }
}

/// Compact per-kind node counts, e.g. `τ:1 π:1 σ:3 ⨝:1 rel:2`. Used in
/// trace descriptions to summarize what a rewrite changed. Predicate-less
/// joins count as `×`, matching how they render.
pub fn kind_census(root: &AlgebraNode<'_>) -> String {
    let mut counts = [0usize; 9];
    tally(root, &mut counts);
    let labels = ["τ", "π", "σ", "γ", "⨝", "×", "⋉", "▷", "rel"];
    let mut out = String::new();
    for (label, count) in labels.iter().zip(counts.iter()) {
        if *count > 0 {
            if !out.is_empty() {
                out.push(' ');
            }
            let _ = write!(out, "{}:{}", label, count);
        }
    }
    out
}

fn tally(node: &AlgebraNode<'_>, counts: &mut [usize; 9]) {
    let slot = match node {
        AlgebraNode::Order(_) => 0,
        AlgebraNode::Projection(_) => 1,
        AlgebraNode::Selection(_) => 2,
        AlgebraNode::GroupAggregate(_) => 3,
        AlgebraNode::Join(join) if join.predicate.is_some() => 4,
        AlgebraNode::Join(_) => 5,
        AlgebraNode::SemiJoin(_) => 6,
        AlgebraNode::AntiJoin(_) => 7,
        AlgebraNode::Relation(_) => 8,
    };
    counts[slot] += 1;
    for child in node.inputs() {
        tally(child, counts);
    }
}

impl fmt::Display for AlgebraNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(render(self).trim_end())
    }
}
