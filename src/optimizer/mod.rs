//! # Rewrite-Rule Engine
//!
//! Transforms a canonical relational-algebra tree into a logically
//! equivalent, more efficient tree through a fixed, ordered sequence of
//! heuristic rewrite stages, recording a trace snapshot after every rule
//! application.
//!
//! ## Pipeline
//!
//! ```text
//! canonical tree
//!   → [1 breakup_conjuncts]   σ(a AND b) → σ(a)(σ(b))
//!   → [2 selection_pushdown]  σ toward its relations (+ unnesting)
//!   → [3 projection_pushdown] reduced π above join inputs
//!   → [4 joinize_selections]  σ(A.x = B.y)(×) → ⨝
//!   → [5 reorder_joins]       greedy left-deep reordering
//!   → [6 having_to_where]     aggregate-free HAVING below γ
//!   → [7 early_aggregation]   partial γ below a join
//!   → [8 dedup_selections]    drop repeated σ on a path
//! final tree
//! ```
//!
//! ## Stage semantics
//!
//! Each stage runs to its own fixed point before the next starts; no stage
//! re-triggers an earlier one. A rule returns `Ok(None)` for "no change",
//! which ends its stage. Each fixed-point loop is bounded by
//! [`config::fixpoint_budget`](crate::config::fixpoint_budget) so a buggy
//! precondition cannot oscillate forever; tripping the guard logs a
//! warning and moves on.
//!
//! ## Failure semantics
//!
//! A rewrite whose output fails the attribute-resolvability check is
//! aborted: the previous tree is kept, a skipped entry lands in the trace,
//! and the pipeline continues. Only an unresolvable attribute in the
//! *input* tree aborts the whole run, since no stage has a valid tree to
//! work on.

pub mod rules;
pub mod trace;

use crate::algebra::render::kind_census;
use crate::algebra::{validate, AlgebraNode};
use crate::config::{fixpoint_budget, OptimizerConfig};
use bumpalo::Bump;
use eyre::Result;
use trace::TraceRecorder;

/// One rewrite rule of the pipeline. `apply` is a pure tree-to-tree
/// function: it returns `Ok(Some(new_root))` when it changed anything in
/// one full traversal and `Ok(None)` at its fixed point. Rules allocate
/// replacement nodes in the arena and never mutate existing ones.
pub trait RewriteRule {
    fn name(&self) -> &'static str;

    fn apply<'a>(
        &self,
        root: &'a AlgebraNode<'a>,
        arena: &'a Bump,
        trace: &mut TraceRecorder<'a>,
    ) -> Result<Option<&'a AlgebraNode<'a>>>;
}

/// The result of a pipeline run: the final tree plus the ordered trace.
#[derive(Debug)]
pub struct Optimized<'a> {
    pub root: &'a AlgebraNode<'a>,
    pub trace: TraceRecorder<'a>,
}

pub struct Optimizer {
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    fn stages(&self) -> Vec<Box<dyn RewriteRule>> {
        vec![
            Box::new(rules::BreakUpConjuncts),
            Box::new(rules::SelectionPushdown::new(self.config.unnesting_enabled)),
            Box::new(rules::ProjectionPushdown),
            Box::new(rules::JoinizeSelections),
            Box::new(rules::ReorderJoins),
            Box::new(rules::HavingToWhere),
            Box::new(rules::EarlyAggregation),
            Box::new(rules::DedupSelections),
        ]
    }

    /// Runs the full pipeline over `root`.
    pub fn optimize<'a>(
        &self,
        root: &'a AlgebraNode<'a>,
        arena: &'a Bump,
    ) -> Result<Optimized<'a>> {
        validate::check_resolvable(root)?;

        let mut trace = TraceRecorder::new(self.config.emit_trace);
        if trace.is_enabled() {
            trace.record("canonical", root, format!("input tree ({})", kind_census(root)));
        }

        let mut current = root;
        for stage in self.stages() {
            let budget = fixpoint_budget(current.node_count());
            let mut passes = 0;
            loop {
                if passes >= budget {
                    eprintln!(
                        "[warn] stage {} did not reach a fixed point within {} passes, stopping it",
                        stage.name(),
                        budget
                    );
                    break;
                }
                passes += 1;

                let Some(next) = stage.apply(current, arena, &mut trace)? else {
                    break;
                };
                if next == current {
                    break;
                }
                if let Err(err) = validate::check_resolvable(next) {
                    trace.record_skip(
                        stage.name(),
                        current,
                        format!("rewrite aborted, previous tree kept: {}", err),
                    );
                    break;
                }
                // census strings are only worth building when recorded
                if trace.is_enabled() {
                    trace.record(
                        stage.name(),
                        next,
                        format!("{} → {}", kind_census(current), kind_census(next)),
                    );
                }
                current = next;
            }
        }

        Ok(Optimized {
            root: current,
            trace,
        })
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}
