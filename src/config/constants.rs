//! Pipeline guard constants.
//!
//! Every pipeline stage runs its rule to a fixed point. A correct rule
//! reports "no change" and the loop exits; the constants here bound the
//! loop so a precondition bug that makes two rewrites oscillate cannot
//! hang the process.
//!
//! ```text
//! FIXPOINT_PASSES_PER_NODE (4)
//!       │
//!       └─> stage budget = node_count * FIXPOINT_PASSES_PER_NODE
//!                        + FIXPOINT_PASSES_FLOOR
//!           One pass can move at most one operator per node on the path
//!           it rewrites, so any terminating rule converges well inside
//!           this budget; hitting it means the rule is oscillating.
//! ```

/// Fixed-point passes allowed per tree node for a single stage.
pub const FIXPOINT_PASSES_PER_NODE: usize = 4;

/// Minimum pass budget, so tiny trees still get a few passes.
pub const FIXPOINT_PASSES_FLOOR: usize = 8;

/// Stage budget for a tree of `node_count` nodes.
pub fn fixpoint_budget(node_count: usize) -> usize {
    node_count * FIXPOINT_PASSES_PER_NODE + FIXPOINT_PASSES_FLOOR
}
