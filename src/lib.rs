//! # relopt - Heuristic Relational Query Optimizer
//!
//! relopt rewrites the canonical relational-algebra tree of a single-block
//! SQL SELECT into a logically equivalent, more efficient tree. It is the
//! middle of a three-part toolchain: a parsing front-end lowers SQL into
//! the canonical tree, relopt transforms it, and a regeneration back-end
//! turns the result into SQL again. This crate prioritizes:
//!
//! - **Immutable arena-allocated plans**: rewrites allocate new nodes and
//!   share unchanged subtrees, so every intermediate tree stays valid
//! - **A fixed, ordered rule pipeline**: deterministic output, no
//!   cost model, no search
//! - **A complete rewrite trace**: one snapshot per rule application,
//!   renderable for inspection
//!
//! ## Quick Start
//!
//! ```ignore
//! use bumpalo::Bump;
//! use relopt::{AlgebraNode, Attr, Optimizer, Predicate};
//!
//! let arena = Bump::new();
//! let dept = AlgebraNode::relation(&arena, "Dept", "d");
//! let emp = AlgebraNode::relation(&arena, "Emp", "e");
//! let cross = AlgebraNode::cross(&arena, dept, emp);
//! let pred = Predicate::eq_attrs(
//!     &arena,
//!     Attr::qualified("e", "dept_id"),
//!     Attr::qualified("d", "id"),
//! );
//! let tree = AlgebraNode::selection(&arena, cross, pred);
//!
//! let out = Optimizer::default().optimize(tree, &arena)?;
//! println!("{}", out.root);
//! for step in out.trace.steps() {
//!     println!("[{}] {}", step.rule, step.description);
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │      Optimizer (rule pipeline)       │
//! ├──────────────────┬──────────────────┤
//! │  rules (8 stages │  trace recorder   │
//! │   + unnesting)   │                   │
//! ├──────────────────┴──────────────────┤
//! │  algebra (tree, predicates, render,  │
//! │        resolvability checks)         │
//! ├─────────────────────────────────────┤
//! │        bumpalo arena (nodes)         │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Pipeline
//!
//! 1. conjunct decomposition
//! 2. selection pushdown (consulting subquery unnesting)
//! 3. projection pushdown
//! 4. joinization of cross products
//! 5. greedy left-deep join reordering
//! 6. HAVING promotion
//! 7. early aggregation below joins
//! 8. redundant predicate elimination
//!
//! ## Module Overview
//!
//! - [`algebra`]: the tree, the predicate model, rendering, validation
//! - [`optimizer`]: the rule trait, the pipeline driver, the trace
//! - [`config`]: runtime toggles and fixed-point budgets

pub mod algebra;
pub mod config;
pub mod optimizer;

pub use algebra::{
    AggregateCall, AggregateFunc, AlgebraNode, Attr, CmpOp, OutputColumn, Predicate, Scalar,
    SortKey, UnresolvedAttribute,
};
pub use config::OptimizerConfig;
pub use optimizer::trace::{StepKind, TraceRecorder, TraceStep};
pub use optimizer::{Optimized, Optimizer, RewriteRule};
