//! Rewrite trace.
//!
//! The pipeline records the tree after every rule application, in
//! application order, for display by the consumer. Because nodes are
//! immutable arena allocations, each step pins its root by reference and
//! stays valid no matter what later stages do. Memory grows linearly with
//! applied rules × tree size, which is intentional at single-block-query
//! scale.

use crate::algebra::{render, AlgebraNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// The rule produced a new tree; `root` is that tree.
    Applied,
    /// The rule (or one rewrite inside it) was skipped; `root` is the
    /// last successfully produced tree.
    Skipped,
}

/// One entry of the trace: immutable once created.
#[derive(Debug, Clone)]
pub struct TraceStep<'a> {
    pub index: usize,
    pub rule: &'static str,
    pub kind: StepKind,
    pub root: &'a AlgebraNode<'a>,
    pub description: String,
}

impl TraceStep<'_> {
    /// Renders this step's tree with the standard operator symbols.
    pub fn rendered_tree(&self) -> String {
        render::render(self.root)
    }
}

#[derive(Debug, Default)]
pub struct TraceRecorder<'a> {
    steps: Vec<TraceStep<'a>>,
    enabled: bool,
}

impl<'a> TraceRecorder<'a> {
    pub fn new(enabled: bool) -> Self {
        Self {
            steps: Vec::new(),
            enabled,
        }
    }

    pub fn record(&mut self, rule: &'static str, root: &'a AlgebraNode<'a>, description: String) {
        if !self.enabled {
            return;
        }
        self.steps.push(TraceStep {
            index: self.steps.len(),
            rule,
            kind: StepKind::Applied,
            root,
            description,
        });
    }

    pub fn record_skip(
        &mut self,
        rule: &'static str,
        root: &'a AlgebraNode<'a>,
        description: String,
    ) {
        if !self.enabled {
            return;
        }
        // Fixed-point loops revisit the same shapes; one note per reason
        // is enough.
        let duplicate = self
            .steps
            .iter()
            .any(|s| s.kind == StepKind::Skipped && s.rule == rule && s.description == description);
        if duplicate {
            return;
        }
        self.steps.push(TraceStep {
            index: self.steps.len(),
            rule,
            kind: StepKind::Skipped,
            root,
            description,
        });
    }

    pub fn steps(&self) -> &[TraceStep<'a>] {
        &self.steps
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    #[test]
    fn test_disabled_recorder_stays_empty() {
        let arena = Bump::new();
        let rel = AlgebraNode::relation(&arena, "T", "t");
        let mut trace = TraceRecorder::new(false);
        assert!(!trace.is_enabled());
        trace.record("x", rel, "changed".into());
        assert!(trace.steps().is_empty());
    }

    #[test]
    fn test_steps_are_indexed_in_order() {
        let arena = Bump::new();
        let rel = AlgebraNode::relation(&arena, "T", "t");
        let mut trace = TraceRecorder::new(true);
        trace.record("a", rel, "first".into());
        trace.record("b", rel, "second".into());
        assert_eq!(trace.steps()[0].index, 0);
        assert_eq!(trace.steps()[1].index, 1);
        assert_eq!(trace.steps()[1].rule, "b");
    }

    #[test]
    fn test_skip_notes_deduplicate() {
        let arena = Bump::new();
        let rel = AlgebraNode::relation(&arena, "T", "t");
        let mut trace = TraceRecorder::new(true);
        trace.record_skip("u", rel, "not unnested — unsupported shape".into());
        trace.record_skip("u", rel, "not unnested — unsupported shape".into());
        assert_eq!(trace.steps().len(), 1);
        assert_eq!(trace.steps()[0].kind, StepKind::Skipped);
    }
}
