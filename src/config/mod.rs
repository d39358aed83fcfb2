//! Optimizer configuration.
//!
//! The runtime surface is two flags; everything else that shapes rule
//! behavior is a fixed constant in [`constants`] so interdependent values
//! stay co-located and documented.

pub mod constants;

pub use constants::fixpoint_budget;

/// The full runtime configuration surface of the pipeline. No other
/// setting affects rule behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizerConfig {
    /// Rewrite IN/EXISTS (and negations) into semijoins/antijoins during
    /// selection pushdown.
    pub unnesting_enabled: bool,
    /// Record a tree snapshot after every rule application.
    pub emit_trace: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            unnesting_enabled: true,
            emit_trace: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OptimizerConfig::default();
        assert!(config.unnesting_enabled);
        assert!(config.emit_trace);
    }
}
