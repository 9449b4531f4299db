//! # Error Types
//!
//! Every failure in the engine is a programmer error surfaced at the call
//! that caused it. Validation runs before a node is added, so a failed
//! operation never leaves a half-built graph behind.

use thiserror::Error;

/// Errors produced while building, differentiating, or checking a graph.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DiffError {
    /// `pow` was given an exponent that is not a finite plain number.
    #[error("Invalid exponent: {reason}")]
    InvalidExponent { reason: String },

    /// An operand is neither a node of this graph nor a raw number.
    #[error("Unsupported operand type: {detail}")]
    UnsupportedOperandType { detail: String },

    /// Analytical and numerical gradients disagree for a leaf.
    #[error(
        "Gradient mismatch at node {node}: analytical={analytical}, numerical={numerical}, diff={diff}"
    )]
    GradientMismatch {
        node: usize,
        analytical: f64,
        numerical: f64,
        diff: f64,
    },

    /// Gradient-check settings are out of range.
    #[error("Invalid gradient check config: {reason}")]
    InvalidConfig { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_failure() {
        let err = DiffError::InvalidExponent {
            reason: "exponent is NaN".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid exponent: exponent is NaN");

        let err = DiffError::GradientMismatch {
            node: 3,
            analytical: 1.0,
            numerical: 2.0,
            diff: 1.0,
        };
        assert!(err.to_string().contains("node 3"));
    }
}
