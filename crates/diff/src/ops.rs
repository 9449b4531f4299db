//! # Scalar Operations
//!
//! This module defines `ScalarOp`, the set of primitive operations a node can
//! be produced by. Each operation knows how to:
//!
//! - Execute forward (compute the node value from its operand values)
//! - Compute its VJP (one gradient contribution per operand slot)
//!
//! ## Operations
//!
//! | Op | Forward | Backward |
//! |----|---------|----------|
//! | Add | a + b | grad flows to both |
//! | Mul | a × b | ∂L/∂a = grad × b, ∂L/∂b = grad × a |
//! | Pow | aᵖ | ∂L/∂a = grad × p × aᵖ⁻¹ (0 when p = 0) |
//! | Relu | max(0, a) | grad × (a > 0) |
//!
//! Operands are stored per slot, so `a * a` lists `a` twice and receives
//! both contributions.

use std::fmt;

use crate::operand::Value;

/// Primitive operations of the scalar graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarOp {
    /// Input constant or variable; no operands.
    Leaf,

    /// lhs + rhs
    Add { lhs: Value, rhs: Value },

    /// lhs × rhs
    Mul { lhs: Value, rhs: Value },

    /// base ^ exponent; the exponent is a plain number, not a node
    Pow { base: Value, exponent: f64 },

    /// max(0, input)
    Relu { input: Value },
}

impl ScalarOp {
    /// Operands in slot order. A node used twice appears twice.
    pub fn operands(&self) -> Vec<Value> {
        match *self {
            ScalarOp::Leaf => vec![],
            ScalarOp::Add { lhs, rhs } | ScalarOp::Mul { lhs, rhs } => vec![lhs, rhs],
            ScalarOp::Pow { base, .. } => vec![base],
            ScalarOp::Relu { input } => vec![input],
        }
    }

    /// Number of operand slots.
    pub fn arity(&self) -> usize {
        match self {
            ScalarOp::Leaf => 0,
            ScalarOp::Add { .. } | ScalarOp::Mul { .. } => 2,
            ScalarOp::Pow { .. } | ScalarOp::Relu { .. } => 1,
        }
    }

    /// Execute the forward pass.
    ///
    /// `inputs` holds the operand values in slot order. Returns `None` for
    /// [`ScalarOp::Leaf`], whose value is not derived from anything.
    pub fn forward(&self, inputs: &[f64]) -> Option<f64> {
        debug_assert_eq!(inputs.len(), self.arity(), "{} arity mismatch", self);
        match self {
            ScalarOp::Leaf => None,
            ScalarOp::Add { .. } => Some(inputs[0] + inputs[1]),
            ScalarOp::Mul { .. } => Some(inputs[0] * inputs[1]),
            ScalarOp::Pow { exponent, .. } => Some(inputs[0].powf(*exponent)),
            ScalarOp::Relu { .. } => Some(inputs[0].max(0.0)),
        }
    }

    /// Compute the Vector-Jacobian Product for reverse-mode autodiff.
    ///
    /// # Arguments
    ///
    /// * `inputs` - Operand values in slot order, as seen by the forward pass
    /// * `output_grad` - Gradient of the root with respect to this node
    ///
    /// # Returns
    ///
    /// One contribution per slot, aligned with [`ScalarOp::operands`].
    pub fn vjp(&self, inputs: &[f64], output_grad: f64) -> Vec<f64> {
        debug_assert_eq!(inputs.len(), self.arity(), "{} arity mismatch", self);
        match self {
            ScalarOp::Leaf => vec![],

            // z = x + y
            ScalarOp::Add { .. } => vec![output_grad, output_grad],

            // z = x * y: each side scales by the *other* operand
            ScalarOp::Mul { .. } => {
                let (x, y) = (inputs[0], inputs[1]);
                vec![y * output_grad, x * output_grad]
            }

            // z = x^p; x^0 is constant, so skip 0 * 0^-1 at x = 0
            ScalarOp::Pow { exponent, .. } => {
                if *exponent == 0.0 {
                    return vec![0.0];
                }
                let x = inputs[0];
                vec![exponent * x.powf(exponent - 1.0) * output_grad]
            }

            // z = max(0, x); zero at the boundary
            ScalarOp::Relu { .. } => {
                let mask = if inputs[0] > 0.0 { 1.0 } else { 0.0 };
                vec![mask * output_grad]
            }
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, ScalarOp::Leaf)
    }
}

impl fmt::Display for ScalarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarOp::Leaf => write!(f, "Leaf"),
            ScalarOp::Add { lhs, rhs } => write!(f, "Add({}, {})", lhs, rhs),
            ScalarOp::Mul { lhs, rhs } => write!(f, "Mul({}, {})", lhs, rhs),
            ScalarOp::Pow { base, exponent } => write!(f, "Pow({}, {})", base, exponent),
            ScalarOp::Relu { input } => write!(f, "ReLU({})", input),
        }
    }
}
