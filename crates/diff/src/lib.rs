//! # Diff - Reverse-Mode Autodiff over Scalars
//!
//! This crate implements a minimal reverse-mode automatic differentiation
//! engine. Arithmetic on scalar nodes builds a computation graph as a side
//! effect; one backward pass then yields the derivative of a chosen output
//! with respect to every node that contributed to it.
//!
//! ## Core Concepts
//!
//! - **Graphs are arenas** — nodes live in a `petgraph` graph, handles are indices
//! - **Ops are data** — each node stores a [`ScalarOp`] naming its operands per slot
//! - **Backward is the reversed order** — a topological sort, walked backwards
//!
//! ## Modules
//!
//! - [`ops`] — Primitive operations, forward values and VJP rules
//! - [`forward`] — Graph construction, derived operations, topological order
//! - [`backward`] — Backward pass, gradient reset, numerical gradient checks
//! - [`operand`] — Node handles and raw-number operands
//! - [`config`] — Gradient check settings
//!
//! ## Example
//!
//! ```rust
//! use scalargrad_diff::ScalarGraph;
//!
//! // f = a * b + c
//! let mut graph = ScalarGraph::new();
//! let a = graph.leaf(2.0);
//! let b = graph.leaf(-3.0);
//! let c = graph.leaf(10.0);
//! let ab = graph.mul(a, b).unwrap();
//! let f = graph.add(ab, c).unwrap();
//!
//! graph.backward(f).unwrap();
//! assert_eq!(graph.grad(a), -3.0);
//! assert_eq!(graph.grad(b), 2.0);
//! assert_eq!(graph.grad(c), 1.0);
//! ```

pub mod backward;
pub mod config;
pub mod error;
pub mod forward;
pub mod operand;
pub mod ops;

// Re-export key types
pub use backward::{grad_check, numerical_gradient};
pub use config::GradCheckConfig;
pub use error::DiffError;
pub use forward::{NodeView, ScalarGraph};
pub use operand::{Operand, Value};
pub use ops::ScalarOp;
