//! # Backward Pass - Reverse-Mode Autodiff
//!
//! The backward pass walks the graph in reverse topological order and applies
//! each node's VJP exactly once, so every node has received the contributions
//! of all its consumers before it pushes its own gradient to its parents.
//!
//! ## Accumulation
//!
//! Each pass distributes gradients in a pass-local buffer and then adds the
//! result into the stored `grad` of every reachable node; the root is seeded
//! to exactly 1. Nothing is reset automatically: a second pass without
//! [`ScalarGraph::zero_grad`] adds the same contributions again.
//!
//! ## Example
//!
//! ```rust
//! use scalargrad_diff::ScalarGraph;
//!
//! // y = x^3 at x = 2
//! let mut graph = ScalarGraph::new();
//! let x = graph.leaf(2.0);
//! let y = graph.pow(x, 3.0).unwrap();
//! graph.backward(y).unwrap();
//!
//! assert_eq!(graph.grad(y), 1.0);
//! assert_eq!(graph.grad(x), 12.0);
//! ```

use log::{debug, trace};
use petgraph::graph::NodeIndex;
use std::collections::HashMap;

use crate::config::GradCheckConfig;
use crate::error::DiffError;
use crate::forward::ScalarGraph;
use crate::operand::Value;

impl ScalarGraph {
    /// Run backpropagation from `root` to every node it depends on.
    pub fn backward(&mut self, root: Value) -> Result<(), DiffError> {
        let order = self.topological_order(root)?;
        let adjoints = self.adjoints(root, &order);

        for v in &order {
            let node = &mut self.graph[v.index];
            if *v == root {
                node.grad = 1.0;
            } else {
                node.grad += adjoints.get(&v.index).copied().unwrap_or(0.0);
            }
        }

        debug!("backward from {}: {} nodes updated", root, order.len());
        Ok(())
    }

    /// Gradients of `root` with respect to every node it depends on,
    /// computed without touching the stored `grad` fields.
    pub fn gradients(&self, root: Value) -> Result<HashMap<Value, f64>, DiffError> {
        let order = self.topological_order(root)?;
        let adjoints = self.adjoints(root, &order);
        Ok(order
            .into_iter()
            .map(|v| (v, adjoints.get(&v.index).copied().unwrap_or(0.0)))
            .collect())
    }

    /// Reset the gradient of every node in the graph.
    pub fn zero_grad(&mut self) {
        for node in self.graph.node_weights_mut() {
            node.grad = 0.0;
        }
    }

    /// Reset the gradient of every node reachable from `root`.
    pub fn zero_grad_from(&mut self, root: Value) -> Result<(), DiffError> {
        for v in self.topological_order(root)? {
            self.graph[v.index].grad = 0.0;
        }
        Ok(())
    }

    /// Distribute d(root)/d(node) over `order`. Keyed by node so the cost
    /// follows the reachable subgraph, not the arena.
    fn adjoints(&self, root: Value, order: &[Value]) -> HashMap<NodeIndex, f64> {
        let mut adjoints: HashMap<NodeIndex, f64> = HashMap::with_capacity(order.len());
        adjoints.insert(root.index, 1.0);

        for v in order.iter().rev() {
            let node = &self.graph[v.index];
            let output_grad = adjoints.get(&v.index).copied().unwrap_or(0.0);
            let operands = node.op.operands();
            let inputs: Vec<f64> = operands
                .iter()
                .map(|p| self.graph[p.index].value)
                .collect();

            let contributions = node.op.vjp(&inputs, output_grad);
            trace!("{} {} grad={} -> {:?}", v, node.op, output_grad, contributions);

            for (parent, contribution) in operands.iter().zip(contributions) {
                *adjoints.entry(parent.index).or_insert(0.0) += contribution;
            }
        }

        adjoints
    }
}

/// Numerical gradient of `root` with respect to `leaf`.
///
/// Uses central differences: (f(x+h) - f(x-h)) / 2h
pub fn numerical_gradient(
    graph: &ScalarGraph,
    root: Value,
    leaf: Value,
    step: f64,
) -> Result<f64, DiffError> {
    let x = graph.try_node(leaf)?.value;
    let f_plus = graph.evaluate(root, &[(leaf, x + step)])?;
    let f_minus = graph.evaluate(root, &[(leaf, x - step)])?;
    Ok((f_plus - f_minus) / (2.0 * step))
}

/// Check analytical gradients against numerical gradients.
///
/// # Arguments
///
/// * `graph` - The computation graph
/// * `root` - The scalar being differentiated
/// * `leaves` - Nodes to check; unreachable ones must have a zero gradient
/// * `config` - Step size and tolerance
///
/// # Returns
///
/// `Ok(())` if every gradient matches within tolerance, otherwise
/// [`DiffError::GradientMismatch`] for the first leaf that does not.
pub fn grad_check(
    graph: &ScalarGraph,
    root: Value,
    leaves: &[Value],
    config: &GradCheckConfig,
) -> Result<(), DiffError> {
    config.validate()?;
    let analytical = graph.gradients(root)?;

    for &leaf in leaves {
        let numerical = numerical_gradient(graph, root, leaf, config.step)?;
        let analytical_val = analytical.get(&leaf).copied().unwrap_or(0.0);
        let diff = (numerical - analytical_val).abs();

        // Use relative error for large values
        let scale = analytical_val.abs().max(numerical.abs()).max(1.0);
        let rel_diff = diff / scale;

        if rel_diff > config.tolerance && diff > config.tolerance {
            return Err(DiffError::GradientMismatch {
                node: leaf.index().index(),
                analytical: analytical_val,
                numerical,
                diff,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_backward_simple_add() {
        init_logger();
        let mut graph = ScalarGraph::new();
        let x = graph.leaf(1.0);
        let y = graph.leaf(4.0);
        let sum = graph.add(x, y).unwrap();
        graph.backward(sum).unwrap();

        assert_eq!(graph.grad(sum), 1.0);
        assert_eq!(graph.grad(x), 1.0);
        assert_eq!(graph.grad(y), 1.0);
    }

    #[test]
    fn test_backward_same_node_twice() {
        init_logger();
        let mut graph = ScalarGraph::new();
        let a = graph.leaf(3.0);
        let c = graph.add(a, a).unwrap();
        graph.backward(c).unwrap();
        assert_eq!(graph.grad(a), 2.0);

        let mut graph = ScalarGraph::new();
        let a = graph.leaf(3.0);
        let sq = graph.mul(a, a).unwrap();
        graph.backward(sq).unwrap();
        assert_eq!(graph.grad(a), 6.0);
    }

    #[test]
    fn test_backward_chain() {
        init_logger();
        // f = a * b + c
        let mut graph = ScalarGraph::new();
        let a = graph.leaf(2.0);
        let b = graph.leaf(-3.0);
        let c = graph.leaf(10.0);
        let ab = graph.mul(a, b).unwrap();
        let f = graph.add(ab, c).unwrap();
        assert_eq!(graph.value(f), 4.0);

        graph.backward(f).unwrap();
        assert_eq!(graph.grad(a), -3.0);
        assert_eq!(graph.grad(b), 2.0);
        assert_eq!(graph.grad(c), 1.0);
        assert_eq!(graph.grad(ab), 1.0);
    }

    #[test]
    fn test_backward_relu_gate() {
        init_logger();
        let mut graph = ScalarGraph::new();
        let x = graph.leaf(-5.0);
        let r = graph.relu(x).unwrap();
        graph.backward(r).unwrap();
        assert_eq!(graph.value(r), 0.0);
        assert_eq!(graph.grad(x), 0.0);

        let mut graph = ScalarGraph::new();
        let x = graph.leaf(5.0);
        let r = graph.relu(x).unwrap();
        graph.backward(r).unwrap();
        assert_eq!(graph.value(r), 5.0);
        assert_eq!(graph.grad(x), 1.0);
    }

    #[test]
    fn test_backward_division() {
        init_logger();
        let mut graph = ScalarGraph::new();
        let a = graph.leaf(6.0);
        let b = graph.leaf(2.0);
        let q = graph.div(a, b).unwrap();
        graph.backward(q).unwrap();

        assert_relative_eq!(graph.value(q), 3.0);
        assert_relative_eq!(graph.grad(a), 0.5);
        // d/db (a/b) = -a/b^2
        assert_relative_eq!(graph.grad(b), -1.5);
    }

    #[test]
    fn test_backward_subtraction_and_negation() {
        let mut graph = ScalarGraph::new();
        let a = graph.leaf(5.0);
        let b = graph.leaf(2.0);
        let d = graph.sub(a, b).unwrap();
        let n = graph.neg(d).unwrap();
        graph.backward(n).unwrap();

        assert_eq!(graph.value(n), -3.0);
        assert_eq!(graph.grad(a), -1.0);
        assert_eq!(graph.grad(b), 1.0);
    }

    #[test]
    fn test_repeated_backward_accumulates() {
        let mut graph = ScalarGraph::new();
        let a = graph.leaf(2.0);
        let b = graph.leaf(-3.0);
        let ab = graph.mul(a, b).unwrap();
        let f = graph.add(ab, 10.0).unwrap();

        graph.backward(f).unwrap();
        let once = (graph.grad(a), graph.grad(b));
        graph.backward(f).unwrap();

        assert_eq!(graph.grad(a), 2.0 * once.0);
        assert_eq!(graph.grad(b), 2.0 * once.1);
        assert_eq!(graph.grad(f), 1.0);
    }

    #[test]
    fn test_backward_in_a_crowded_arena() {
        init_logger();
        let mut graph = ScalarGraph::new();
        let unrelated: Vec<Value> = (0..10_000).map(|i| graph.leaf(i as f64)).collect();
        let a = graph.leaf(2.0);
        let b = graph.leaf(-3.0);
        let ab = graph.mul(a, b).unwrap();
        graph.backward(ab).unwrap();

        assert_eq!(graph.grad(a), -3.0);
        assert_eq!(graph.grad(b), 2.0);
        assert!(unrelated.iter().all(|&v| graph.grad(v) == 0.0));
        assert_eq!(graph.gradients(ab).unwrap().len(), 3);
    }

    #[test]
    fn test_zero_grad() {
        let mut graph = ScalarGraph::new();
        let a = graph.leaf(2.0);
        let b = graph.mul(a, 3.0).unwrap();
        graph.backward(b).unwrap();
        assert_eq!(graph.grad(a), 3.0);

        graph.zero_grad();
        assert_eq!(graph.grad(a), 0.0);
        assert_eq!(graph.grad(b), 0.0);

        graph.backward(b).unwrap();
        assert_eq!(graph.grad(a), 3.0);
    }

    #[test]
    fn test_zero_grad_from_leaves_other_subgraphs() {
        let mut graph = ScalarGraph::new();
        let a = graph.leaf(2.0);
        let b = graph.leaf(5.0);
        let ya = graph.mul(a, a).unwrap();
        let yb = graph.mul(b, 2.0).unwrap();
        graph.backward(ya).unwrap();
        graph.backward(yb).unwrap();

        graph.zero_grad_from(ya).unwrap();
        assert_eq!(graph.grad(a), 0.0);
        assert_eq!(graph.grad(b), 2.0);
    }

    #[test]
    fn test_gradients_do_not_mutate() {
        let mut graph = ScalarGraph::new();
        let x = graph.leaf(4.0);
        let y = graph.rdiv(1.0, x).unwrap();
        let grads = graph.gradients(y).unwrap();

        assert_relative_eq!(grads[&x], -0.0625);
        assert_eq!(grads[&y], 1.0);
        assert_eq!(graph.grad(x), 0.0);
    }

    #[test]
    fn test_numerical_gradient() {
        let mut graph = ScalarGraph::new();
        let x = graph.leaf(2.0);
        let y = graph.pow(x, 3.0).unwrap();
        let numerical = numerical_gradient(&graph, y, x, 1e-5).unwrap();
        assert_relative_eq!(numerical, 12.0, epsilon = 1e-5);
    }

    #[test]
    fn test_grad_check_chain() {
        // relu(a*b + c) / d, away from the relu kink
        let mut graph = ScalarGraph::new();
        let a = graph.leaf(1.5);
        let b = graph.leaf(2.0);
        let c = graph.leaf(-0.5);
        let d = graph.leaf(4.0);
        let ab = graph.mul(a, b).unwrap();
        let s = graph.add(ab, c).unwrap();
        let r = graph.relu(s).unwrap();
        let loss = graph.div(r, d).unwrap();

        let result = grad_check(&graph, loss, &[a, b, c, d], &GradCheckConfig::default());
        assert!(result.is_ok(), "Grad check failed: {:?}", result);
    }

    #[test]
    fn test_grad_check_unreachable_leaf() {
        let mut graph = ScalarGraph::new();
        let x = graph.leaf(2.0);
        let unused = graph.leaf(7.0);
        let y = graph.mul(x, x).unwrap();
        assert!(grad_check(&graph, y, &[x, unused], &GradCheckConfig::default()).is_ok());
    }

    #[test]
    fn test_grad_check_rejects_bad_config() {
        let mut graph = ScalarGraph::new();
        let x = graph.leaf(2.0);
        let config = GradCheckConfig::default().with_step(0.0);
        assert!(matches!(
            grad_check(&graph, x, &[x], &config),
            Err(DiffError::InvalidConfig { .. })
        ));
    }
}
