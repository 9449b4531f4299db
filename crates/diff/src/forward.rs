//! # Graph Construction
//!
//! This module implements the scalar computation graph: an arena of nodes
//! addressed by [`Value`] handles. Every operation computes its forward value
//! immediately and records its operands as parents, so the graph is built as
//! a side effect of the arithmetic.
//!
//! ## Key Concepts
//!
//! - **Arena**: nodes live in a `petgraph` `DiGraph`; handles are indices
//! - **Parent edges**: point from a node to each *distinct* operand
//! - **Derived ops**: negation, subtraction and division build real
//!   intermediate nodes out of the primitives
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
//! assert_eq!(graph.value(f), 4.0);
//! ```

use log::debug;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{DfsPostOrder, EdgeRef};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::DiffError;
use crate::operand::{GraphId, Operand, Value};
use crate::ops::ScalarOp;

/// A node in the scalar graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarNode {
    /// Forward value; fixed at construction
    pub(crate) value: f64,
    /// Accumulated gradient of the last differentiated root
    pub(crate) grad: f64,
    /// The operation that produced this node
    pub(crate) op: ScalarOp,
}

impl ScalarNode {
    fn new(value: f64, op: ScalarOp) -> Self {
        Self {
            value,
            grad: 0.0,
            op,
        }
    }
}

/// Edge from a node to one of its distinct operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentEdge {
    /// How many operand slots of the child refer to this parent
    pub(crate) uses: usize,
}

/// Read-only snapshot of a node, for display and inspection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeView {
    pub value: f64,
    pub grad: f64,
    pub op: ScalarOp,
}

impl fmt::Display for NodeView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node(value={}, gradient={})", self.value, self.grad)
    }
}

/// A scalar computation graph.
///
/// Owns every node it creates. Building needs `&mut self`, so construction
/// and backward passes over one graph are serialized by the borrow checker.
#[derive(Debug)]
pub struct ScalarGraph {
    id: GraphId,
    pub(crate) graph: DiGraph<ScalarNode, ParentEdge>,
}

impl ScalarGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            id: GraphId::fresh(),
            graph: DiGraph::new(),
        }
    }

    /// Create an empty graph with room for `nodes` nodes.
    ///
    /// Binary operations add up to two parent edges per node, so edge
    /// capacity is reserved at twice the node count.
    pub fn with_capacity(nodes: usize) -> Self {
        Self {
            id: GraphId::fresh(),
            graph: DiGraph::with_capacity(nodes, nodes * 2),
        }
    }

    /// Add a leaf node holding `value`.
    pub fn leaf(&mut self, value: f64) -> Value {
        let idx = self.graph.add_node(ScalarNode::new(value, ScalarOp::Leaf));
        Value::new(self.id, idx)
    }

    // ------------------------------------------------------------------------
    // Primitives
    // ------------------------------------------------------------------------

    /// Add an addition node: a + b
    pub fn add(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
    ) -> Result<Value, DiffError> {
        let (a, b) = (a.into(), b.into());
        self.check_operand(&a)?;
        self.check_operand(&b)?;
        let lhs = self.materialize(a);
        let rhs = self.materialize(b);
        Ok(self.push(ScalarOp::Add { lhs, rhs }))
    }

    /// Add a multiplication node: a * b
    pub fn mul(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
    ) -> Result<Value, DiffError> {
        let (a, b) = (a.into(), b.into());
        self.check_operand(&a)?;
        self.check_operand(&b)?;
        let lhs = self.materialize(a);
        let rhs = self.materialize(b);
        Ok(self.push(ScalarOp::Mul { lhs, rhs }))
    }

    /// Add a power node: base ^ exponent.
    ///
    /// The exponent must be a finite plain number. A node exponent, NaN, or
    /// an infinity fails with [`DiffError::InvalidExponent`] and adds nothing.
    pub fn pow(
        &mut self,
        base: impl Into<Operand>,
        exponent: impl Into<Operand>,
    ) -> Result<Value, DiffError> {
        let exponent = match exponent.into() {
            Operand::Const(p) if p.is_finite() => p,
            Operand::Const(p) => {
                return Err(DiffError::InvalidExponent {
                    reason: format!("exponent must be finite, got {}", p),
                })
            }
            Operand::Node(v) => {
                return Err(DiffError::InvalidExponent {
                    reason: format!("exponent must be a plain number, got node {}", v),
                })
            }
        };
        let base = base.into();
        self.check_operand(&base)?;
        let base = self.materialize(base);
        Ok(self.push(ScalarOp::Pow { base, exponent }))
    }

    /// Add a ReLU node. Always a new node, even for non-negative inputs.
    pub fn relu(&mut self, x: impl Into<Operand>) -> Result<Value, DiffError> {
        let x = x.into();
        self.check_operand(&x)?;
        let input = self.materialize(x);
        Ok(self.push(ScalarOp::Relu { input }))
    }

    // ------------------------------------------------------------------------
    // Derived operations
    // ------------------------------------------------------------------------

    /// -x, built as x * -1
    pub fn neg(&mut self, x: impl Into<Operand>) -> Result<Value, DiffError> {
        let x = x.into();
        self.check_operand(&x)?;
        let x = self.materialize(x);
        let minus_one = self.leaf(-1.0);
        self.mul(x, minus_one)
    }

    /// a - b, built as a + (-b)
    pub fn sub(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
    ) -> Result<Value, DiffError> {
        let (a, b) = (a.into(), b.into());
        self.check_operand(&a)?;
        self.check_operand(&b)?;
        let a = self.materialize(a);
        let negated = self.neg(b)?;
        self.add(a, negated)
    }

    /// a / b, built as a * b^-1
    pub fn div(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
    ) -> Result<Value, DiffError> {
        let (a, b) = (a.into(), b.into());
        self.check_operand(&a)?;
        self.check_operand(&b)?;
        let a = self.materialize(a);
        let reciprocal = self.pow(b, -1.0)?;
        self.mul(a, reciprocal)
    }

    /// k + x with the raw number on the left.
    pub fn radd(&mut self, k: f64, x: impl Into<Operand>) -> Result<Value, DiffError> {
        self.add(k, x)
    }

    /// k - x with the raw number on the left.
    pub fn rsub(&mut self, k: f64, x: impl Into<Operand>) -> Result<Value, DiffError> {
        self.sub(k, x)
    }

    /// k * x with the raw number on the left.
    pub fn rmul(&mut self, k: f64, x: impl Into<Operand>) -> Result<Value, DiffError> {
        self.mul(k, x)
    }

    /// k / x with the raw number on the left.
    pub fn rdiv(&mut self, k: f64, x: impl Into<Operand>) -> Result<Value, DiffError> {
        self.div(k, x)
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Forward value of a node.
    ///
    /// # Panics
    ///
    /// If `v` was not created by this graph. Use [`ScalarGraph::try_node`]
    /// for a checked lookup.
    pub fn value(&self, v: Value) -> f64 {
        self.node_ref(v).value
    }

    /// Accumulated gradient of a node.
    ///
    /// # Panics
    ///
    /// If `v` was not created by this graph.
    pub fn grad(&self, v: Value) -> f64 {
        self.node_ref(v).grad
    }

    /// The operation that produced a node.
    ///
    /// # Panics
    ///
    /// If `v` was not created by this graph.
    pub fn op(&self, v: Value) -> ScalarOp {
        self.node_ref(v).op
    }

    /// Snapshot of a node; its `Display` is `Node(value=.., gradient=..)`.
    ///
    /// # Panics
    ///
    /// If `v` was not created by this graph.
    pub fn node(&self, v: Value) -> NodeView {
        let node = self.node_ref(v);
        NodeView {
            value: node.value,
            grad: node.grad,
            op: node.op,
        }
    }

    /// Checked variant of [`ScalarGraph::node`].
    pub fn try_node(&self, v: Value) -> Result<NodeView, DiffError> {
        self.check(v)?;
        Ok(self.node(v))
    }

    /// Distinct operands of a node. Empty for leaves.
    pub fn parents(&self, v: Value) -> Result<Vec<Value>, DiffError> {
        Ok(self
            .parent_uses(v)?
            .into_iter()
            .map(|(parent, _)| parent)
            .collect())
    }

    /// Distinct operands of a node, each with the number of operand slots
    /// that refer to it (`a * a` gives `[(a, 2)]`).
    pub fn parent_uses(&self, v: Value) -> Result<Vec<(Value, usize)>, DiffError> {
        self.check(v)?;
        Ok(self
            .graph
            .edges_directed(v.index, Direction::Outgoing)
            .map(|edge| (Value::new(self.id, edge.target()), edge.weight().uses))
            .collect())
    }

    /// Whether `v` is a handle into this graph.
    pub fn contains(&self, v: Value) -> bool {
        v.graph == self.id && v.index.index() < self.graph.node_count()
    }

    /// Number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Number of parent edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Drop every node. Handles issued before the call become invalid.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.id = GraphId::fresh();
    }

    // ------------------------------------------------------------------------
    // Ordering and evaluation
    // ------------------------------------------------------------------------

    /// Topological order of every node reachable from `root`.
    ///
    /// Each node appears once, after all of its parents. Depth-first
    /// post-order over the parent edges, so O(nodes + edges) of the reachable
    /// subgraph only, and iterative so long chains do not grow the call stack.
    pub fn topological_order(&self, root: Value) -> Result<Vec<Value>, DiffError> {
        self.check(root)?;
        let mut order = Vec::new();
        // hashed visit maps: `DfsPostOrder::new` sizes its bitsets to the arena
        let mut dfs: DfsPostOrder<NodeIndex, HashSet<NodeIndex>> = DfsPostOrder {
            stack: vec![root.index],
            discovered: HashSet::new(),
            finished: HashSet::new(),
        };
        while let Some(idx) = dfs.next(&self.graph) {
            order.push(Value::new(self.id, idx));
        }
        debug!("topological order from {}: {} nodes", root, order.len());
        Ok(order)
    }

    /// Recompute the value of `root` with some node values replaced.
    ///
    /// The graph itself is left untouched; this is what numerical gradient
    /// checks perturb.
    pub fn evaluate(&self, root: Value, overrides: &[(Value, f64)]) -> Result<f64, DiffError> {
        for (v, _) in overrides {
            self.check(*v)?;
        }
        let overrides: HashMap<NodeIndex, f64> =
            overrides.iter().map(|(v, x)| (v.index, *x)).collect();

        let mut values: HashMap<NodeIndex, f64> = HashMap::new();
        for v in self.topological_order(root)? {
            let node = &self.graph[v.index];
            let value = match overrides.get(&v.index) {
                Some(x) => *x,
                None => {
                    let inputs: Vec<f64> = node
                        .op
                        .operands()
                        .iter()
                        .map(|p| values[&p.index])
                        .collect();
                    node.op.forward(&inputs).unwrap_or(node.value)
                }
            };
            values.insert(v.index, value);
        }
        Ok(values[&root.index])
    }

    /// Render the subgraph under `root` as ASCII, one node per line in
    /// topological order.
    pub fn render(&self, root: Value) -> Result<String, DiffError> {
        use std::fmt::Write;
        let mut out = String::new();
        for v in self.topological_order(root)? {
            let node = self.node(v);
            // writing into a String cannot fail
            let _ = writeln!(out, "{:>5} = {:<20} {}", v.to_string(), node.op.to_string(), node);
        }
        Ok(out)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    pub(crate) fn check(&self, v: Value) -> Result<(), DiffError> {
        if self.contains(v) {
            Ok(())
        } else if v.graph != self.id {
            Err(DiffError::UnsupportedOperandType {
                detail: format!("node {} belongs to a different graph", v),
            })
        } else {
            Err(DiffError::UnsupportedOperandType {
                detail: format!("node {} is out of range ({} nodes)", v, self.len()),
            })
        }
    }

    fn check_operand(&self, operand: &Operand) -> Result<(), DiffError> {
        match operand {
            Operand::Node(v) => self.check(*v),
            Operand::Const(_) => Ok(()),
        }
    }

    /// Turn a checked operand into a handle, wrapping raw numbers in leaves.
    fn materialize(&mut self, operand: Operand) -> Value {
        match operand {
            Operand::Node(v) => v,
            Operand::Const(x) => self.leaf(x),
        }
    }

    fn node_ref(&self, v: Value) -> &ScalarNode {
        assert!(
            self.contains(v),
            "node {} does not belong to this graph",
            v
        );
        &self.graph[v.index]
    }

    /// Add a node for `op` over already-checked operands.
    fn push(&mut self, op: ScalarOp) -> Value {
        let operands = op.operands();
        let inputs: Vec<f64> = operands
            .iter()
            .map(|p| self.graph[p.index].value)
            .collect();
        let value = op.forward(&inputs).unwrap_or(0.0);
        let idx = self.graph.add_node(ScalarNode::new(value, op));

        for parent in operands {
            match self.graph.find_edge(idx, parent.index) {
                Some(edge) => self.graph[edge].uses += 1,
                None => {
                    self.graph.add_edge(idx, parent.index, ParentEdge { uses: 1 });
                }
            }
        }

        Value::new(self.id, idx)
    }
}

impl Default for ScalarGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScalarGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ScalarGraph({} nodes, {} edges)",
            self.len(),
            self.edge_count()
        )
    }
}
