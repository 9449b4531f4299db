//! Node handles and operand conversion.
//!
//! A [`Value`] is a cheap, copyable index into one [`ScalarGraph`](crate::ScalarGraph).
//! Operations accept anything convertible into an [`Operand`], so a raw
//! number can stand in for a node on either side of a binary operation.

use petgraph::graph::NodeIndex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of a graph, stamped into every handle it hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct GraphId(u64);

impl GraphId {
    pub(crate) fn fresh() -> Self {
        Self(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle to a scalar node.
///
/// Only meaningful for the graph that created it; passing it to another
/// graph fails with [`DiffError::UnsupportedOperandType`](crate::DiffError).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value {
    pub(crate) graph: GraphId,
    pub(crate) index: NodeIndex,
}

impl Value {
    pub(crate) fn new(graph: GraphId, index: NodeIndex) -> Self {
        Self { graph, index }
    }

    /// Position of the node in its graph's arena.
    pub fn index(&self) -> NodeIndex {
        self.index
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.index.index())
    }
}

/// Either an existing node or a raw number to be wrapped into a fresh leaf.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Node(Value),
    Const(f64),
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Node(value)
    }
}

impl From<&Value> for Operand {
    fn from(value: &Value) -> Self {
        Operand::Node(*value)
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::Const(value)
    }
}

impl From<f32> for Operand {
    fn from(value: f32) -> Self {
        Operand::Const(f64::from(value))
    }
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Const(f64::from(value))
    }
}

impl From<u32> for Operand {
    fn from(value: u32) -> Self {
        Operand::Const(f64::from(value))
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Const(value as f64)
    }
}
