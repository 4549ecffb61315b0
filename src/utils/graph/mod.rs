//! Directed graph infrastructure shared by the phase scheduler and the calls database.
//!
//! Algorithms are written against the small [`GraphBase`] / [`Successors`] /
//! [`Predecessors`] trait family so the same traversal code runs over a
//! [`DirectedGraph`] (phase constraints, call edges) and over a method's
//! [`ControlFlowGraph`](crate::ir::ControlFlowGraph) (block ordering).
//!
//! # Key Components
//!
//! - [`NodeId`] - Strongly-typed node identifier
//! - [`DirectedGraph`] - Adjacency-list graph with node payloads
//! - [`algorithms`] - Topological sort, cycle search, traversal and reachability
//!
//! # Example
//!
//! ```rust,ignore
//! use ember_midend::utils::graph::{algorithms, DirectedGraph};
//!
//! let mut graph: DirectedGraph<&str> = DirectedGraph::new();
//! let a = graph.add_node("A");
//! let b = graph.add_node("B");
//! graph.add_edge(a, b)?;
//!
//! assert_eq!(algorithms::topological_sort(&graph), Some(vec![a, b]));
//! ```

mod directed;

pub mod algorithms;

pub use directed::DirectedGraph;

use std::fmt;

/// Strongly-typed identifier of a node inside one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Creates a node identifier from a raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw index of this node.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Core graph properties: node count and node iteration.
pub trait GraphBase {
    /// Returns the size of the node index space.
    ///
    /// Every [`NodeId`] handed out by the graph has an index below this value.
    fn node_count(&self) -> usize;

    /// Iterates all node identifiers in ascending index order.
    fn node_ids(&self) -> impl Iterator<Item = NodeId>;
}

/// Forward edge traversal.
pub trait Successors: GraphBase {
    /// Iterates the direct successors of `node`.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// Backward edge traversal.
pub trait Predecessors: GraphBase {
    /// Iterates the direct predecessors of `node`.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}
