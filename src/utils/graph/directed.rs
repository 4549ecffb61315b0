use crate::{
    utils::graph::{GraphBase, NodeId, Predecessors, Successors},
    Error, Result,
};

/// A directed graph with per-node payloads and adjacency lists in both directions.
///
/// Parallel edges are collapsed: adding an edge that already exists is a no-op.
/// Nodes are never removed, so a [`NodeId`] stays valid for the graph's lifetime.
#[derive(Debug, Clone)]
pub struct DirectedGraph<N> {
    nodes: Vec<N>,
    successors: Vec<Vec<NodeId>>,
    predecessors: Vec<Vec<NodeId>>,
    edge_count: usize,
}

impl<N> Default for DirectedGraph<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> DirectedGraph<N> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        DirectedGraph {
            nodes: Vec::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
            edge_count: 0,
        }
    }

    /// Creates an empty graph with room for `nodes` nodes.
    #[must_use]
    pub fn with_capacity(nodes: usize) -> Self {
        DirectedGraph {
            nodes: Vec::with_capacity(nodes),
            successors: Vec::with_capacity(nodes),
            predecessors: Vec::with_capacity(nodes),
            edge_count: 0,
        }
    }

    /// Adds a node and returns its identifier.
    pub fn add_node(&mut self, data: N) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(data);
        self.successors.push(Vec::new());
        self.predecessors.push(Vec::new());
        id
    }

    /// Adds the edge `from -> to`.
    ///
    /// # Returns
    ///
    /// `true` if the edge is new, `false` if it was already present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if either endpoint does not belong to this graph.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<bool> {
        if from.index() >= self.nodes.len() || to.index() >= self.nodes.len() {
            return Err(Error::GraphError(format!(
                "edge {from} -> {to} references a node outside the graph ({} nodes)",
                self.nodes.len()
            )));
        }

        if self.successors[from.index()].contains(&to) {
            return Ok(false);
        }

        self.successors[from.index()].push(to);
        self.predecessors[to.index()].push(from);
        self.edge_count += 1;
        Ok(true)
    }

    /// Returns the payload of `node`, if it exists.
    #[must_use]
    pub fn node(&self, node: NodeId) -> Option<&N> {
        self.nodes.get(node.index())
    }

    /// Returns the number of distinct edges.
    #[must_use]
    pub const fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Returns `true` if the edge `from -> to` exists.
    #[must_use]
    pub fn contains_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.successors
            .get(from.index())
            .is_some_and(|succs| succs.contains(&to))
    }
}

impl<N> GraphBase for DirectedGraph<N> {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId::new)
    }
}

impl<N> Successors for DirectedGraph<N> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.successors
            .get(node.index())
            .into_iter()
            .flat_map(|succs| succs.iter().copied())
    }
}

impl<N> Predecessors for DirectedGraph<N> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.predecessors
            .get(node.index())
            .into_iter()
            .flat_map(|preds| preds.iter().copied())
    }
}
