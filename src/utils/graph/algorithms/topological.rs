//! Kahn's algorithm with a deterministic tie-break.
//!
//! Among all nodes whose predecessors have been emitted, the one with the lowest
//! index goes first. For the phase scheduler this means registration order is
//! preserved wherever the constraints leave a choice.

use std::{cmp::Reverse, collections::BinaryHeap};

use crate::utils::graph::{GraphBase, NodeId, Predecessors, Successors};

/// Computes a topological ordering of all nodes in the graph.
///
/// # Arguments
///
/// * `graph` - The graph to order
///
/// # Returns
///
/// `Some(order)` containing every node exactly once, or `None` if the graph
/// contains a cycle.
pub fn topological_sort<G>(graph: &G) -> Option<Vec<NodeId>>
where
    G: GraphBase + Successors + Predecessors,
{
    let node_count = graph.node_count();

    let mut in_degree: Vec<usize> = vec![0; node_count];
    for node in graph.node_ids() {
        in_degree[node.index()] = graph.predecessors(node).count();
    }

    let mut ready: BinaryHeap<Reverse<NodeId>> = graph
        .node_ids()
        .filter(|node| in_degree[node.index()] == 0)
        .map(Reverse)
        .collect();

    let mut result = Vec::with_capacity(node_count);
    while let Some(Reverse(node)) = ready.pop() {
        result.push(node);
        for successor in graph.successors(node) {
            in_degree[successor.index()] -= 1;
            if in_degree[successor.index()] == 0 {
                ready.push(Reverse(successor));
            }
        }
    }

    if result.len() == node_count {
        Some(result)
    } else {
        None
    }
}
