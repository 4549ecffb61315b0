//! Depth-first orderings and reachability.
//!
//! All traversals are iterative so deep graphs (long straight-line block
//! chains, deep call chains) cannot overflow the stack.

use crate::utils::{
    graph::{NodeId, Successors},
    BitSet,
};

/// Computes the postorder of nodes reachable from `start`.
///
/// Successors are explored in the order the graph yields them, so the result
/// is deterministic. An out-of-range start yields an empty vector.
#[allow(clippy::items_after_statements)]
pub fn postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let node_count = graph.node_count();
    if start.index() >= node_count {
        return Vec::new();
    }

    let mut visited = BitSet::new(node_count);
    let mut result = Vec::with_capacity(node_count);

    #[derive(Clone, Copy)]
    enum State {
        Enter,
        Exit,
    }

    let mut stack = vec![(start, State::Enter)];
    while let Some((node, state)) = stack.pop() {
        match state {
            State::Enter => {
                if !visited.insert(node.index()) {
                    continue;
                }
                stack.push((node, State::Exit));

                let successors: Vec<NodeId> = graph.successors(node).collect();
                for &succ in successors.iter().rev() {
                    if !visited.contains(succ.index()) {
                        stack.push((succ, State::Enter));
                    }
                }
            }
            State::Exit => result.push(node),
        }
    }

    result
}

/// Computes the reverse postorder of nodes reachable from `start`.
///
/// In an acyclic region every node precedes its successors, which is the
/// iteration order forward data-flow problems want.
pub fn reverse_postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let mut result = postorder(graph, start);
    result.reverse();
    result
}

/// Returns the set of nodes reachable from `start` through one or more edges.
///
/// `start` itself is included only if it lies on a cycle.
pub fn reachable_from<G: Successors>(graph: &G, start: NodeId) -> BitSet {
    let node_count = graph.node_count();
    let mut reached = BitSet::new(node_count);
    if start.index() >= node_count {
        return reached;
    }

    let mut stack: Vec<NodeId> = graph.successors(start).collect();
    while let Some(node) = stack.pop() {
        if reached.insert(node.index()) {
            stack.extend(graph.successors(node));
        }
    }

    reached
}

#[cfg(test)]
mod tests {
    use crate::utils::graph::{
        algorithms::{postorder, reachable_from, reverse_postorder},
        DirectedGraph, NodeId,
    };

    fn diamond() -> (DirectedGraph<&'static str>, [NodeId; 4]) {
        let mut graph = DirectedGraph::new();
        let a = graph.add_node("A");
        let b = graph.add_node("B");
        let c = graph.add_node("C");
        let d = graph.add_node("D");
        graph.add_edge(a, b).unwrap();
        graph.add_edge(a, c).unwrap();
        graph.add_edge(b, d).unwrap();
        graph.add_edge(c, d).unwrap();
        (graph, [a, b, c, d])
    }

    #[test]
    fn test_postorder_diamond() {
        let (graph, [a, b, c, d]) = diamond();
        assert_eq!(postorder(&graph, a), vec![d, b, c, a]);
    }

    #[test]
    fn test_reverse_postorder_diamond() {
        let (graph, [a, b, c, d]) = diamond();
        assert_eq!(reverse_postorder(&graph, a), vec![a, c, b, d]);
    }

    #[test]
    fn test_reverse_postorder_invalid_start() {
        let (graph, _) = diamond();
        assert!(reverse_postorder(&graph, NodeId::new(99)).is_empty());
    }

    #[test]
    fn test_reachable_excludes_start_without_cycle() {
        let (graph, [a, b, c, d]) = diamond();
        let reached = reachable_from(&graph, a);
        assert!(!reached.contains(a.index()));
        assert!(reached.contains(b.index()));
        assert!(reached.contains(c.index()));
        assert!(reached.contains(d.index()));

        let from_d = reachable_from(&graph, d);
        assert!(from_d.is_empty());
    }

    #[test]
    fn test_reachable_includes_start_on_cycle() {
        let mut graph: DirectedGraph<()> = DirectedGraph::new();
        let a = graph.add_node(());
        let b = graph.add_node(());
        graph.add_edge(a, b).unwrap();
        graph.add_edge(b, a).unwrap();
        let reached = reachable_from(&graph, a);
        assert!(reached.contains(a.index()));
        assert!(reached.contains(b.index()));
    }
}
