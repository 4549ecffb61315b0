//! Cycle search over a whole graph.

use crate::utils::graph::{NodeId, Successors};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Finds a cycle anywhere in the graph.
///
/// Roots are tried in ascending index order, so the reported cycle is
/// deterministic for a given graph.
///
/// # Returns
///
/// `Some(path)` where `path[0] -> path[1] -> ... -> path[n-1] -> path[0]` is a
/// cycle, or `None` if the graph is acyclic. A self-loop yields a single-node path.
pub fn find_cycle<G: Successors>(graph: &G) -> Option<Vec<NodeId>> {
    let node_count = graph.node_count();
    let mut color = vec![Color::White; node_count];

    for root in graph.node_ids() {
        if color[root.index()] != Color::White {
            continue;
        }

        // Stack of (node, successors not yet explored)
        let mut stack: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
        color[root.index()] = Color::Gray;
        stack.push((root, graph.successors(root).collect()));

        while let Some((node, pending)) = stack.last_mut() {
            let node = *node;
            let Some(next) = pending.pop() else {
                color[node.index()] = Color::Black;
                stack.pop();
                continue;
            };

            match color[next.index()] {
                Color::White => {
                    color[next.index()] = Color::Gray;
                    let succs = graph.successors(next).collect();
                    stack.push((next, succs));
                }
                Color::Gray => {
                    let start = stack
                        .iter()
                        .position(|(n, _)| *n == next)
                        .unwrap_or(0);
                    return Some(stack[start..].iter().map(|(n, _)| *n).collect());
                }
                Color::Black => {}
            }
        }
    }

    None
}
