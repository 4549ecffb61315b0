//! The calls database: inter-procedural call graph and its transitive closures.
//!
//! The database is built from the call operators of every method in the
//! compilation unit. Calls to methods outside the unit are kept apart as
//! external callees; annotation passes treat them conservatively.
//!
//! [`CallsDatabase::flatten`] computes, per method, the transitive set of
//! callees or callers. A method reaches itself only through recursion.
//!
//! # Example
//!
//! ```rust,ignore
//! use ember_midend::analysis::{CallDirection, CallsDatabase};
//!
//! let mut db = CallsDatabase::analyze(unit.iter().map(|cfg| {
//!     (cfg.method(), CallsDatabase::call_targets(cfg))
//! }))?;
//! db.flatten(CallDirection::Callers);
//!
//! for caller in db.transitive_callers(leaf).into_iter().flatten() {
//!     // every method that can end up calling `leaf`
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{
    ir::{ControlFlowGraph, MethodId, OperatorKind},
    utils::graph::{
        algorithms, DirectedGraph, GraphBase, NodeId, Predecessors, Successors,
    },
    Result,
};

/// Which way to follow call edges when flattening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallDirection {
    /// From a method to everything that may call it
    Callers,
    /// From a method to everything it may call
    Callees,
}

/// View of a graph with every edge reversed.
struct Reversed<'a, G>(&'a G);

impl<G: GraphBase> GraphBase for Reversed<'_, G> {
    fn node_count(&self) -> usize {
        self.0.node_count()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.0.node_ids()
    }
}

impl<G: Predecessors> Successors for Reversed<'_, G> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.0.predecessors(node)
    }
}

/// Call graph over the methods of one compilation unit.
#[derive(Debug, Clone, Default)]
pub struct CallsDatabase {
    graph: DirectedGraph<MethodId>,
    nodes: HashMap<MethodId, NodeId>,
    external: BTreeMap<MethodId, BTreeSet<MethodId>>,
    transitive_callees: Option<BTreeMap<MethodId, BTreeSet<MethodId>>>,
    transitive_callers: Option<BTreeMap<MethodId, BTreeSet<MethodId>>>,
}

impl CallsDatabase {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the methods called by `cfg`, in operator order, duplicates removed.
    #[must_use]
    pub fn call_targets(cfg: &ControlFlowGraph) -> Vec<MethodId> {
        let mut targets = Vec::new();
        for (_, operator) in cfg.operators() {
            if let OperatorKind::Call { method, .. } = operator.kind {
                if !targets.contains(&method) {
                    targets.push(method);
                }
            }
        }
        targets
    }

    /// Builds the database from `(method, callees)` pairs.
    ///
    /// Every method listed on the left is part of the unit; callees not listed
    /// are recorded as external.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphError`] if edge insertion fails.
    pub fn analyze<I, C>(methods: I) -> Result<Self>
    where
        I: IntoIterator<Item = (MethodId, C)>,
        C: IntoIterator<Item = MethodId>,
    {
        let calls: Vec<(MethodId, Vec<MethodId>)> = methods
            .into_iter()
            .map(|(m, callees)| (m, callees.into_iter().collect()))
            .collect();

        let mut db = CallsDatabase {
            graph: DirectedGraph::with_capacity(calls.len()),
            ..Self::default()
        };

        for (method, _) in &calls {
            if !db.nodes.contains_key(method) {
                let node = db.graph.add_node(*method);
                db.nodes.insert(*method, node);
            }
        }

        for (caller, callees) in &calls {
            let from = db.nodes[caller];
            for callee in callees {
                match db.nodes.get(callee) {
                    Some(&to) => {
                        db.graph.add_edge(from, to)?;
                    }
                    None => {
                        db.external.entry(*caller).or_default().insert(*callee);
                    }
                }
            }
        }

        Ok(db)
    }

    /// Computes the transitive closure in `direction` for every method.
    ///
    /// Flattening again in the same direction recomputes the closure.
    pub fn flatten(&mut self, direction: CallDirection) {
        let mut closure = BTreeMap::new();
        for node in self.graph.node_ids() {
            let reached = match direction {
                CallDirection::Callees => algorithms::reachable_from(&self.graph, node),
                CallDirection::Callers => {
                    algorithms::reachable_from(&Reversed(&self.graph), node)
                }
            };
            let methods: BTreeSet<MethodId> = reached
                .iter()
                .filter_map(|i| self.graph.node(NodeId::new(i)).copied())
                .collect();
            if let Some(&method) = self.graph.node(node) {
                closure.insert(method, methods);
            }
        }

        match direction {
            CallDirection::Callees => self.transitive_callees = Some(closure),
            CallDirection::Callers => self.transitive_callers = Some(closure),
        }
    }

    /// Returns `true` once [`flatten`](Self::flatten) has run in `direction`.
    #[must_use]
    pub fn is_flattened(&self, direction: CallDirection) -> bool {
        match direction {
            CallDirection::Callees => self.transitive_callees.is_some(),
            CallDirection::Callers => self.transitive_callers.is_some(),
        }
    }

    /// Returns the methods of the unit.
    pub fn methods(&self) -> impl Iterator<Item = MethodId> + '_ {
        self.graph
            .node_ids()
            .filter_map(|n| self.graph.node(n).copied())
    }

    /// Returns `true` if `method` belongs to the unit.
    #[must_use]
    pub fn contains(&self, method: MethodId) -> bool {
        self.nodes.contains_key(&method)
    }

    /// Returns the number of distinct call edges inside the unit.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the in-unit methods called directly by `method`.
    #[must_use]
    pub fn callees(&self, method: MethodId) -> Vec<MethodId> {
        self.nodes.get(&method).map_or_else(Vec::new, |&node| {
            self.graph
                .successors(node)
                .filter_map(|n| self.graph.node(n).copied())
                .collect()
        })
    }

    /// Returns the in-unit methods calling `method` directly.
    #[must_use]
    pub fn callers(&self, method: MethodId) -> Vec<MethodId> {
        self.nodes.get(&method).map_or_else(Vec::new, |&node| {
            self.graph
                .predecessors(node)
                .filter_map(|n| self.graph.node(n).copied())
                .collect()
        })
    }

    /// Returns the methods outside the unit that `method` calls.
    #[must_use]
    pub fn external_callees(&self, method: MethodId) -> Option<&BTreeSet<MethodId>> {
        self.external.get(&method)
    }

    /// Returns every method `method` may transitively call.
    ///
    /// `None` until flattened in [`CallDirection::Callees`].
    #[must_use]
    pub fn transitive_callees(&self, method: MethodId) -> Option<&BTreeSet<MethodId>> {
        self.transitive_callees.as_ref()?.get(&method)
    }

    /// Returns every method that may transitively call `method`.
    ///
    /// `None` until flattened in [`CallDirection::Callers`].
    #[must_use]
    pub fn transitive_callers(&self, method: MethodId) -> Option<&BTreeSet<MethodId>> {
        self.transitive_callers.as_ref()?.get(&method)
    }
}
