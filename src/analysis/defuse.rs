//! Use and definition chains.
//!
//! For every numbered variable, [`UseDefChains`] lists the operators reading it
//! (its use chain) and the operators writing it (its def chain), both ordered by
//! spanning index. An operator that reads a variable twice appears once.
//!
//! # Example
//!
//! ```rust,ignore
//! let tree = SpanningTree::compute(&cfg);
//! let chains = UseDefChains::compute(&cfg, &tree);
//!
//! if let (Some(def), Some(use_op)) = (chains.single_def(t), chains.single_use(t)) {
//!     // t is a single-assignment, single-use candidate
//! }
//! ```

use std::collections::HashMap;

use crate::{
    analysis::{PropertiesOfVariables, SpanningTree},
    ir::{BlockId, ControlFlowGraph, OperatorKind, OperatorId, VarId},
    utils::{
        graph::{algorithms, NodeId},
        BitSet,
    },
    Error, Result,
};

/// Use and def chains of one graph generation, indexed by variable spanning index.
#[derive(Debug, Clone, Default)]
pub struct UseDefChains {
    generation: u64,
    slots: Vec<Option<usize>>,
    uses: Vec<Vec<OperatorId>>,
    defs: Vec<Vec<OperatorId>>,
}

impl UseDefChains {
    /// Builds the chains for every operator numbered by `tree`.
    #[must_use]
    pub fn compute(cfg: &ControlFlowGraph, tree: &SpanningTree) -> Self {
        let count = tree.variables().len();
        let mut uses: Vec<Vec<OperatorId>> = vec![Vec::new(); count];
        let mut defs: Vec<Vec<OperatorId>> = vec![Vec::new(); count];

        for &op in tree.operators() {
            let Some(operator) = cfg.operator(op) else {
                continue;
            };

            for var in operator.kind.used_variables() {
                if let Some(idx) = tree.variable_index(var) {
                    if uses[idx].last() != Some(&op) {
                        uses[idx].push(op);
                    }
                }
            }
            if let Some(idx) = operator.kind.result().and_then(|v| tree.variable_index(v)) {
                defs[idx].push(op);
            }
        }

        UseDefChains {
            generation: tree.generation(),
            slots: tree.variable_slots().to_vec(),
            uses,
            defs,
        }
    }

    fn slot(&self, var: VarId) -> Option<usize> {
        self.slots.get(var.index()).copied().flatten()
    }

    /// Returns the graph generation these chains describe.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the operators reading `var`, in spanning order.
    #[must_use]
    pub fn uses_of(&self, var: VarId) -> &[OperatorId] {
        self.slot(var).map_or(&[], |idx| &self.uses[idx])
    }

    /// Returns the operators writing `var`, in spanning order.
    #[must_use]
    pub fn defs_of(&self, var: VarId) -> &[OperatorId] {
        self.slot(var).map_or(&[], |idx| &self.defs[idx])
    }

    /// Returns the only reading operator of `var`, if there is exactly one.
    #[must_use]
    pub fn single_use(&self, var: VarId) -> Option<OperatorId> {
        match self.uses_of(var) {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Returns the only writing operator of `var`, if there is exactly one.
    #[must_use]
    pub fn single_def(&self, var: VarId) -> Option<OperatorId> {
        match self.defs_of(var) {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Returns `true` if no reachable operator reads `var`.
    #[must_use]
    pub fn is_unused(&self, var: VarId) -> bool {
        self.uses_of(var).is_empty()
    }

    /// Checks that every use of a variable is reached by at least one definition.
    ///
    /// A use is covered when a definition precedes it in the same block, or when
    /// a definition's block can reach the use's block along CFG edges. Arguments
    /// are defined on entry. Address-taken variables may be written through
    /// pointers and are not checked; neither are `AddressOf` operators, which
    /// name storage rather than read a value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseBeforeDefinition`] for the first uncovered use, in
    /// spanning order.
    pub fn verify(
        &self,
        cfg: &ControlFlowGraph,
        tree: &SpanningTree,
        properties: &PropertiesOfVariables,
    ) -> Result<()> {
        let mut reach_cache: HashMap<BlockId, BitSet> = HashMap::new();

        for &var in tree.variables() {
            let props = properties.of(var);
            if !props.is_empty() {
                continue;
            }

            let defs = self.defs_of(var);
            for &use_op in self.uses_of(var) {
                let Some(use_operator) = cfg.operator(use_op) else {
                    continue;
                };
                if matches!(use_operator.kind, OperatorKind::AddressOf { .. }) {
                    continue;
                }

                let use_index = tree.operator_index(use_op).unwrap_or(usize::MAX);
                let use_block = use_operator.block;

                let covered = defs.iter().any(|&def_op| {
                    let Some(def_block) = cfg.operator(def_op).map(|o| o.block) else {
                        return false;
                    };
                    let def_index = tree.operator_index(def_op).unwrap_or(usize::MAX);
                    if def_block == use_block && def_index < use_index {
                        return true;
                    }
                    reach_cache
                        .entry(def_block)
                        .or_insert_with(|| {
                            algorithms::reachable_from(cfg, NodeId::new(def_block.index()))
                        })
                        .contains(use_block.index())
                });

                if !covered {
                    return Err(Error::UseBeforeDefinition {
                        variable: var,
                        operator: use_op,
                        position: use_index,
                    });
                }
            }
        }

        Ok(())
    }
}
