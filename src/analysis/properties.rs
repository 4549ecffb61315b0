//! Per-variable property flags.

use bitflags::bitflags;

use crate::{
    analysis::SpanningTree,
    ir::{ControlFlowGraph, OperatorKind, VarId},
};

bitflags! {
    /// Facts about a variable that restrict which rewrites are legal.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VariableProperties: u8 {
        /// Some operator computes a pointer to this variable's storage, so
        /// writes through any pointer may change it
        const ADDRESS_TAKEN = 0x01;
        /// The variable is a method argument, defined on entry
        const ARGUMENT = 0x02;
    }
}

/// Property flags of every numbered variable, indexed by spanning index.
#[derive(Debug, Clone, Default)]
pub struct PropertiesOfVariables {
    generation: u64,
    slots: Vec<Option<usize>>,
    flags: Vec<VariableProperties>,
}

impl PropertiesOfVariables {
    /// Computes the flags for the variables numbered by `tree`.
    #[must_use]
    pub fn compute(cfg: &ControlFlowGraph, tree: &SpanningTree) -> Self {
        let mut flags = vec![VariableProperties::empty(); tree.variables().len()];

        for &arg in cfg.arguments() {
            if let Some(idx) = tree.variable_index(arg) {
                flags[idx] |= VariableProperties::ARGUMENT;
            }
        }

        for &op in tree.operators() {
            if let Some(OperatorKind::AddressOf { target, .. }) = cfg.operator(op).map(|o| &o.kind)
            {
                if let Some(idx) = tree.variable_index(*target) {
                    flags[idx] |= VariableProperties::ADDRESS_TAKEN;
                }
            }
        }

        PropertiesOfVariables {
            generation: tree.generation(),
            slots: tree.variable_slots().to_vec(),
            flags,
        }
    }

    /// Returns the graph generation these flags describe.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the flags of `var`; unnumbered variables have none.
    #[must_use]
    pub fn of(&self, var: VarId) -> VariableProperties {
        self.slots
            .get(var.index())
            .copied()
            .flatten()
            .and_then(|idx| self.flags.get(idx).copied())
            .unwrap_or_default()
    }

    /// Shorthand for `of(var).contains(ADDRESS_TAKEN)`.
    #[must_use]
    pub fn is_address_taken(&self, var: VarId) -> bool {
        self.of(var).contains(VariableProperties::ADDRESS_TAKEN)
    }

    /// Iterates the variables whose address is taken.
    pub fn address_taken(&self) -> impl Iterator<Item = VarId> + '_ {
        self.slots.iter().enumerate().filter_map(|(var, slot)| {
            slot.and_then(|idx| self.flags.get(idx))
                .filter(|f| f.contains(VariableProperties::ADDRESS_TAKEN))
                .map(|_| VarId::new(var))
        })
    }
}
