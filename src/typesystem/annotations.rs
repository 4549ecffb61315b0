//! Inter-procedural method annotations.

use bitflags::bitflags;

use crate::ir::{ControlFlowGraph, MethodId, OperatorKind};

bitflags! {
    /// Properties proven for a method and everything it may call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodAnnotations: u8 {
        /// Never writes shared (global) state
        const THREAD_SAFE = 0x01;
        /// Never allocates heap memory
        const NO_ALLOCATION = 0x02;
    }
}

/// Local facts about one method body, before propagation along call edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MethodFacts {
    /// The body stores to a global
    pub writes_global: bool,
    /// The body contains an allocation
    pub allocates: bool,
}

impl MethodFacts {
    /// Scans `cfg` for global stores and allocations.
    #[must_use]
    pub fn scan(cfg: &ControlFlowGraph) -> Self {
        let mut facts = MethodFacts::default();
        for (_, operator) in cfg.operators() {
            match operator.kind {
                OperatorKind::StoreGlobal { .. } => facts.writes_global = true,
                OperatorKind::Alloc { .. } => facts.allocates = true,
                _ => {}
            }
        }
        facts
    }
}

/// A method known to the type system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRecord {
    /// Identifier
    pub id: MethodId,
    /// Display name
    pub name: String,
    /// Local facts, refreshed before every annotation run
    pub facts: MethodFacts,
    /// Propagated annotations, empty until annotated
    pub annotations: MethodAnnotations,
}
