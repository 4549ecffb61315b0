//! Phase descriptors and the `Phase` trait.

use std::fmt;

use strum::{Display, EnumIter, EnumString, FromRepr};

use crate::{compiler::CompilerContext, Result};

/// Maturity of the IR, rising monotonically as lowering phases run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter, FromRepr,
)]
#[repr(u8)]
pub enum IrLevel {
    /// Objects with virtual fields, types not yet laid out
    ObjectOriented = 0,
    /// All types concrete, field accesses still symbolic
    ConcreteTypes = 1,
    /// Field accesses lowered to pointer arithmetic
    ScalarValues = 2,
    /// Ready for register allocation
    Lowest = 3,
}

/// Static description of a phase, consumed by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseDescriptor {
    /// Unique name
    pub name: String,
    /// Phases that must execute before this one
    pub must_run_after: Vec<String>,
    /// Pipeline block this phase belongs to; members execute contiguously
    pub block: Option<String>,
    /// Lowest IR level the phase may run at
    pub min_level: IrLevel,
    /// Enabled unless overridden by configuration
    pub enabled: bool,
}

impl PhaseDescriptor {
    /// Creates an enabled descriptor with no constraints that runs at any level.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        PhaseDescriptor {
            name: name.into(),
            must_run_after: Vec::new(),
            block: None,
            min_level: IrLevel::ObjectOriented,
            enabled: true,
        }
    }

    /// Adds a must-run-after constraint.
    #[must_use]
    pub fn after(mut self, phase: impl Into<String>) -> Self {
        self.must_run_after.push(phase.into());
        self
    }

    /// Places the phase in a pipeline block.
    #[must_use]
    pub fn in_block(mut self, block: impl Into<String>) -> Self {
        self.block = Some(block.into());
        self
    }

    /// Restricts the phase to IR at `level` or above.
    #[must_use]
    pub fn from_level(mut self, level: IrLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Disables the phase by default.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Returns `true` if the phase may run on IR at `level`.
    #[must_use]
    pub fn applies_at(&self, level: IrLevel) -> bool {
        level >= self.min_level
    }
}

impl fmt::Display for PhaseDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(block) = &self.block {
            write!(f, " [{block}]")?;
        }
        Ok(())
    }
}

/// Where control goes after a phase has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseTransition {
    /// Continue with the next phase in schedule order
    Next,
    /// Jump to the named phase; earlier phases are re-entered
    Goto(String),
    /// Stop the pipeline
    Done,
}

/// Position of a control move between two scheduled phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseMovement {
    /// Schedule index of the phase control leaves
    pub from: usize,
    /// Schedule index of the phase control enters
    pub to: usize,
    /// Schedule index of the phase being notified
    pub own: usize,
}

impl PhaseMovement {
    /// Returns `true` if control re-enters this phase or one before it.
    #[must_use]
    pub const fn is_backward_past_own(&self) -> bool {
        self.to < self.from && self.to <= self.own
    }
}

/// A compilation phase.
///
/// Phases must be thread-safe (Send + Sync). Per-method work inside
/// [`run`](Phase::run) may fan out over rayon via
/// [`CompilerContext::for_each_method`].
pub trait Phase: Send + Sync {
    /// Unique name, matching the descriptor the phase is registered with.
    fn name(&self) -> &'static str;

    /// Runs the phase over the whole compilation unit.
    ///
    /// # Errors
    ///
    /// Returns an error on invariant violations; the unit cannot be compiled.
    fn run(&mut self, ctx: &CompilerContext) -> Result<PhaseTransition>;

    /// Called on every phase whenever control moves between scheduled phases.
    ///
    /// Phases owning derived state use this to discard it when control moves
    /// backward past them.
    ///
    /// # Errors
    ///
    /// Returns an error if discarding state fails.
    fn validate_phase_movement(
        &mut self,
        _ctx: &CompilerContext,
        _movement: PhaseMovement,
    ) -> Result<()> {
        Ok(())
    }

    /// Get a description of what this phase does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_ir_level_ordering() {
        assert!(IrLevel::ObjectOriented < IrLevel::ConcreteTypes);
        assert!(IrLevel::ScalarValues < IrLevel::Lowest);
        assert_eq!(IrLevel::from_repr(2), Some(IrLevel::ScalarValues));
        assert_eq!(IrLevel::from_str("Lowest").unwrap(), IrLevel::Lowest);
        assert_eq!(IrLevel::ConcreteTypes.to_string(), "ConcreteTypes");
    }

    #[test]
    fn test_descriptor_builder() {
        let d = PhaseDescriptor::new("ExpandFieldAccesses")
            .after("LayoutTypes")
            .in_block("layout")
            .from_level(IrLevel::ConcreteTypes);

        assert_eq!(d.must_run_after, vec!["LayoutTypes".to_string()]);
        assert!(!d.applies_at(IrLevel::ObjectOriented));
        assert!(d.applies_at(IrLevel::Lowest));
        assert_eq!(d.to_string(), "ExpandFieldAccesses [layout]");
        assert!(!PhaseDescriptor::new("x").disabled().enabled);
    }

    #[test]
    fn test_backward_movement() {
        let back = PhaseMovement { from: 3, to: 1, own: 1 };
        assert!(back.is_backward_past_own());
        let forward = PhaseMovement { from: 1, to: 2, own: 1 };
        assert!(!forward.is_backward_past_own());
        let unrelated = PhaseMovement { from: 4, to: 3, own: 1 };
        assert!(!unrelated.is_backward_past_own());
    }
}
