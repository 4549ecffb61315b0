//! The default compilation phases.
//!
//! Each phase implements [`Phase`](crate::compiler::Phase) and works on the
//! whole unit held by a [`CompilerContext`](crate::compiler::CompilerContext).
//! [`PhaseCatalogue::with_default_phases`](crate::compiler::PhaseCatalogue::with_default_phases)
//! registers them with these descriptors:
//!
//! | Phase | After | Block | From level | Default |
//! |-------|-------|-------|------------|---------|
//! | [`VerifyIr`] | | | any | on |
//! | [`LayoutTypes`] | `VerifyIr` | layout | `ConcreteTypes` | on |
//! | [`ExpandFieldAccesses`] | `LayoutTypes` | layout | `ConcreteTypes` | on |
//! | [`ReduceNumberOfTemporaries`] | `ExpandFieldAccesses` | | any | on |
//! | [`PrepareForRegisterAllocation`] | `ReduceNumberOfTemporaries` | | `ScalarValues` | on |
//! | [`CollectRegisterAllocationConstraints`] | `PrepareForRegisterAllocation` | | `Lowest` | off |

mod fields;
mod layout;
mod prepare;
mod regalloc;
mod temporaries;
mod verify;

pub use fields::{lower_field_accesses, ExpandFieldAccesses};
pub use layout::LayoutTypes;
pub use prepare::PrepareForRegisterAllocation;
pub use regalloc::{CollectRegisterAllocationConstraints, ConstraintKind, RegisterConstraint};
pub use temporaries::ReduceNumberOfTemporaries;
pub use verify::{verify_method, VerifyIr};
