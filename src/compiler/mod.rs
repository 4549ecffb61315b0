//! The phase-ordered transformation pipeline.
//!
//! This module sits between the IR model and code emission:
//!
//! - [`crate::ir`] - Operators, variables and the control flow graph
//! - [`crate::analysis`] - Generation-checked per-method analyses, calls database
//! - [`compiler`](self) - Phases, their scheduling and the rewrite passes
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Compiler Pipeline                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  CompilerContext              Shared state of one unit           │
//! │    ├─ Method graphs           (DashMap, one owner per worker)    │
//! │    ├─ TypeSystem              (layout, data, annotations)        │
//! │    ├─ CallsDatabase                                              │
//! │    └─ EventLog                                                   │
//! │                                                                  │
//! │  PhaseCatalogue              Descriptors + implementations       │
//! │    └─ schedule()              must-run-after, pipeline blocks    │
//! │                                                                  │
//! │  Controller                  Cursor over the schedule            │
//! │    ├─ Next / Goto / Done      transitions requested by phases    │
//! │    └─ validate_phase_movement invalidation on backward moves     │
//! │                                                                  │
//! │  Phases                                                          │
//! │    ├─ VerifyIr                                                   │
//! │    ├─ LayoutTypes             layout, data, calls database       │
//! │    ├─ ExpandFieldAccesses     fields -> pointer arithmetic       │
//! │    ├─ ReduceNumberOfTemporaries                                  │
//! │    ├─ PrepareForRegisterAllocation                               │
//! │    └─ CollectRegisterAllocationConstraints                       │
//! │                                                                  │
//! │  Passes                      Per-method rewriters                │
//! │    ├─ TemporaryReduction      fixed-point peephole rules         │
//! │    └─ DeadCodeElimination                                        │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use ember_midend::prelude::*;
//!
//! let ctx = CompilerContext::new(types);
//! ctx.add_method(cfg)?;
//! let report = Controller::with_default_phases()?.run(&ctx)?;
//! println!("{}", ctx.events.stats());
//! ```

mod context;
mod controller;
mod events;
mod phase;
pub mod passes;
pub mod phases;
mod scheduler;

pub use context::CompilerContext;
pub use controller::{Controller, ControllerReport};
pub use events::{DerivedStats, Event, EventBuilder, EventKind, EventLog};
pub use phase::{IrLevel, Phase, PhaseDescriptor, PhaseMovement, PhaseTransition};
pub use phases::{ConstraintKind, RegisterConstraint};
pub use scheduler::{PhaseCatalogue, LAYOUT_TYPES};
