//! Per-method transformation passes.
//!
//! Passes operate on one [`ControlFlowGraph`](crate::ir::ControlFlowGraph) at a
//! time and report each modification to an
//! [`EventLog`](crate::compiler::EventLog). They hold no unit-wide state, so the
//! phases driving them can fan out over methods on the rayon pool.
//!
//! | Pass | Description |
//! |------|-------------|
//! | [`TemporaryReduction`] | Fixed-point peephole rewriter removing temporaries and strength-reducing branches |
//! | [`DeadCodeElimination`] | Folds constant branches, removes unreachable blocks and dead operators |
//!
//! [`TemporaryReduction`] runs [`DeadCodeElimination`] after every productive
//! round; dead code elimination is also usable on its own.

mod deadcode;
mod temporaries;

pub use deadcode::{DeadCodeElimination, DeadCodeStats};
pub use temporaries::{ReductionStats, TemporaryReduction};
