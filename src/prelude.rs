//! # ember-midend Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! of the middle-end. Import it to build IR, set up a compilation unit and run
//! the pipeline.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all operations
pub use crate::Error;

/// The result type used throughout the crate
pub use crate::Result;

/// Pipeline configuration
pub use crate::config::PipelineConfig;

// ================================================================================================
// Intermediate Representation
// ================================================================================================

/// Stable ids of IR entities
pub use crate::ir::{BlockId, GlobalId, MethodId, OperatorId, TypeId, VarId};

/// Operators, arguments and types
pub use crate::ir::{
    BinaryOp, Condition, ConstValue, Expression, FieldRef, IrType, Operator, OperatorKind,
};

/// The graph and its builder
pub use crate::ir::{BasicBlock, BlockKind, CfgBuilder, ControlFlowGraph};

/// Reference semantics
pub use crate::ir::{Execution, Interpreter, Value};

// ================================================================================================
// Analysis
// ================================================================================================

/// Cached per-method analyses
pub use crate::analysis::{AnalysisSnapshot, CacheKind, SpanningTree, UseDefChains};

/// Inter-procedural call graph
pub use crate::analysis::{CallDirection, CallsDatabase};

// ================================================================================================
// Type System
// ================================================================================================

/// Types, layout and target description
pub use crate::typesystem::{MethodAnnotations, PlatformAbstraction, Register, TypeSystem};

// ================================================================================================
// Pipeline
// ================================================================================================

/// Shared state, events and the controller
pub use crate::compiler::{
    CompilerContext, Controller, ControllerReport, DerivedStats, EventKind, EventLog,
};

/// Phase definition and scheduling
pub use crate::compiler::{
    IrLevel, Phase, PhaseCatalogue, PhaseDescriptor, PhaseMovement, PhaseTransition,
};

/// Register allocation constraints
pub use crate::compiler::{ConstraintKind, RegisterConstraint};

/// Per-method rewrite passes
pub use crate::compiler::passes::{DeadCodeElimination, TemporaryReduction};
