//! The operator/variable model.
//!
//! A method body is a [`ControlFlowGraph`]: an arena of [`BasicBlock`]s, each an
//! ordered list of [`Operator`]s ending in one control operator, plus the
//! method's [`Variable`]s. All cross references are stable ids ([`BlockId`],
//! [`OperatorId`], [`VarId`]) rather than pointers, so analyses can be plain
//! index-to-index tables invalidated by the graph's generation counter.
//!
//! # Key Components
//!
//! - [`OperatorKind`] - The closed set of instructions
//! - [`Expression`] / [`ConstValue`] - Operator arguments
//! - [`ControlFlowGraph`] - The mutable arena with generation tracking
//! - [`CfgBuilder`] - Closure-based construction for passes and tests
//! - [`Interpreter`] - Reference semantics used for equivalence checks

mod block;
mod builder;
mod cfg;
mod expression;
mod ids;
mod interpreter;
mod operator;
mod types;
mod variable;

pub use block::{BasicBlock, BlockKind};
pub use builder::{BlockBuilder, CfgBuilder, CfgContext};
pub use cfg::ControlFlowGraph;
pub use expression::{BinaryOp, Condition, ConstValue, Expression};
pub use ids::{BlockId, GlobalId, MethodId, OperatorId, TypeId, VarId};
pub use interpreter::{Execution, Interpreter, Location, Value, DEFAULT_STEP_LIMIT};
pub use operator::{FieldRef, Operator, OperatorKind};
pub use types::IrType;
pub use variable::{Variable, VariableKind};
