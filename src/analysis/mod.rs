//! Per-method data-flow analyses and the inter-procedural calls database.
//!
//! All per-method analyses are plain tables computed from one
//! [`ControlFlowGraph`](crate::ir::ControlFlowGraph) generation. They are owned
//! by the graph's [`AnalysisCache`] and reached through
//! [`ControlFlowGraph::acquire`](crate::ir::ControlFlowGraph::acquire), which
//! returns an [`AnalysisSnapshot`] whose analyses all describe the same
//! generation.
//!
//! # Key Components
//!
//! - [`SpanningTree`] - Reverse-postorder numbering of operators and variables
//! - [`UseDefChains`] - Readers and writers of every variable, plus definition checking
//! - [`PropertiesOfVariables`] - Address-taken / argument flags
//! - [`Liveness`] - Block-level live variable sets
//! - [`AnalysisCache`] / [`CacheKind`] / [`AnalysisSnapshot`] - Generation-checked acquisition
//! - [`CallsDatabase`] - Call graph with transitive closures in both directions
//!
//! # Usage
//!
//! ```rust,ignore
//! use ember_midend::analysis::CacheKind;
//!
//! let snapshot = cfg.acquire(CacheKind::USE_DEF_CHAINS | CacheKind::VARIABLE_PROPERTIES)?;
//! snapshot.verify_definitions()?;
//! ```

mod cache;
mod callgraph;
mod defuse;
mod liveness;
mod properties;
mod spanning;

pub use cache::{AnalysisCache, AnalysisSnapshot, CacheKind};
pub use callgraph::{CallDirection, CallsDatabase};
pub use defuse::UseDefChains;
pub use liveness::Liveness;
pub use properties::{PropertiesOfVariables, VariableProperties};
pub use spanning::SpanningTree;
