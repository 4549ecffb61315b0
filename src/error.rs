use thiserror::Error;

use crate::ir::{MethodId, OperatorId, TypeId, VarId};

macro_rules! invariant_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Invariant {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Invariant {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every variant here is fatal for the compilation unit (or method) that produced it. Conditions
/// a rewrite rule can simply decline, such as an unmatched pattern or a redefinition inside a
/// propagation range, never surface as an `Error`.
///
/// # Error Categories
///
/// ## Internal Consistency
/// - [`Error::Invariant`] - A structural invariant of the IR or pipeline was broken
/// - [`Error::UseBeforeDefinition`] - A variable is read with no definition reaching it
/// - [`Error::StaleCache`] - An analysis cache disagreed with the graph generation
/// - [`Error::FixedPointNotReached`] - The rewrite loop exceeded its iteration bound
///
/// ## Pipeline Configuration
/// - [`Error::PhaseCycle`] - Ordering constraints admit no linear order
/// - [`Error::UnknownPhase`] - A constraint or transition names an unregistered phase
/// - [`Error::DuplicatePhase`] - Two descriptors share a name
/// - [`Error::LayoutUnavailable`] - Layout-dependent data requested without a valid layout
///
/// ## Type System
/// - [`Error::TypeNotFound`] - Requested type not found in the type system
/// - [`Error::MethodNotFound`] - Requested method not registered with the unit
/// - [`Error::RecursiveLayout`] - A value type embeds itself
///
/// # Examples
///
/// ```rust
/// use ember_midend::{Error, compiler::PhaseCatalogue};
///
/// let catalogue = PhaseCatalogue::with_default_phases();
/// match catalogue.schedule() {
///     Ok(order) => println!("{} phases scheduled", order.len()),
///     Err(Error::PhaseCycle(names)) => eprintln!("cyclic ordering: {names:?}"),
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// An internal-consistency invariant was violated.
    ///
    /// The error includes the source location where the violation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of the violated invariant
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Invariant violated - {file}:{line}: {message}")]
    Invariant {
        /// The message to be printed for the Invariant error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A variable is read at a point no definition reaches.
    #[error("{variable} used by {operator} (position {position}) before any reaching definition")]
    UseBeforeDefinition {
        /// The variable being read.
        variable: VarId,
        /// The reading operator.
        operator: OperatorId,
        /// Spanning-tree position of the reading operator.
        position: usize,
    },

    /// An analysis cache was handed out against a different graph generation.
    #[error("Cache '{cache}' computed for generation {cache_generation}, graph is at {graph_generation}")]
    StaleCache {
        /// Name of the offending cache.
        cache: &'static str,
        /// Generation the cache was computed for.
        cache_generation: u64,
        /// Current generation of the owning graph.
        graph_generation: u64,
    },

    /// The rewrite engine failed to converge within its bound.
    #[error("{method}: no fixed point after {iterations} iterations")]
    FixedPointNotReached {
        /// The method being optimized.
        method: MethodId,
        /// Number of iterations performed.
        iterations: usize,
    },

    /// The must-run-after and pipeline-block constraints admit no linear order.
    #[error("Phase ordering constraints are cyclic: {0:?}")]
    PhaseCycle(Vec<String>),

    /// A phase name did not resolve to a registered descriptor.
    #[error("Unknown phase '{0}'")]
    UnknownPhase(String),

    /// Two phase descriptors were registered under the same name.
    #[error("Phase '{0}' registered twice")]
    DuplicatePhase(String),

    /// Layout-dependent information was requested while no valid layout was available.
    #[error("Type layout unavailable - {0}")]
    LayoutUnavailable(String),

    /// Failed to find a type in the `TypeSystem`.
    #[error("Failed to find type in TypeSystem - {0}")]
    TypeNotFound(TypeId),

    /// Failed to find a method body in the compilation unit.
    #[error("Failed to find method - {0}")]
    MethodNotFound(MethodId),

    /// A value type contains itself, directly or transitively.
    #[error("Type {0} embeds itself by value")]
    RecursiveLayout(TypeId),

    /// The reference interpreter exceeded its step budget.
    #[error("Interpreter exceeded {0} steps")]
    ExecutionLimit(usize),

    /// The reference interpreter hit an operation it cannot evaluate.
    #[error("Evaluation failed - {0}")]
    Evaluation(String),

    /// Failed to lock target.
    ///
    /// This error occurs when a shared lock was poisoned by a panicking thread.
    #[error("Failed to lock target")]
    LockError,

    /// Graph construction or traversal error.
    #[error("{0}")]
    GraphError(String),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
