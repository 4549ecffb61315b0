// Copyright 2025 Ember Compiler Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # ember-midend
//!
//! The middle-end of an ahead-of-time compiler for embedded targets. Method
//! bodies arrive as control flow graphs of simple operators; an ordered
//! pipeline of phases lays out types, lowers field accesses, removes
//! temporaries and prepares every method for register allocation.
//!
//! ## Features
//!
//! - **Phase scheduling** - must-run-after constraints and atomic pipeline blocks
//! - **Reversible pipeline** - phases may send control backward; layout and
//!   call-graph annotations are invalidated on the way
//! - **Generation-checked analyses** - spanning tree, use/def chains and
//!   variable properties acquired as one consistent snapshot
//! - **Peephole rewriting** - copy propagation, compare/branch fusion and
//!   branch replication iterated to a fixed point
//! - **Parallel per-method work** - methods are transformed on the rayon pool
//! - **Reference interpreter** - executable semantics for equivalence checks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ember_midend::prelude::*;
//!
//! let cfg = CfgBuilder::new(MethodId::new(0), "max")
//!     .arg("a", IrType::I32)
//!     .arg("b", IrType::I32)
//!     .returns(IrType::I32)
//!     .build_with(|f| {
//!         let (a, b) = (f.arg(0), f.arg(1));
//!         f.block(0, |blk| {
//!             let lt = blk.compare(Condition::Lt, a, b);
//!             blk.branch(lt, 1, 2);
//!         });
//!         f.block(1, |blk| blk.ret_val(b));
//!         f.block(2, |blk| blk.ret_val(a));
//!     })?;
//!
//! let ctx = CompilerContext::new(TypeSystem::default());
//! ctx.add_method(cfg)?;
//! let report = Controller::with_default_phases()?.run(&ctx)?;
//! println!("ran {} phases: {}", report.executed.len(), ctx.events.stats());
//! # Ok::<(), ember_midend::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - Operators, variables, blocks and the arena-based graph
//! - [`analysis`] - Per-method analyses behind a generation-checked cache
//! - [`typesystem`] - Types, layout, global data and method annotations
//! - [`compiler`] - Phases, scheduling, the controller and rewrite passes
//! - [`config`] - Pipeline configuration
//! - [`utils`] - Bit sets and directed graph algorithms
//! - [`Error`] and [`Result`] - Error handling

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types.
///
/// ```rust,no_run
/// use ember_midend::prelude::*;
///
/// let ctx = CompilerContext::new(TypeSystem::default());
/// let schedule = PhaseCatalogue::with_default_phases().schedule()?;
/// assert_eq!(schedule[0], "VerifyIr");
/// # Ok::<(), ember_midend::Error>(())
/// ```
pub mod prelude;

/// Data-flow analyses over one method and the inter-procedural calls database.
pub mod analysis;

/// The phase pipeline: context, phases, scheduling, controller and passes.
pub mod compiler;

/// Pipeline configuration.
pub mod config;

/// The operator/variable intermediate representation.
pub mod ir;

/// Types, layout, global data and method annotations of a compilation unit.
pub mod typesystem;

/// Shared data structures.
pub mod utils;

/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust,no_run
/// use ember_midend::{compiler::PhaseCatalogue, Result};
///
/// fn phase_count() -> Result<usize> {
///     Ok(PhaseCatalogue::with_default_phases().schedule()?.len())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `ember-midend` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust,no_run
/// use ember_midend::{compiler::{CompilerContext, Controller}, typesystem::TypeSystem, Error};
///
/// let ctx = CompilerContext::new(TypeSystem::default());
/// match Controller::with_default_phases().and_then(|mut c| c.run(&ctx)) {
///     Ok(report) => println!("{} phases executed", report.executed.len()),
///     Err(Error::UseBeforeDefinition { variable, .. }) => println!("{variable} undefined"),
///     Err(e) => println!("Error: {e}"),
/// }
/// ```
pub use error::Error;
