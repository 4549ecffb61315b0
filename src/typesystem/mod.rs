//! Types, memory layout, global data and inter-procedural method facts.
//!
//! The [`TypeSystem`] is shared by all methods of a compilation unit. It owns
//! the type definitions and their [`TypeLayout`]s, the [`DataManager`] placing
//! global data objects, and a method table carrying [`MethodAnnotations`]
//! derived from the [`CallsDatabase`](crate::analysis::CallsDatabase).
//!
//! Layout is a phase-level fact: it is computed once the unit reaches
//! concrete types and invalidated whenever the controller moves back before
//! that point.

mod annotations;
mod data;
mod layout;
mod platform;
mod registry;

pub use annotations::{MethodAnnotations, MethodFacts, MethodRecord};
pub use data::{DataManager, DataObject};
pub use layout::{FieldDefinition, TypeDefinition, TypeKind, TypeLayout};
pub use platform::{PlatformAbstraction, Register};
pub use registry::TypeSystem;
