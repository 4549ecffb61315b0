//! Stable arena indices for IR entities.
//!
//! Every id is a `u32` newtype. Blocks, operators and variables are addressed by
//! their position in the owning [`ControlFlowGraph`](crate::ir::ControlFlowGraph)'s
//! arenas, so ids stay valid across mutations: a deleted operator leaves a
//! tombstone rather than shifting its neighbours.

use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Creates an id from a raw arena index.
            #[must_use]
            #[allow(clippy::cast_possible_truncation)]
            pub const fn new(index: usize) -> Self {
                $name(index as u32)
            }

            /// Returns the raw arena index.
            #[must_use]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Identifies a basic block within one method.
    BlockId,
    "B"
);
define_id!(
    /// Identifies an operator within one method.
    OperatorId,
    "op"
);
define_id!(
    /// Identifies a variable within one method.
    VarId,
    "v"
);
define_id!(
    /// Identifies a method within the compilation unit.
    MethodId,
    "m"
);
define_id!(
    /// Identifies a type definition in the [`TypeSystem`](crate::typesystem::TypeSystem).
    TypeId,
    "T"
);
define_id!(
    /// Identifies a global data object owned by the [`DataManager`](crate::typesystem::DataManager).
    GlobalId,
    "g"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_and_index() {
        assert_eq!(BlockId::new(3).to_string(), "B3");
        assert_eq!(OperatorId::new(12).to_string(), "op12");
        assert_eq!(VarId::new(0).to_string(), "v0");
        assert_eq!(MethodId::new(7).index(), 7);
        assert!(TypeId::new(1) < TypeId::new(2));
    }
}
