use std::fmt;

use crate::ir::{IrType, VarId};

/// Storage class of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    /// The `n`-th method argument, defined on entry
    Argument(u32),
    /// A named local of the source method
    Local,
    /// A compiler-generated temporary
    Temporary,
}

/// A variable of one method.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub(crate) id: VarId,
    pub(crate) name: String,
    pub(crate) ty: IrType,
    pub(crate) kind: VariableKind,
}

impl Variable {
    /// Returns the variable's id.
    #[must_use]
    pub const fn id(&self) -> VarId {
        self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value type.
    #[must_use]
    pub const fn ty(&self) -> IrType {
        self.ty
    }

    /// Returns the storage class.
    #[must_use]
    pub const fn kind(&self) -> VariableKind {
        self.kind
    }

    /// Returns `true` for compiler-generated temporaries.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self.kind, VariableKind::Temporary)
    }

    /// Returns `true` for method arguments.
    #[must_use]
    pub const fn is_argument(&self) -> bool {
        matches!(self.kind, VariableKind::Argument(_))
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}
