//! Value types carried by IR variables.

use std::fmt;

use crate::ir::{ConstValue, TypeId};

/// The type of an IR variable.
///
/// Object references are pointer-sized and carry the [`TypeId`] of the
/// referenced definition so field accesses can be resolved against the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    /// Boolean, stored as one byte holding 0 or 1
    Bool,
    /// Signed 8-bit integer
    I8,
    /// Signed 16-bit integer
    I16,
    /// Signed 32-bit integer
    I32,
    /// Signed 64-bit integer
    I64,
    /// Unsigned 8-bit integer
    U8,
    /// Unsigned 16-bit integer
    U16,
    /// Unsigned 32-bit integer
    U32,
    /// Unsigned 64-bit integer
    U64,
    /// 32-bit IEEE float
    F32,
    /// 64-bit IEEE float
    F64,
    /// Untyped machine pointer
    Pointer,
    /// Reference to an instance of the given type
    Object(TypeId),
}

impl IrType {
    /// Returns `true` for the integer types (signed and unsigned), excluding `Bool`.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            IrType::I8
                | IrType::I16
                | IrType::I32
                | IrType::I64
                | IrType::U8
                | IrType::U16
                | IrType::U32
                | IrType::U64
        )
    }

    /// Returns `true` for `F32` and `F64`.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, IrType::F32 | IrType::F64)
    }

    /// Returns `true` for signed integers and floats.
    #[must_use]
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            IrType::I8 | IrType::I16 | IrType::I32 | IrType::I64 | IrType::F32 | IrType::F64
        )
    }

    /// Returns `true` for `Pointer` and object references.
    #[must_use]
    pub const fn is_reference(self) -> bool {
        matches!(self, IrType::Pointer | IrType::Object(_))
    }

    /// Returns the storage size in bytes on a platform with the given pointer size.
    #[must_use]
    pub const fn size(self, pointer_size: u32) -> u32 {
        match self {
            IrType::Bool | IrType::I8 | IrType::U8 => 1,
            IrType::I16 | IrType::U16 => 2,
            IrType::I32 | IrType::U32 | IrType::F32 => 4,
            IrType::I64 | IrType::U64 | IrType::F64 => 8,
            IrType::Pointer | IrType::Object(_) => pointer_size,
        }
    }

    /// Returns the width in bits of an integral value of this type.
    ///
    /// References are treated as 64-bit, floats have no integral width.
    #[must_use]
    pub const fn bit_width(self) -> Option<u32> {
        match self {
            IrType::Bool | IrType::I8 | IrType::U8 => Some(8),
            IrType::I16 | IrType::U16 => Some(16),
            IrType::I32 | IrType::U32 => Some(32),
            IrType::I64 | IrType::U64 | IrType::Pointer | IrType::Object(_) => Some(64),
            IrType::F32 | IrType::F64 => None,
        }
    }

    /// Checks whether a value of type `source` may be stored into a variable of this type
    /// without a conversion operator.
    ///
    /// Integers of equal width are interchangeable (signedness is a property of
    /// the operator, not the storage), any reference may be stored as a raw
    /// pointer, and everything else requires an exact match.
    #[must_use]
    pub fn can_be_assigned_from(self, source: IrType) -> bool {
        if self == source {
            return true;
        }

        match (self, source) {
            (IrType::Pointer, IrType::Object(_)) => true,
            (a, b) if a.is_integer() && b.is_integer() => a.bit_width() == b.bit_width(),
            _ => false,
        }
    }

    /// Checks whether a literal can initialize a variable of this type.
    #[must_use]
    pub fn accepts_constant(self, value: &ConstValue) -> bool {
        match value {
            ConstValue::Int(_) => self.is_integer() || self == IrType::Bool,
            ConstValue::Bool(_) => self == IrType::Bool || self.is_integer(),
            ConstValue::Float(_) => self.is_float(),
            ConstValue::Null => self.is_reference(),
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Bool => write!(f, "bool"),
            IrType::I8 => write!(f, "i8"),
            IrType::I16 => write!(f, "i16"),
            IrType::I32 => write!(f, "i32"),
            IrType::I64 => write!(f, "i64"),
            IrType::U8 => write!(f, "u8"),
            IrType::U16 => write!(f, "u16"),
            IrType::U32 => write!(f, "u32"),
            IrType::U64 => write!(f, "u64"),
            IrType::F32 => write!(f, "f32"),
            IrType::F64 => write!(f, "f64"),
            IrType::Pointer => write!(f, "ptr"),
            IrType::Object(ty) => write!(f, "ref {ty}"),
        }
    }
}
