//! Operands, literals and the condition/arithmetic enumerations operators carry.

use std::fmt;

use strum::{EnumCount, EnumIter};

use crate::ir::VarId;

/// A literal value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    /// Integer literal, stored sign-extended to 64 bits
    Int(i64),
    /// Boolean literal
    Bool(bool),
    /// Floating-point literal
    Float(f64),
    /// The null reference
    Null,
}

impl ConstValue {
    /// Returns `true` for integer and boolean literals.
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(self, ConstValue::Int(_) | ConstValue::Bool(_))
    }

    /// Returns `true` for floating-point literals.
    #[must_use]
    pub const fn is_float(&self) -> bool {
        matches!(self, ConstValue::Float(_))
    }

    /// Returns `true` if this literal is an integer, boolean or null equal to zero.
    ///
    /// Floating-point literals never compare equal to zero here: `-0.0` and
    /// `0.0` differ in bit pattern and rewrite rules must not treat them alike.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        matches!(
            self,
            ConstValue::Int(0) | ConstValue::Bool(false) | ConstValue::Null
        )
    }

    /// Returns the integral value of this literal, if it has one.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            ConstValue::Int(v) => Some(*v),
            ConstValue::Bool(b) => Some(*b as i64),
            ConstValue::Null => Some(0),
            ConstValue::Float(_) => None,
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::Bool(b) => write!(f, "{b}"),
            ConstValue::Float(v) => write!(f, "{v:?}"),
            ConstValue::Null => write!(f, "null"),
        }
    }
}

/// An operator argument: either a variable read or a literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expression {
    /// Reads the current value of a variable
    Var(VarId),
    /// A literal value
    Const(ConstValue),
}

impl Expression {
    /// Shorthand for an integer literal.
    #[must_use]
    pub const fn int(value: i64) -> Self {
        Expression::Const(ConstValue::Int(value))
    }

    /// Returns the variable if this expression reads one.
    #[must_use]
    pub const fn as_var(&self) -> Option<VarId> {
        match self {
            Expression::Var(v) => Some(*v),
            Expression::Const(_) => None,
        }
    }

    /// Returns the literal if this expression is constant.
    #[must_use]
    pub const fn as_const(&self) -> Option<&ConstValue> {
        match self {
            Expression::Var(_) => None,
            Expression::Const(c) => Some(c),
        }
    }

    /// Returns `true` if this expression reads `var`.
    #[must_use]
    pub fn is_var(&self, var: VarId) -> bool {
        matches!(self, Expression::Var(v) if *v == var)
    }
}

impl From<VarId> for Expression {
    fn from(var: VarId) -> Self {
        Expression::Var(var)
    }
}

impl From<ConstValue> for Expression {
    fn from(value: ConstValue) -> Self {
        Expression::Const(value)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Var(v) => write!(f, "{v}"),
            Expression::Const(c) => write!(f, "{c}"),
        }
    }
}

/// Relational condition of a compare-and-set or compare-and-branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum Condition {
    /// `left == right`
    Eq,
    /// `left != right`
    Ne,
    /// `left < right`
    Lt,
    /// `left <= right`
    Le,
    /// `left > right`
    Gt,
    /// `left >= right`
    Ge,
}

impl Condition {
    /// Returns the logical negation: `!(a rel b) == (a rel.inverted() b)`.
    ///
    /// Only valid for totally ordered operands; callers must not invert float
    /// comparisons.
    #[must_use]
    pub const fn inverted(self) -> Self {
        match self {
            Condition::Eq => Condition::Ne,
            Condition::Ne => Condition::Eq,
            Condition::Lt => Condition::Ge,
            Condition::Ge => Condition::Lt,
            Condition::Le => Condition::Gt,
            Condition::Gt => Condition::Le,
        }
    }

    /// Returns the condition with operands exchanged: `(a rel b) == (b rel.swapped() a)`.
    #[must_use]
    pub const fn swapped(self) -> Self {
        match self {
            Condition::Eq => Condition::Eq,
            Condition::Ne => Condition::Ne,
            Condition::Lt => Condition::Gt,
            Condition::Gt => Condition::Lt,
            Condition::Le => Condition::Ge,
            Condition::Ge => Condition::Le,
        }
    }

    /// Evaluates the condition over two ordered values.
    #[must_use]
    pub fn evaluate<T: PartialOrd>(self, left: T, right: T) -> bool {
        match self {
            Condition::Eq => left == right,
            Condition::Ne => left != right,
            Condition::Lt => left < right,
            Condition::Le => left <= right,
            Condition::Gt => left > right,
            Condition::Ge => left >= right,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Condition::Eq => "==",
            Condition::Ne => "!=",
            Condition::Lt => "<",
            Condition::Le => "<=",
            Condition::Gt => ">",
            Condition::Ge => ">=",
        };
        f.write_str(s)
    }
}

/// Two-operand arithmetic and bitwise operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum BinaryOp {
    /// Wrapping addition
    Add,
    /// Wrapping subtraction
    Sub,
    /// Wrapping multiplication
    Mul,
    /// Division, signed or unsigned per the operator
    Div,
    /// Remainder, signed or unsigned per the operator
    Rem,
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Bitwise exclusive or
    Xor,
    /// Shift left
    Shl,
    /// Shift right, arithmetic when signed
    Shr,
}

impl BinaryOp {
    /// Evaluates the operation over 64-bit integers.
    ///
    /// # Returns
    ///
    /// `None` on division or remainder by zero.
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    pub fn evaluate(self, left: i64, right: i64, signed: bool) -> Option<i64> {
        let shift = (right & 63) as u32;
        let value = match self {
            BinaryOp::Add => left.wrapping_add(right),
            BinaryOp::Sub => left.wrapping_sub(right),
            BinaryOp::Mul => left.wrapping_mul(right),
            BinaryOp::Div if right == 0 => return None,
            BinaryOp::Rem if right == 0 => return None,
            BinaryOp::Div if signed => left.wrapping_div(right),
            BinaryOp::Rem if signed => left.wrapping_rem(right),
            BinaryOp::Div => ((left as u64) / (right as u64)) as i64,
            BinaryOp::Rem => ((left as u64) % (right as u64)) as i64,
            BinaryOp::And => left & right,
            BinaryOp::Or => left | right,
            BinaryOp::Xor => left ^ right,
            BinaryOp::Shl => left.wrapping_shl(shift),
            BinaryOp::Shr if signed => left.wrapping_shr(shift),
            BinaryOp::Shr => ((left as u64) >> shift) as i64,
        };
        Some(value)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        };
        f.write_str(s)
    }
}
