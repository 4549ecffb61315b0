//! The closed set of IR operators.
//!
//! Operators are a tagged enum rather than a class hierarchy: every rewrite rule
//! and analysis matches on [`OperatorKind`] exhaustively, so adding a variant
//! makes the compiler point at each place that has to learn about it.
//!
//! Each operator defines at most one variable (its result) and reads any number
//! of [`Expression`]s (its arguments). Control operators (`Jump`, `Branch`,
//! `CompareBranch`, `Return`) terminate a block and appear nowhere else.

use std::fmt;

use crate::ir::{BinaryOp, BlockId, Condition, Expression, GlobalId, MethodId, TypeId, VarId};

/// Reference to a field of a type definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// The type declaring the field.
    pub owner: TypeId,
    /// Index of the field in the declaring type's field list.
    pub index: u32,
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.f{}", self.owner, self.index)
    }
}

/// One IR instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorKind {
    /// `dest = src`
    Assign {
        /// Destination variable.
        dest: VarId,
        /// Copied value.
        src: Expression,
    },
    /// `dest = zeroextend src from bits`
    ZeroExtend {
        /// Destination variable.
        dest: VarId,
        /// Extended value.
        src: Expression,
        /// Width of the source value in bits.
        bits: u32,
    },
    /// `dest = left <op> right`
    Binary {
        /// Destination variable.
        dest: VarId,
        /// The arithmetic operation.
        op: BinaryOp,
        /// Signedness of division, remainder and right shift.
        signed: bool,
        /// Left operand.
        left: Expression,
        /// Right operand.
        right: Expression,
    },
    /// `dest = (left <cond> right)`, producing 0 or 1
    CompareAndSet {
        /// Destination variable.
        dest: VarId,
        /// Relational condition.
        cond: Condition,
        /// Whether the comparison is signed.
        signed: bool,
        /// Left operand.
        left: Expression,
        /// Right operand.
        right: Expression,
    },
    /// `dest = &target`
    AddressOf {
        /// Destination variable.
        dest: VarId,
        /// Variable whose storage is referenced.
        target: VarId,
    },
    /// `dest = *address`
    Load {
        /// Destination variable.
        dest: VarId,
        /// Pointer to read through.
        address: Expression,
    },
    /// `*address = value`
    Store {
        /// Pointer to write through.
        address: Expression,
        /// Stored value.
        value: Expression,
    },
    /// `dest = object.field`
    LoadField {
        /// Destination variable.
        dest: VarId,
        /// Object reference.
        object: Expression,
        /// Accessed field.
        field: FieldRef,
    },
    /// `object.field = value`
    StoreField {
        /// Object reference.
        object: Expression,
        /// Accessed field.
        field: FieldRef,
        /// Stored value.
        value: Expression,
    },
    /// `dest = global`
    LoadGlobal {
        /// Destination variable.
        dest: VarId,
        /// Global data object.
        global: GlobalId,
    },
    /// `global = value`
    StoreGlobal {
        /// Global data object.
        global: GlobalId,
        /// Stored value.
        value: Expression,
    },
    /// `dest = new ty`
    Alloc {
        /// Destination variable.
        dest: VarId,
        /// Allocated type.
        ty: TypeId,
    },
    /// `dest = method(args...)`
    Call {
        /// Optional destination for the return value.
        dest: Option<VarId>,
        /// Callee.
        method: MethodId,
        /// Call arguments.
        args: Vec<Expression>,
    },
    /// No operation.
    Nop,
    /// `goto target`
    Jump {
        /// Jump target.
        target: BlockId,
    },
    /// `if cond != 0 goto taken else goto not_taken`
    Branch {
        /// Tested value.
        cond: Expression,
        /// Target when the value is non-zero.
        taken: BlockId,
        /// Target when the value is zero.
        not_taken: BlockId,
    },
    /// `if left <cond> right goto taken else goto not_taken`
    CompareBranch {
        /// Relational condition.
        cond: Condition,
        /// Whether the comparison is signed.
        signed: bool,
        /// Left operand.
        left: Expression,
        /// Right operand.
        right: Expression,
        /// Target when the comparison holds.
        taken: BlockId,
        /// Target when the comparison fails.
        not_taken: BlockId,
    },
    /// `return value`
    Return {
        /// Optional returned value.
        value: Option<Expression>,
    },
}

impl OperatorKind {
    /// Returns the variable this operator defines, if any.
    #[must_use]
    pub fn result(&self) -> Option<VarId> {
        match self {
            OperatorKind::Assign { dest, .. }
            | OperatorKind::ZeroExtend { dest, .. }
            | OperatorKind::Binary { dest, .. }
            | OperatorKind::CompareAndSet { dest, .. }
            | OperatorKind::AddressOf { dest, .. }
            | OperatorKind::Load { dest, .. }
            | OperatorKind::LoadField { dest, .. }
            | OperatorKind::LoadGlobal { dest, .. }
            | OperatorKind::Alloc { dest, .. } => Some(*dest),
            OperatorKind::Call { dest, .. } => *dest,
            OperatorKind::Store { .. }
            | OperatorKind::StoreField { .. }
            | OperatorKind::StoreGlobal { .. }
            | OperatorKind::Nop
            | OperatorKind::Jump { .. }
            | OperatorKind::Branch { .. }
            | OperatorKind::CompareBranch { .. }
            | OperatorKind::Return { .. } => None,
        }
    }

    /// Returns the argument expressions in operand order.
    #[must_use]
    pub fn arguments(&self) -> Vec<&Expression> {
        match self {
            OperatorKind::Assign { src, .. } | OperatorKind::ZeroExtend { src, .. } => vec![src],
            OperatorKind::Binary { left, right, .. }
            | OperatorKind::CompareAndSet { left, right, .. }
            | OperatorKind::CompareBranch { left, right, .. } => vec![left, right],
            OperatorKind::Load { address, .. } => vec![address],
            OperatorKind::Store { address, value } => vec![address, value],
            OperatorKind::LoadField { object, .. } => vec![object],
            OperatorKind::StoreField { object, value, .. } => vec![object, value],
            OperatorKind::StoreGlobal { value, .. } => vec![value],
            OperatorKind::Call { args, .. } => args.iter().collect(),
            OperatorKind::Branch { cond, .. } => vec![cond],
            OperatorKind::Return { value } => value.iter().collect(),
            OperatorKind::AddressOf { .. }
            | OperatorKind::LoadGlobal { .. }
            | OperatorKind::Alloc { .. }
            | OperatorKind::Nop
            | OperatorKind::Jump { .. } => Vec::new(),
        }
    }

    fn arguments_mut(&mut self) -> Vec<&mut Expression> {
        match self {
            OperatorKind::Assign { src, .. } | OperatorKind::ZeroExtend { src, .. } => vec![src],
            OperatorKind::Binary { left, right, .. }
            | OperatorKind::CompareAndSet { left, right, .. }
            | OperatorKind::CompareBranch { left, right, .. } => vec![left, right],
            OperatorKind::Load { address, .. } => vec![address],
            OperatorKind::Store { address, value } => vec![address, value],
            OperatorKind::LoadField { object, .. } => vec![object],
            OperatorKind::StoreField { object, value, .. } => vec![object, value],
            OperatorKind::StoreGlobal { value, .. } => vec![value],
            OperatorKind::Call { args, .. } => args.iter_mut().collect(),
            OperatorKind::Branch { cond, .. } => vec![cond],
            OperatorKind::Return { value } => value.iter_mut().collect(),
            OperatorKind::AddressOf { .. }
            | OperatorKind::LoadGlobal { .. }
            | OperatorKind::Alloc { .. }
            | OperatorKind::Nop
            | OperatorKind::Jump { .. } => Vec::new(),
        }
    }

    /// Returns every variable this operator reads, in operand order.
    ///
    /// `AddressOf` does not read its target's value but keeps the target's
    /// storage alive, so the target is reported as used.
    #[must_use]
    pub fn used_variables(&self) -> Vec<VarId> {
        if let OperatorKind::AddressOf { target, .. } = self {
            return vec![*target];
        }
        self.arguments()
            .into_iter()
            .filter_map(Expression::as_var)
            .collect()
    }

    /// Replaces every argument reading `var` with `with`.
    ///
    /// # Returns
    ///
    /// `true` if at least one argument was replaced.
    pub fn substitute_usage(&mut self, var: VarId, with: Expression) -> bool {
        let mut changed = false;
        for arg in self.arguments_mut() {
            if arg.is_var(var) {
                *arg = with;
                changed = true;
            }
        }
        changed
    }

    /// Checks whether a read of `var` may be replaced by the expression it was copied from.
    ///
    /// `AddressOf` names its target's storage, not its value, so it never accepts
    /// a substitution.
    #[must_use]
    pub fn can_propagate_copy(&self, var: VarId) -> bool {
        match self {
            OperatorKind::AddressOf { .. } => false,
            _ => self.arguments().iter().any(|arg| arg.is_var(var)),
        }
    }

    /// Returns `true` if the operator can modify memory reachable through a pointer.
    #[must_use]
    pub const fn may_write_through_pointers(&self) -> bool {
        matches!(
            self,
            OperatorKind::Store { .. } | OperatorKind::StoreField { .. } | OperatorKind::Call { .. }
        )
    }

    /// Returns `true` if removing the operator could change observable behavior
    /// even when its result is unused.
    #[must_use]
    pub const fn has_side_effects(&self) -> bool {
        matches!(
            self,
            OperatorKind::Store { .. }
                | OperatorKind::StoreField { .. }
                | OperatorKind::StoreGlobal { .. }
                | OperatorKind::Call { .. }
                | OperatorKind::Alloc { .. }
        ) || self.is_control()
    }

    /// Returns `true` for block terminators.
    #[must_use]
    pub const fn is_control(&self) -> bool {
        matches!(
            self,
            OperatorKind::Jump { .. }
                | OperatorKind::Branch { .. }
                | OperatorKind::CompareBranch { .. }
                | OperatorKind::Return { .. }
        )
    }

    /// Returns the successor blocks named by a control operator.
    #[must_use]
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            OperatorKind::Jump { target } => vec![*target],
            OperatorKind::Branch {
                taken, not_taken, ..
            }
            | OperatorKind::CompareBranch {
                taken, not_taken, ..
            } => {
                if taken == not_taken {
                    vec![*taken]
                } else {
                    vec![*taken, *not_taken]
                }
            }
            _ => Vec::new(),
        }
    }

    /// Returns `true` for field loads and stores that still need layout lowering.
    #[must_use]
    pub const fn is_field_access(&self) -> bool {
        matches!(
            self,
            OperatorKind::LoadField { .. } | OperatorKind::StoreField { .. }
        )
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorKind::Assign { dest, src } => write!(f, "{dest} = {src}"),
            OperatorKind::ZeroExtend { dest, src, bits } => {
                write!(f, "{dest} = zeroextend {src} from {bits} bits")
            }
            OperatorKind::Binary {
                dest,
                op,
                signed,
                left,
                right,
            } => {
                let s = if *signed { "" } else { ".un" };
                write!(f, "{dest} = {left} {op}{s} {right}")
            }
            OperatorKind::CompareAndSet {
                dest,
                cond,
                signed,
                left,
                right,
            } => {
                let s = if *signed { "" } else { ".un" };
                write!(f, "{dest} = {left} {cond}{s} {right}")
            }
            OperatorKind::AddressOf { dest, target } => write!(f, "{dest} = &{target}"),
            OperatorKind::Load { dest, address } => write!(f, "{dest} = *{address}"),
            OperatorKind::Store { address, value } => write!(f, "*{address} = {value}"),
            OperatorKind::LoadField {
                dest,
                object,
                field,
            } => write!(f, "{dest} = {object}->{field}"),
            OperatorKind::StoreField {
                object,
                field,
                value,
            } => write!(f, "{object}->{field} = {value}"),
            OperatorKind::LoadGlobal { dest, global } => write!(f, "{dest} = {global}"),
            OperatorKind::StoreGlobal { global, value } => write!(f, "{global} = {value}"),
            OperatorKind::Alloc { dest, ty } => write!(f, "{dest} = new {ty}"),
            OperatorKind::Call { dest, method, args } => {
                if let Some(dest) = dest {
                    write!(f, "{dest} = ")?;
                }
                write!(f, "call {method}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            OperatorKind::Nop => write!(f, "nop"),
            OperatorKind::Jump { target } => write!(f, "goto {target}"),
            OperatorKind::Branch {
                cond,
                taken,
                not_taken,
            } => write!(f, "if {cond} != 0 goto {taken} else goto {not_taken}"),
            OperatorKind::CompareBranch {
                cond,
                signed,
                left,
                right,
                taken,
                not_taken,
            } => {
                let s = if *signed { "" } else { ".un" };
                write!(
                    f,
                    "if {left} {cond}{s} {right} goto {taken} else goto {not_taken}"
                )
            }
            OperatorKind::Return { value: Some(v) } => write!(f, "return {v}"),
            OperatorKind::Return { value: None } => write!(f, "return"),
        }
    }
}

/// An operator placed in a basic block.
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    /// The instruction.
    pub kind: OperatorKind,
    /// The owning block.
    pub block: BlockId,
}
