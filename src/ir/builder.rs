//! Closure-based construction of method bodies.
//!
//! The front-end normally produces graphs, but passes, tests and benchmarks
//! need to spell out small methods by hand. The builder lays out blocks by
//! number so the shape of the graph reads directly from the code:
//!
//! ```rust,ignore
//! use ember_midend::ir::{CfgBuilder, Condition, IrType, MethodId};
//!
//! let cfg = CfgBuilder::new(MethodId::new(0), "max")
//!     .arg("a", IrType::I32)
//!     .arg("b", IrType::I32)
//!     .returns(IrType::I32)
//!     .build_with(|f| {
//!         let (a, b) = (f.arg(0), f.arg(1));
//!         f.block(0, |blk| {
//!             let t = blk.compare(Condition::Lt, a, b);
//!             blk.branch(t, 1, 2);
//!         });
//!         f.block(1, |blk| blk.ret_val(b));
//!         f.block(2, |blk| blk.ret_val(a));
//!     })?;
//! ```
//!
//! Block `0` is the entry block, every other block is [`BlockKind::Normal`]
//! unless declared otherwise with [`CfgContext::block_of_kind`]. Blocks that are
//! only referenced as targets are created empty.

use crate::{
    ir::{
        BinaryOp, BlockId, BlockKind, Condition, ConstValue, ControlFlowGraph, Expression,
        FieldRef, GlobalId, IrType, MethodId, OperatorId, OperatorKind, TypeId, VarId,
    },
    utils::graph::GraphBase,
    Error, Result,
};

fn ensure_block(cfg: &mut ControlFlowGraph, id: usize) -> BlockId {
    while cfg.node_count() <= id {
        let kind = if cfg.node_count() == 0 {
            BlockKind::Entry
        } else {
            BlockKind::Normal
        };
        cfg.add_block(kind);
    }
    BlockId::new(id)
}

/// Builder for a [`ControlFlowGraph`].
#[derive(Debug)]
pub struct CfgBuilder {
    cfg: ControlFlowGraph,
}

impl CfgBuilder {
    /// Starts a method with no arguments and no return value.
    #[must_use]
    pub fn new(method: MethodId, name: impl Into<String>) -> Self {
        CfgBuilder {
            cfg: ControlFlowGraph::new(method, name),
        }
    }

    /// Declares the next argument.
    #[must_use]
    pub fn arg(mut self, name: &str, ty: IrType) -> Self {
        self.cfg.add_argument(name, ty);
        self
    }

    /// Declares the return type.
    #[must_use]
    pub fn returns(mut self, ty: IrType) -> Self {
        self.cfg.set_return_type(Some(ty));
        self
    }

    /// Runs `f` to define the blocks and returns the finished graph.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while appending operators, for example a
    /// second terminator in one block.
    pub fn build_with<F>(mut self, f: F) -> Result<ControlFlowGraph>
    where
        F: FnOnce(&mut CfgContext<'_>),
    {
        let mut ctx = CfgContext {
            cfg: &mut self.cfg,
            error: None,
        };
        ensure_block(ctx.cfg, 0);
        f(&mut ctx);

        match ctx.error {
            Some(e) => Err(e),
            None => Ok(self.cfg),
        }
    }
}

/// Method-level view handed to [`CfgBuilder::build_with`].
pub struct CfgContext<'a> {
    cfg: &'a mut ControlFlowGraph,
    error: Option<Error>,
}

impl CfgContext<'_> {
    /// Returns the `index`-th argument.
    ///
    /// # Panics
    ///
    /// Panics if fewer arguments were declared.
    #[must_use]
    pub fn arg(&self, index: usize) -> VarId {
        self.cfg.arguments()[index]
    }

    /// Declares a named local.
    pub fn local(&mut self, name: &str, ty: IrType) -> VarId {
        self.cfg.add_local(name, ty)
    }

    /// Declares a temporary without defining it.
    pub fn temp(&mut self, ty: IrType) -> VarId {
        self.cfg.add_temporary(ty)
    }

    /// Defines block `id` as an ordinary block (or the entry block for `0`).
    pub fn block<F>(&mut self, id: usize, f: F)
    where
        F: FnOnce(&mut BlockBuilder<'_>),
    {
        let kind = if id == 0 {
            BlockKind::Entry
        } else {
            BlockKind::Normal
        };
        self.block_of_kind(id, kind, f);
    }

    /// Defines block `id` with an explicit [`BlockKind`].
    pub fn block_of_kind<F>(&mut self, id: usize, kind: BlockKind, f: F)
    where
        F: FnOnce(&mut BlockBuilder<'_>),
    {
        let block = ensure_block(self.cfg, id);
        self.cfg.set_block_kind(block, kind);

        let mut builder = BlockBuilder {
            cfg: &mut *self.cfg,
            error: &mut self.error,
            block,
        };
        f(&mut builder);
    }
}

/// Appends operators to one block.
///
/// Value-producing methods allocate a fresh temporary for the result and
/// return it; the `*_to` variants write a caller-chosen variable instead.
/// Targets are block numbers as used with [`CfgContext::block`].
pub struct BlockBuilder<'a> {
    cfg: &'a mut ControlFlowGraph,
    error: &'a mut Option<Error>,
    block: BlockId,
}

impl BlockBuilder<'_> {
    /// Appends a raw operator.
    pub fn op(&mut self, kind: OperatorKind) -> Option<OperatorId> {
        for target in kind.successors() {
            ensure_block(self.cfg, target.index());
        }

        match self.cfg.append(self.block, kind) {
            Ok(id) => Some(id),
            Err(e) => {
                self.error.get_or_insert(e);
                None
            }
        }
    }

    fn type_of(&self, expr: &Expression) -> IrType {
        match expr {
            Expression::Var(v) => self
                .cfg
                .variable(*v)
                .map_or(IrType::I32, |var| var.ty()),
            Expression::Const(ConstValue::Int(_)) => IrType::I32,
            Expression::Const(ConstValue::Bool(_)) => IrType::Bool,
            Expression::Const(ConstValue::Float(_)) => IrType::F64,
            Expression::Const(ConstValue::Null) => IrType::Pointer,
        }
    }

    /// Appends `dest = src`.
    pub fn assign_to(&mut self, dest: VarId, src: impl Into<Expression>) {
        self.op(OperatorKind::Assign {
            dest,
            src: src.into(),
        });
    }

    /// Appends `t = src` and returns `t`.
    pub fn copy(&mut self, src: impl Into<Expression>) -> VarId {
        let src = src.into();
        let ty = self.type_of(&src);
        let dest = self.cfg.add_temporary(ty);
        self.assign_to(dest, src);
        dest
    }

    /// Appends `t = src` for an integer literal and returns `t`.
    pub fn const_i32(&mut self, value: i32) -> VarId {
        self.copy(ConstValue::Int(i64::from(value)))
    }

    /// Appends `dest = left <op> right` (signed).
    pub fn binary_to(
        &mut self,
        dest: VarId,
        op: BinaryOp,
        left: impl Into<Expression>,
        right: impl Into<Expression>,
    ) {
        self.op(OperatorKind::Binary {
            dest,
            op,
            signed: true,
            left: left.into(),
            right: right.into(),
        });
    }

    /// Appends `t = left <op> right` (signed) and returns `t`.
    pub fn binary(
        &mut self,
        op: BinaryOp,
        left: impl Into<Expression>,
        right: impl Into<Expression>,
    ) -> VarId {
        let left = left.into();
        let ty = self.type_of(&left);
        let dest = self.cfg.add_temporary(ty);
        self.binary_to(dest, op, left, right);
        dest
    }

    /// Appends `t = left + right` and returns `t`.
    pub fn add(&mut self, left: impl Into<Expression>, right: impl Into<Expression>) -> VarId {
        self.binary(BinaryOp::Add, left, right)
    }

    /// Appends `dest = (left <cond> right)` (signed).
    pub fn compare_to(
        &mut self,
        dest: VarId,
        cond: Condition,
        left: impl Into<Expression>,
        right: impl Into<Expression>,
    ) {
        self.op(OperatorKind::CompareAndSet {
            dest,
            cond,
            signed: true,
            left: left.into(),
            right: right.into(),
        });
    }

    /// Appends `t = (left <cond> right)` (signed) and returns the boolean `t`.
    pub fn compare(
        &mut self,
        cond: Condition,
        left: impl Into<Expression>,
        right: impl Into<Expression>,
    ) -> VarId {
        let dest = self.cfg.add_temporary(IrType::Bool);
        self.compare_to(dest, cond, left, right);
        dest
    }

    /// Appends `t = (left <cond> right)` with unsigned comparison and returns `t`.
    pub fn compare_un(
        &mut self,
        cond: Condition,
        left: impl Into<Expression>,
        right: impl Into<Expression>,
    ) -> VarId {
        let dest = self.cfg.add_temporary(IrType::Bool);
        self.op(OperatorKind::CompareAndSet {
            dest,
            cond,
            signed: false,
            left: left.into(),
            right: right.into(),
        });
        dest
    }

    /// Appends `t = zeroextend src from bits` and returns the 32-bit `t`.
    pub fn zero_extend(&mut self, src: impl Into<Expression>, bits: u32) -> VarId {
        let dest = self.cfg.add_temporary(IrType::I32);
        self.op(OperatorKind::ZeroExtend {
            dest,
            src: src.into(),
            bits,
        });
        dest
    }

    /// Appends `t = &target` and returns the pointer `t`.
    pub fn address_of(&mut self, target: VarId) -> VarId {
        let dest = self.cfg.add_temporary(IrType::Pointer);
        self.op(OperatorKind::AddressOf { dest, target });
        dest
    }

    /// Appends `t = *address` and returns `t` of type `ty`.
    pub fn load(&mut self, address: impl Into<Expression>, ty: IrType) -> VarId {
        let dest = self.cfg.add_temporary(ty);
        self.op(OperatorKind::Load {
            dest,
            address: address.into(),
        });
        dest
    }

    /// Appends `*address = value`.
    pub fn store(&mut self, address: impl Into<Expression>, value: impl Into<Expression>) {
        self.op(OperatorKind::Store {
            address: address.into(),
            value: value.into(),
        });
    }

    /// Appends `t = object.field` and returns `t` of type `ty`.
    pub fn load_field(
        &mut self,
        object: impl Into<Expression>,
        field: FieldRef,
        ty: IrType,
    ) -> VarId {
        let dest = self.cfg.add_temporary(ty);
        self.op(OperatorKind::LoadField {
            dest,
            object: object.into(),
            field,
        });
        dest
    }

    /// Appends `object.field = value`.
    pub fn store_field(
        &mut self,
        object: impl Into<Expression>,
        field: FieldRef,
        value: impl Into<Expression>,
    ) {
        self.op(OperatorKind::StoreField {
            object: object.into(),
            field,
            value: value.into(),
        });
    }

    /// Appends `t = global` and returns `t` of type `ty`.
    pub fn load_global(&mut self, global: GlobalId, ty: IrType) -> VarId {
        let dest = self.cfg.add_temporary(ty);
        self.op(OperatorKind::LoadGlobal { dest, global });
        dest
    }

    /// Appends `global = value`.
    pub fn store_global(&mut self, global: GlobalId, value: impl Into<Expression>) {
        self.op(OperatorKind::StoreGlobal {
            global,
            value: value.into(),
        });
    }

    /// Appends `t = new ty` and returns the reference `t`.
    pub fn alloc(&mut self, ty: TypeId) -> VarId {
        let dest = self.cfg.add_temporary(IrType::Object(ty));
        self.op(OperatorKind::Alloc { dest, ty });
        dest
    }

    /// Appends `t = method(args)` and returns `t` of type `ty`.
    pub fn call(&mut self, method: MethodId, args: &[Expression], ty: IrType) -> VarId {
        let dest = self.cfg.add_temporary(ty);
        self.op(OperatorKind::Call {
            dest: Some(dest),
            method,
            args: args.to_vec(),
        });
        dest
    }

    /// Appends `method(args)` discarding any result.
    pub fn call_void(&mut self, method: MethodId, args: &[Expression]) {
        self.op(OperatorKind::Call {
            dest: None,
            method,
            args: args.to_vec(),
        });
    }

    /// Appends a no-op.
    pub fn nop(&mut self) {
        self.op(OperatorKind::Nop);
    }

    /// Terminates the block with `goto target`.
    pub fn jump(&mut self, target: usize) {
        self.op(OperatorKind::Jump {
            target: BlockId::new(target),
        });
    }

    /// Terminates the block with `if cond != 0 goto taken else goto not_taken`.
    pub fn branch(&mut self, cond: impl Into<Expression>, taken: usize, not_taken: usize) {
        self.op(OperatorKind::Branch {
            cond: cond.into(),
            taken: BlockId::new(taken),
            not_taken: BlockId::new(not_taken),
        });
    }

    /// Terminates the block with a fused signed compare-and-branch.
    pub fn compare_branch(
        &mut self,
        cond: Condition,
        left: impl Into<Expression>,
        right: impl Into<Expression>,
        taken: usize,
        not_taken: usize,
    ) {
        self.op(OperatorKind::CompareBranch {
            cond,
            signed: true,
            left: left.into(),
            right: right.into(),
            taken: BlockId::new(taken),
            not_taken: BlockId::new(not_taken),
        });
    }

    /// Terminates the block with `return`.
    pub fn ret(&mut self) {
        self.op(OperatorKind::Return { value: None });
    }

    /// Terminates the block with `return value`.
    pub fn ret_val(&mut self, value: impl Into<Expression>) {
        self.op(OperatorKind::Return {
            value: Some(value.into()),
        });
    }
}
