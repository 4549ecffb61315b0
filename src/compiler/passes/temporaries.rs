//! Temporary reduction: the fixed-point peephole rewriter.
//!
//! Removes the temporaries a front-end introduces when lowering expressions,
//! and strength-reduces the branches they feed. Every round acquires fresh
//! use/def chains and variable properties, plans a batch of rewrites against
//! that snapshot, releases it and applies the batch. Dead code elimination
//! runs after every productive round; the loop stops when a round plans
//! nothing.
//!
//! # Rules
//!
//! 1. A temporary with one definition and one use later in the same block is
//!    folded into its use:
//!    - `t = v; ... use(t)` becomes `use(v)` when `v` is not redefined in
//!      between (and no operator in between may write memory if `v` is
//!      address-taken). Literal sources always fold when the type accepts them.
//!    - `t = zext v; if t != 0` becomes `if v != 0` when the extension is
//!      lossless.
//!    - `t = a < b; u = t == 0` becomes `u = a >= b`; `t != 0` keeps the
//!      comparison as is. Equality tests over floats are never inverted.
//! 2. A branch testing a variable defined immediately before it tests the
//!    definition's source instead, fusing comparisons into a compare-and-branch.
//! 3. A variable read only by a branch in an ordinary block, and defined in
//!    another ordinary block that reaches the branch through no-ops and jumps
//!    alone, gets the branch replicated at the definition. Integer literals resolve the replica to a
//!    jump straight away.
//!
//! # Example
//!
//! Before:
//! ```text
//! B0: v1 = v0
//!     v2 = v1 < 10
//!     if v2 != 0 goto B1 else goto B2
//! ```
//!
//! After:
//! ```text
//! B0: if v0 < 10 goto B1 else goto B2
//! ```
//!
//! Within one batch no operator takes part in two rewrites, so every planned
//! rewrite still matches the graph it is applied to.

use std::collections::HashSet;

use crate::{
    analysis::{AnalysisSnapshot, CacheKind, PropertiesOfVariables, SpanningTree, UseDefChains},
    compiler::{passes::DeadCodeElimination, EventKind, EventLog},
    ir::{BlockId, Condition, ControlFlowGraph, Expression, IrType, OperatorId, OperatorKind, VarId},
    Error, Result,
};

/// What one reduction run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReductionStats {
    /// Rounds performed, including the final one that found nothing
    pub iterations: usize,
    /// Rewrites applied
    pub rewrites: usize,
    /// Operators deleted by rewrites and dead code elimination
    pub operators_removed: usize,
    /// Blocks deleted as unreachable
    pub blocks_removed: usize,
    /// Call operators deleted with unreachable blocks
    pub calls_removed: usize,
}

impl ReductionStats {
    /// Returns `true` if the graph was modified.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.rewrites + self.operators_removed + self.blocks_removed > 0
    }
}

#[derive(Debug)]
enum Action {
    /// Substitute `with` for the read of `temp` in `use_op`, then delete `def`
    Propagate {
        def: OperatorId,
        use_op: OperatorId,
        temp: VarId,
        with: Expression,
    },
    /// Replace `use_op`, then delete `def`
    Fuse {
        def: OperatorId,
        use_op: OperatorId,
        replacement: OperatorKind,
    },
    /// Replace a block terminator
    Retarget {
        terminator: OperatorId,
        replacement: OperatorKind,
    },
}

#[derive(Debug)]
struct Rewrite {
    kind: EventKind,
    position: usize,
    action: Action,
}

/// The temporary reduction pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemporaryReduction {
    max_iterations: Option<usize>,
}

impl TemporaryReduction {
    /// Creates the pass with the natural iteration bound.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the iteration bound.
    #[must_use]
    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = Some(iterations);
        self
    }

    /// Rewrites `cfg` until no rule applies.
    ///
    /// Every productive round removes an operator or replaces a terminator with
    /// one that cannot match the same rule again, so the loop is bounded by the
    /// operator and variable counts of the input.
    ///
    /// # Errors
    ///
    /// - [`Error::FixedPointNotReached`] if the bound is exceeded
    /// - [`Error::Invariant`] if a mutation violates a graph invariant
    pub fn run(&self, cfg: &mut ControlFlowGraph, events: &EventLog) -> Result<ReductionStats> {
        let bound = self
            .max_iterations
            .unwrap_or(cfg.operator_count() + cfg.variable_count() + 1);
        let dce = DeadCodeElimination::new();
        let mut stats = ReductionStats::default();

        loop {
            stats.iterations += 1;
            if stats.iterations > bound {
                return Err(Error::FixedPointNotReached {
                    method: cfg.method(),
                    iterations: bound,
                });
            }

            let plan = {
                let snapshot =
                    cfg.acquire(CacheKind::USE_DEF_CHAINS | CacheKind::VARIABLE_PROPERTIES)?;
                Planner::new(&snapshot)?.plan()
            };

            let mut applied = 0;
            for rewrite in plan {
                if Self::apply(cfg, rewrite, events, &mut stats)? {
                    applied += 1;
                }
            }
            if applied == 0 {
                break;
            }
            stats.rewrites += applied;

            let removed = dce.run(cfg, events)?;
            stats.operators_removed += removed.operators_removed;
            stats.blocks_removed += removed.blocks_removed;
            stats.calls_removed += removed.calls_removed;
        }

        Ok(stats)
    }

    fn apply(
        cfg: &mut ControlFlowGraph,
        rewrite: Rewrite,
        events: &EventLog,
        stats: &mut ReductionStats,
    ) -> Result<bool> {
        let message = match rewrite.action {
            Action::Propagate {
                def,
                use_op,
                temp,
                with,
            } => {
                if !cfg.substitute_usage(use_op, temp, with)? {
                    return Ok(false);
                }
                let old = cfg.remove_operator(def)?;
                stats.operators_removed += 1;
                format!("{old}; {temp} -> {with}")
            }
            Action::Fuse {
                def,
                use_op,
                replacement,
            } => {
                if cfg.operator(use_op).is_some_and(|o| o.kind == replacement) {
                    return Ok(false);
                }
                let message = replacement.to_string();
                cfg.replace_operator(use_op, replacement)?;
                cfg.remove_operator(def)?;
                stats.operators_removed += 1;
                message
            }
            Action::Retarget {
                terminator,
                replacement,
            } => {
                if cfg.operator(terminator).is_some_and(|o| o.kind == replacement) {
                    return Ok(false);
                }
                let message = replacement.to_string();
                let old = cfg.replace_operator(terminator, replacement)?;
                format!("{old} => {message}")
            }
        };

        events
            .record(rewrite.kind)
            .at(cfg.method(), rewrite.position)
            .message(message);
        Ok(true)
    }
}

/// Plans one batch of rewrites against a single analysis snapshot.
struct Planner<'a> {
    cfg: &'a ControlFlowGraph,
    tree: &'a SpanningTree,
    chains: &'a UseDefChains,
    properties: &'a PropertiesOfVariables,
    touched: HashSet<OperatorId>,
    plan: Vec<Rewrite>,
}

impl<'a> Planner<'a> {
    fn new(snapshot: &AnalysisSnapshot<'a>) -> Result<Self> {
        Ok(Planner {
            cfg: snapshot.cfg(),
            tree: snapshot.tree()?,
            chains: snapshot.chains()?,
            properties: snapshot.properties()?,
            touched: HashSet::new(),
            plan: Vec::new(),
        })
    }

    fn plan(mut self) -> Vec<Rewrite> {
        let tree = self.tree;
        let (variables, blocks) = (tree.variables(), tree.blocks());

        for &var in variables {
            if let Some((claims, rewrite)) = self.fold_single_use(var) {
                self.push(&claims, rewrite);
            }
        }
        for &block in blocks {
            if let Some((claims, rewrite)) = self.reduce_branch(block) {
                self.push(&claims, rewrite);
            }
        }
        for &var in variables {
            for (terminator, rewrite) in self.replicate_branch(var) {
                self.push(&[terminator], rewrite);
            }
        }

        self.plan
    }

    /// Queues `rewrite` unless one of its operators is already claimed.
    fn push(&mut self, claims: &[OperatorId], rewrite: Rewrite) {
        if claims.iter().any(|op| self.touched.contains(op)) {
            return;
        }
        self.touched.extend(claims.iter().copied());
        self.plan.push(rewrite);
    }

    fn fold_single_use(&self, temp: VarId) -> Option<(Vec<OperatorId>, Rewrite)> {
        let variable = self.cfg.variable(temp)?;
        if !variable.is_temporary() || self.properties.is_address_taken(temp) {
            return None;
        }

        let def = self.chains.single_def(temp)?;
        let use_op = self.chains.single_use(temp)?;
        let (definition, user) = (self.cfg.operator(def)?, self.cfg.operator(use_op)?);
        if def == use_op || definition.block != user.block {
            return None;
        }
        let (d, u) = (self.tree.operator_index(def)?, self.tree.operator_index(use_op)?);
        if d >= u {
            return None;
        }
        let range = self.tree.operators_between(d, u);

        let (kind, action) = match (&definition.kind, &user.kind) {
            (OperatorKind::Assign { src, .. }, user) => {
                let with = self.copy_source(temp, variable.ty(), *src, user, range)?;
                (
                    EventKind::CopyPropagated,
                    Action::Propagate {
                        def,
                        use_op,
                        temp,
                        with,
                    },
                )
            }
            (
                OperatorKind::ZeroExtend {
                    src: Expression::Var(narrow),
                    bits,
                    ..
                },
                OperatorKind::Branch { cond, .. },
            ) if cond.is_var(temp) => {
                let ty = self.cfg.variable(*narrow)?.ty();
                let lossless = ty == IrType::Bool
                    || (ty.is_integer() && ty.bit_width().is_some_and(|w| w <= *bits));
                if !lossless || *narrow == temp || !self.is_stable(*narrow, range) {
                    return None;
                }
                (
                    EventKind::ZeroExtendFolded,
                    Action::Propagate {
                        def,
                        use_op,
                        temp,
                        with: Expression::Var(*narrow),
                    },
                )
            }
            (
                OperatorKind::CompareAndSet {
                    cond: inner,
                    signed,
                    left: a,
                    right: b,
                    ..
                },
                OperatorKind::CompareAndSet {
                    dest,
                    cond: outer,
                    left,
                    right,
                    ..
                },
            ) => {
                let outer = if left.is_var(temp) && is_zero(right) {
                    *outer
                } else if right.is_var(temp) && is_zero(left) {
                    outer.swapped()
                } else {
                    return None;
                };
                let cond = match outer {
                    Condition::Ne => *inner,
                    // NaN compares false both ways
                    Condition::Eq if !self.is_float(a) && !self.is_float(b) => inner.inverted(),
                    _ => return None,
                };
                for operand in [a, b] {
                    if let Some(v) = operand.as_var() {
                        if v == temp || !self.is_stable(v, range) {
                            return None;
                        }
                    }
                }
                (
                    EventKind::ComparisonInverted,
                    Action::Fuse {
                        def,
                        use_op,
                        replacement: OperatorKind::CompareAndSet {
                            dest: *dest,
                            cond,
                            signed: *signed,
                            left: *a,
                            right: *b,
                        },
                    },
                )
            }
            _ => return None,
        };

        Some((
            vec![def, use_op],
            Rewrite {
                kind,
                position: u,
                action,
            },
        ))
    }

    /// Returns the expression a copy's use may read instead of `temp`.
    fn copy_source(
        &self,
        temp: VarId,
        ty: IrType,
        src: Expression,
        user: &OperatorKind,
        range: &[OperatorId],
    ) -> Option<Expression> {
        if !user.can_propagate_copy(temp) {
            return None;
        }
        match src {
            Expression::Var(v) if v == temp => None,
            Expression::Var(v) => {
                let source = self.cfg.variable(v)?;
                (ty.can_be_assigned_from(source.ty()) && self.is_stable(v, range)).then_some(src)
            }
            Expression::Const(c) => ty.accepts_constant(&c).then_some(src),
        }
    }

    fn reduce_branch(&self, block: BlockId) -> Option<(Vec<OperatorId>, Rewrite)> {
        let terminator = self.cfg.terminator(block)?;
        let OperatorKind::Branch {
            cond: Expression::Var(t),
            taken,
            not_taken,
        } = self.cfg.operator(terminator)?.kind
        else {
            return None;
        };

        let previous = self.cfg.previous_operator(terminator)?;
        let replacement = match &self.cfg.operator(previous)?.kind {
            OperatorKind::Assign { dest, src } if *dest == t && !src.is_var(t) => {
                OperatorKind::Branch {
                    cond: *src,
                    taken,
                    not_taken,
                }
            }
            OperatorKind::CompareAndSet {
                dest,
                cond,
                signed,
                left,
                right,
            } if *dest == t && !left.is_var(t) && !right.is_var(t) => OperatorKind::CompareBranch {
                cond: *cond,
                signed: *signed,
                left: *left,
                right: *right,
                taken,
                not_taken,
            },
            _ => return None,
        };

        Some((
            vec![previous, terminator],
            Rewrite {
                kind: EventKind::BranchStrengthReduced,
                position: self.tree.operator_index(terminator)?,
                action: Action::Retarget {
                    terminator,
                    replacement,
                },
            },
        ))
    }

    fn replicate_branch(&self, var: VarId) -> Vec<(OperatorId, Rewrite)> {
        if self.properties.is_address_taken(var) {
            return Vec::new();
        }
        let Some(branch) = self.chains.single_use(var) else {
            return Vec::new();
        };
        let Some(operator) = self.cfg.operator(branch) else {
            return Vec::new();
        };
        let OperatorKind::Branch {
            cond,
            taken,
            not_taken,
        } = operator.kind
        else {
            return Vec::new();
        };
        let target = operator.block;
        if !cond.is_var(var) || !self.only_nops_before(target, branch) {
            return Vec::new();
        }
        if self
            .cfg
            .block(target)
            .map_or(true, |block| block.kind().is_special())
        {
            return Vec::new();
        }

        self.chains
            .defs_of(var)
            .iter()
            .filter_map(|&def| {
                let definition = self.cfg.operator(def)?;
                let block = definition.block;
                if block == target || self.cfg.block(block)?.kind().is_special() {
                    return None;
                }
                if !self.reaches_unchanged(def, target) {
                    return None;
                }
                let terminator = self.cfg.terminator(block)?;

                let (kind, replacement) = match &definition.kind {
                    OperatorKind::Assign {
                        src: Expression::Const(c),
                        ..
                    } if c.is_integer() => {
                        let value = c.as_i64()?;
                        let resolved = if value != 0 { taken } else { not_taken };
                        (
                            EventKind::ConstantBranchPropagated,
                            OperatorKind::Jump { target: resolved },
                        )
                    }
                    _ => (
                        EventKind::BranchReplicated,
                        OperatorKind::Branch {
                            cond: Expression::Var(var),
                            taken,
                            not_taken,
                        },
                    ),
                };

                Some((
                    terminator,
                    Rewrite {
                        kind,
                        position: self.tree.operator_index(terminator)?,
                        action: Action::Retarget {
                            terminator,
                            replacement,
                        },
                    },
                ))
            })
            .collect()
    }

    /// Checks that `def` reaches the head of `target` through no-ops and jumps only.
    fn reaches_unchanged(&self, def: OperatorId, target: BlockId) -> bool {
        let follow = || -> Option<()> {
            let block = self.cfg.block(self.cfg.operator(def)?.block)?;
            let pos = self.cfg.position(def)?;
            let mut next = nops_then_jump(self.cfg, &block.operators()[pos + 1..])?;

            let mut visited = HashSet::new();
            while next != target {
                if !visited.insert(next) {
                    return None;
                }
                next = nops_then_jump(self.cfg, self.cfg.block(next)?.operators())?;
            }
            Some(())
        };
        follow().is_some()
    }

    fn only_nops_before(&self, block: BlockId, branch: OperatorId) -> bool {
        self.cfg.block(block).is_some_and(|b| {
            b.last_operator() == Some(branch)
                && b.operators()
                    .iter()
                    .take_while(|&&op| op != branch)
                    .all(|&op| is_nop(self.cfg, op))
        })
    }

    /// `var` keeps its value across `range`.
    fn is_stable(&self, var: VarId, range: &[OperatorId]) -> bool {
        let address_taken = self.properties.is_address_taken(var);
        range.iter().filter_map(|&op| self.cfg.operator(op)).all(|op| {
            op.kind.result() != Some(var)
                && !(address_taken && op.kind.may_write_through_pointers())
        })
    }

    fn is_float(&self, expr: &Expression) -> bool {
        match expr {
            Expression::Var(v) => self.cfg.variable(*v).is_some_and(|var| var.ty().is_float()),
            Expression::Const(c) => c.is_float(),
        }
    }
}

/// Target of `ops` if it is a run of no-ops closed by a jump.
fn nops_then_jump(cfg: &ControlFlowGraph, ops: &[OperatorId]) -> Option<BlockId> {
    let (&last, body) = ops.split_last()?;
    if !body.iter().all(|&op| is_nop(cfg, op)) {
        return None;
    }
    match cfg.operator(last)?.kind {
        OperatorKind::Jump { target } => Some(target),
        _ => None,
    }
}

fn is_nop(cfg: &ControlFlowGraph, op: OperatorId) -> bool {
    cfg.operator(op)
        .is_some_and(|o| matches!(o.kind, OperatorKind::Nop))
}

fn is_zero(expr: &Expression) -> bool {
    expr.as_const().is_some_and(|c| c.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        BinaryOp, BlockKind, CfgBuilder, ConstValue, GlobalId, Interpreter, MethodId, Value,
    };

    fn returns(cfg: &ControlFlowGraph, args: &[Value]) -> Option<Value> {
        Interpreter::new().run(cfg, args).unwrap().result
    }

    fn entry_kinds(cfg: &ControlFlowGraph) -> Vec<OperatorKind> {
        cfg.block(BlockId::new(0))
            .unwrap()
            .operators()
            .iter()
            .map(|&op| cfg.operator(op).unwrap().kind.clone())
            .collect()
    }

    #[test]
    fn test_copy_propagation() {
        let mut cfg = CfgBuilder::new(MethodId::new(0), "copy")
            .arg("x", IrType::I32)
            .returns(IrType::I32)
            .build_with(|f| {
                let x = f.arg(0);
                f.block(0, |b| {
                    let t = b.copy(x);
                    let y = b.add(t, Expression::int(1));
                    b.ret_val(y);
                });
            })
            .unwrap();
        let x = cfg.arguments()[0];

        let events = EventLog::new();
        let stats = TemporaryReduction::new().run(&mut cfg, &events).unwrap();

        assert_eq!(stats.rewrites, 1);
        assert_eq!(events.count(EventKind::CopyPropagated), 1);
        let kinds = entry_kinds(&cfg);
        assert_eq!(kinds.len(), 2);
        assert!(matches!(
            kinds[0],
            OperatorKind::Binary { op: BinaryOp::Add, left, .. } if left.is_var(x)
        ));
        assert_eq!(returns(&cfg, &[Value::Int(41)]), Some(Value::Int(42)));
    }

    #[test]
    fn test_branch_strength_reduction() {
        let mut cfg = CfgBuilder::new(MethodId::new(0), "fuse")
            .arg("a", IrType::I32)
            .arg("b", IrType::I32)
            .returns(IrType::I32)
            .build_with(|f| {
                let (a, b) = (f.arg(0), f.arg(1));
                f.block(0, |bb| {
                    let t = bb.compare(Condition::Lt, a, b);
                    bb.branch(t, 1, 2);
                });
                f.block(1, |bb| bb.ret_val(Expression::int(1)));
                f.block(2, |bb| bb.ret_val(Expression::int(0)));
            })
            .unwrap();
        let (a, b) = (cfg.arguments()[0], cfg.arguments()[1]);

        let events = EventLog::new();
        TemporaryReduction::new().run(&mut cfg, &events).unwrap();

        assert_eq!(
            entry_kinds(&cfg),
            vec![OperatorKind::CompareBranch {
                cond: Condition::Lt,
                signed: true,
                left: Expression::Var(a),
                right: Expression::Var(b),
                taken: BlockId::new(1),
                not_taken: BlockId::new(2),
            }]
        );
        assert_eq!(events.count(EventKind::BranchStrengthReduced), 1);
        assert_eq!(events.count(EventKind::InstructionRemoved), 1);
        assert_eq!(
            returns(&cfg, &[Value::Int(1), Value::Int(2)]),
            Some(Value::Int(1))
        );
    }

    #[test]
    fn test_cross_block_constant_propagation() {
        let build = || {
            CfgBuilder::new(MethodId::new(0), "cross")
                .arg("x", IrType::I32)
                .returns(IrType::I32)
                .build_with(|f| {
                    let x = f.arg(0);
                    let v = f.local("v", IrType::I32);
                    f.block(0, |b| b.branch(x, 1, 2));
                    f.block(1, |b| {
                        b.assign_to(v, Expression::int(0));
                        b.nop();
                        b.jump(3);
                    });
                    f.block(2, |b| {
                        b.assign_to(v, x);
                        b.jump(3);
                    });
                    f.block(3, |b| {
                        b.nop();
                        b.branch(v, 4, 5);
                    });
                    f.block(4, |b| b.ret_val(Expression::int(1)));
                    f.block(5, |b| b.ret_val(Expression::int(0)));
                })
                .unwrap()
        };
        let original = build();
        let mut cfg = build();
        let x = cfg.arguments()[0];

        let events = EventLog::new();
        let stats = TemporaryReduction::new().run(&mut cfg, &events).unwrap();

        let b1 = cfg.terminator(BlockId::new(1)).unwrap();
        assert_eq!(
            cfg.operator(b1).unwrap().kind,
            OperatorKind::Jump {
                target: BlockId::new(5)
            }
        );
        let b2 = cfg.terminator(BlockId::new(2)).unwrap();
        assert_eq!(
            cfg.operator(b2).unwrap().kind,
            OperatorKind::Branch {
                cond: Expression::Var(x),
                taken: BlockId::new(4),
                not_taken: BlockId::new(5),
            }
        );
        assert!(cfg.block(BlockId::new(3)).is_none());
        assert_eq!(stats.blocks_removed, 1);
        assert_eq!(events.count(EventKind::ConstantBranchPropagated), 1);
        assert_eq!(events.count(EventKind::BranchReplicated), 1);
        cfg.validate().unwrap();

        for arg in [0, 1, 5] {
            assert_eq!(
                returns(&cfg, &[Value::Int(arg)]),
                returns(&original, &[Value::Int(arg)])
            );
        }
    }

    /// `B0: if x; B1: v = 0; jump B3; B2: v = x; jump B3; B3: if v`, with the
    /// kinds of B1 and B3 and an optional global store ahead of B1's jump.
    fn merge_on_branch(
        zero_kind: BlockKind,
        merge_kind: BlockKind,
        store: bool,
    ) -> ControlFlowGraph {
        CfgBuilder::new(MethodId::new(0), "merge")
            .arg("x", IrType::I32)
            .returns(IrType::I32)
            .build_with(|f| {
                let x = f.arg(0);
                let v = f.local("v", IrType::I32);
                f.block(0, |b| b.branch(x, 1, 2));
                f.block_of_kind(1, zero_kind, |b| {
                    b.assign_to(v, Expression::int(0));
                    if store {
                        b.store_global(GlobalId::new(0), Expression::int(1));
                    }
                    b.jump(3);
                });
                f.block(2, |b| {
                    b.assign_to(v, x);
                    b.jump(3);
                });
                f.block_of_kind(3, merge_kind, |b| b.branch(v, 4, 5));
                f.block(4, |b| b.ret_val(Expression::int(1)));
                f.block(5, |b| b.ret_val(Expression::int(0)));
            })
            .unwrap()
    }

    fn jumps_to_merge(cfg: &ControlFlowGraph, block: usize) -> bool {
        let terminator = cfg.terminator(BlockId::new(block)).unwrap();
        cfg.operator(terminator).unwrap().kind
            == OperatorKind::Jump {
                target: BlockId::new(3),
            }
    }

    #[test]
    fn test_compare_not_adjacent_to_branch_stays() {
        let mut cfg = CfgBuilder::new(MethodId::new(0), "apart")
            .arg("a", IrType::I32)
            .arg("b", IrType::I32)
            .returns(IrType::I32)
            .build_with(|f| {
                let (a, b) = (f.arg(0), f.arg(1));
                f.block(0, |bb| {
                    let t = bb.compare(Condition::Lt, a, b);
                    bb.store_global(GlobalId::new(0), Expression::int(1));
                    bb.branch(t, 1, 2);
                });
                f.block(1, |bb| bb.ret_val(Expression::int(1)));
                f.block(2, |bb| bb.ret_val(Expression::int(0)));
            })
            .unwrap();

        let events = EventLog::new();
        let stats = TemporaryReduction::new().run(&mut cfg, &events).unwrap();

        assert_eq!(stats.rewrites, 0);
        assert_eq!(events.count(EventKind::BranchStrengthReduced), 0);
        let kinds = entry_kinds(&cfg);
        assert_eq!(kinds.len(), 3);
        assert!(matches!(kinds[0], OperatorKind::CompareAndSet { .. }));
        assert!(matches!(
            kinds[2],
            OperatorKind::Branch { cond: Expression::Var(_), .. }
        ));
    }

    #[test]
    fn test_side_effect_before_jump_blocks_propagation() {
        let original = merge_on_branch(BlockKind::Normal, BlockKind::Normal, true);
        let mut cfg = original.clone();

        let events = EventLog::new();
        TemporaryReduction::new().run(&mut cfg, &events).unwrap();

        assert!(jumps_to_merge(&cfg, 1));
        assert!(cfg.block(BlockId::new(3)).is_some());
        assert_eq!(events.count(EventKind::ConstantBranchPropagated), 0);
        // the clean arm still gets its replica
        assert_eq!(events.count(EventKind::BranchReplicated), 1);
        cfg.validate().unwrap();
        for arg in [0, 7] {
            assert_eq!(
                returns(&cfg, &[Value::Int(arg)]),
                returns(&original, &[Value::Int(arg)])
            );
        }
    }

    #[test]
    fn test_definition_in_special_block_is_not_propagated() {
        let mut cfg = merge_on_branch(BlockKind::Handler, BlockKind::Normal, false);

        let events = EventLog::new();
        TemporaryReduction::new().run(&mut cfg, &events).unwrap();

        assert!(jumps_to_merge(&cfg, 1));
        assert_eq!(events.count(EventKind::ConstantBranchPropagated), 0);
        assert_eq!(events.count(EventKind::BranchReplicated), 1);
    }

    #[test]
    fn test_branch_in_special_block_is_not_replicated() {
        let mut cfg = merge_on_branch(BlockKind::Normal, BlockKind::Handler, false);

        let events = EventLog::new();
        TemporaryReduction::new().run(&mut cfg, &events).unwrap();

        assert!(jumps_to_merge(&cfg, 1));
        assert!(jumps_to_merge(&cfg, 2));
        assert!(cfg.block(BlockId::new(3)).is_some());
        assert_eq!(events.count(EventKind::ConstantBranchPropagated), 0);
        assert_eq!(events.count(EventKind::BranchReplicated), 0);
    }

    #[test]
    fn test_comparison_inversion() {
        let mut cfg = CfgBuilder::new(MethodId::new(0), "invert")
            .arg("a", IrType::I32)
            .arg("b", IrType::I32)
            .returns(IrType::Bool)
            .build_with(|f| {
                let (a, b) = (f.arg(0), f.arg(1));
                f.block(0, |bb| {
                    let t = bb.compare(Condition::Lt, a, b);
                    let u = bb.compare(Condition::Eq, t, Expression::int(0));
                    bb.ret_val(u);
                });
            })
            .unwrap();

        let events = EventLog::new();
        TemporaryReduction::new().run(&mut cfg, &events).unwrap();

        assert_eq!(events.count(EventKind::ComparisonInverted), 1);
        let kinds = entry_kinds(&cfg);
        assert_eq!(kinds.len(), 2);
        assert!(matches!(
            kinds[0],
            OperatorKind::CompareAndSet {
                cond: Condition::Ge,
                ..
            }
        ));
        assert_eq!(
            returns(&cfg, &[Value::Int(3), Value::Int(3)]),
            Some(Value::Int(1))
        );
        assert_eq!(
            returns(&cfg, &[Value::Int(2), Value::Int(3)]),
            Some(Value::Int(0))
        );
    }

    #[test]
    fn test_zero_extend_feeds_fused_branch() {
        let mut cfg = CfgBuilder::new(MethodId::new(0), "zext")
            .arg("a", IrType::I32)
            .returns(IrType::I32)
            .build_with(|f| {
                let a = f.arg(0);
                f.block(0, |b| {
                    let c = b.compare(Condition::Gt, a, Expression::int(0));
                    let z = b.zero_extend(c, 32);
                    b.branch(z, 1, 2);
                });
                f.block(1, |b| b.ret_val(Expression::int(1)));
                f.block(2, |b| b.ret_val(Expression::int(0)));
            })
            .unwrap();

        let events = EventLog::new();
        TemporaryReduction::new().run(&mut cfg, &events).unwrap();

        assert_eq!(events.count(EventKind::ZeroExtendFolded), 1);
        assert_eq!(events.count(EventKind::BranchStrengthReduced), 1);
        let kinds = entry_kinds(&cfg);
        assert_eq!(kinds.len(), 1);
        assert!(matches!(kinds[0], OperatorKind::CompareBranch { .. }));
    }

    #[test]
    fn test_copy_declines_when_source_changes() {
        // v is redefined between the copy and its use
        let mut redefined = CfgBuilder::new(MethodId::new(0), "redefined")
            .arg("x", IrType::I32)
            .returns(IrType::I32)
            .build_with(|f| {
                let x = f.arg(0);
                let v = f.local("v", IrType::I32);
                f.block(0, |b| {
                    b.assign_to(v, x);
                    let t = b.copy(v);
                    b.assign_to(v, Expression::int(7));
                    let y = b.add(t, v);
                    b.ret_val(y);
                });
            })
            .unwrap();

        // s is written through a pointer between the copy and its use
        let mut aliased = CfgBuilder::new(MethodId::new(1), "aliased")
            .arg("x", IrType::I32)
            .returns(IrType::I32)
            .build_with(|f| {
                let x = f.arg(0);
                let s = f.local("s", IrType::I32);
                f.block(0, |b| {
                    b.assign_to(s, x);
                    let p = b.address_of(s);
                    let t = b.copy(s);
                    b.store(p, Expression::int(9));
                    let y = b.add(t, Expression::int(1));
                    b.ret_val(y);
                });
            })
            .unwrap();

        for cfg in [&mut redefined, &mut aliased] {
            let before = cfg.operator_count();
            let events = EventLog::new();
            let stats = TemporaryReduction::new().run(cfg, &events).unwrap();
            assert_eq!(events.count(EventKind::CopyPropagated), 0);
            assert_eq!(stats.rewrites, 0);
            assert_eq!(cfg.operator_count(), before);
        }
        assert_eq!(returns(&redefined, &[Value::Int(1)]), Some(Value::Int(8)));
        assert_eq!(returns(&aliased, &[Value::Int(1)]), Some(Value::Int(2)));
    }

    #[test]
    fn test_literal_copy_folds() {
        let mut cfg = CfgBuilder::new(MethodId::new(0), "literal")
            .returns(IrType::I32)
            .build_with(|f| {
                f.block(0, |b| {
                    let t = b.const_i32(5);
                    b.ret_val(t);
                });
            })
            .unwrap();

        TemporaryReduction::new()
            .run(&mut cfg, &EventLog::new())
            .unwrap();
        assert_eq!(
            entry_kinds(&cfg),
            vec![OperatorKind::Return {
                value: Some(Expression::Const(ConstValue::Int(5)))
            }]
        );
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let mut cfg = CfgBuilder::new(MethodId::new(0), "twice")
            .arg("a", IrType::I32)
            .returns(IrType::I32)
            .build_with(|f| {
                let a = f.arg(0);
                f.block(0, |b| {
                    let t = b.copy(a);
                    let c = b.compare(Condition::Ne, t, Expression::int(3));
                    b.branch(c, 1, 2);
                });
                f.block(1, |b| b.ret_val(a));
                f.block(2, |b| b.ret_val(Expression::int(0)));
            })
            .unwrap();

        let pass = TemporaryReduction::new();
        assert!(pass.run(&mut cfg, &EventLog::new()).unwrap().changed());
        let generation = cfg.generation();

        let events = EventLog::new();
        let stats = pass.run(&mut cfg, &events).unwrap();
        assert_eq!(stats.iterations, 1);
        assert!(!stats.changed());
        assert!(events.is_empty());
        assert_eq!(cfg.generation(), generation);
    }

    #[test]
    fn test_iteration_bound() {
        let mut cfg = CfgBuilder::new(MethodId::new(4), "bounded")
            .arg("x", IrType::I32)
            .returns(IrType::I32)
            .build_with(|f| {
                let x = f.arg(0);
                f.block(0, |b| {
                    let t = b.copy(x);
                    let u = b.copy(t);
                    b.ret_val(u);
                });
            })
            .unwrap();

        let err = TemporaryReduction::new()
            .with_max_iterations(1)
            .run(&mut cfg, &EventLog::new())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::FixedPointNotReached { method, .. } if method == MethodId::new(4)
        ));
    }
}
