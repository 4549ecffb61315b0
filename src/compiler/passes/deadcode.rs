//! Dead code elimination.
//!
//! Runs to completion in three steps:
//!
//! 1. Branches whose outcome is a compile-time constant become jumps
//! 2. Blocks no longer reachable from the entry are deleted
//! 3. Side-effect-free operators whose result is dead are deleted, repeated
//!    until liveness stops shrinking
//!
//! # Example
//!
//! Before:
//! ```text
//! B0: v1 = v0 < 10
//!     if 1 != 0 goto B1 else B2
//! B1: return v0
//! B2: return 0
//! ```
//!
//! After:
//! ```text
//! B0: goto B1
//! B1: return v0
//! ```
//!
//! Address-taken variables are treated as live everywhere, so writes to them
//! are never removed. No-ops are kept; they are stripped separately before
//! register allocation.

use crate::{
    analysis::CacheKind,
    compiler::{EventKind, EventLog},
    ir::{BlockId, Condition, ControlFlowGraph, Expression, OperatorId, OperatorKind},
    Result,
};

/// What one elimination run removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeadCodeStats {
    /// Conditional branches turned into jumps
    pub branches_folded: usize,
    /// Unreachable blocks deleted
    pub blocks_removed: usize,
    /// Dead operators deleted, operators of deleted blocks excluded
    pub operators_removed: usize,
    /// Call operators that disappeared with their blocks
    pub calls_removed: usize,
}

impl DeadCodeStats {
    /// Returns `true` if anything was removed or folded.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.branches_folded + self.blocks_removed + self.operators_removed > 0
    }
}

/// Dead code elimination over one method.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadCodeElimination;

impl DeadCodeElimination {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Eliminates dead code in `cfg` until nothing more can be removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a mutation violates a graph invariant.
    pub fn run(&self, cfg: &mut ControlFlowGraph, events: &EventLog) -> Result<DeadCodeStats> {
        let mut stats = DeadCodeStats {
            branches_folded: Self::fold_constant_branches(cfg, events)?,
            ..DeadCodeStats::default()
        };

        let (blocks, calls) = Self::remove_unreachable_blocks(cfg, events)?;
        stats.blocks_removed = blocks;
        stats.calls_removed = calls;

        loop {
            let removed = Self::remove_dead_operators(cfg, events)?;
            if removed == 0 {
                break;
            }
            stats.operators_removed += removed;
        }

        Ok(stats)
    }

    /// Statically known target of a control operator, if any.
    fn constant_target(kind: &OperatorKind) -> Option<BlockId> {
        match kind {
            OperatorKind::Branch {
                taken, not_taken, ..
            } if taken == not_taken => Some(*taken),
            OperatorKind::Branch {
                cond: Expression::Const(c),
                taken,
                not_taken,
            } => {
                let value = c.as_i64()?;
                Some(if value != 0 { *taken } else { *not_taken })
            }
            OperatorKind::CompareBranch {
                taken, not_taken, ..
            } if taken == not_taken => Some(*taken),
            OperatorKind::CompareBranch {
                cond,
                signed,
                left: Expression::Const(l),
                right: Expression::Const(r),
                taken,
                not_taken,
            } => {
                let holds = evaluate_condition(*cond, *signed, l.as_i64()?, r.as_i64()?);
                Some(if holds { *taken } else { *not_taken })
            }
            _ => None,
        }
    }

    fn fold_constant_branches(cfg: &mut ControlFlowGraph, events: &EventLog) -> Result<usize> {
        let folds: Vec<(OperatorId, BlockId)> = cfg
            .blocks()
            .filter_map(|b| cfg.terminator(b.id()))
            .filter_map(|t| {
                let target = Self::constant_target(&cfg.operator(t)?.kind)?;
                Some((t, target))
            })
            .collect();

        for &(term, target) in &folds {
            let old = cfg.replace_operator(term, OperatorKind::Jump { target })?;
            events
                .record(EventKind::BranchFolded)
                .method(cfg.method())
                .message(format!("{old} => goto {target}"));
        }
        Ok(folds.len())
    }

    fn remove_unreachable_blocks(
        cfg: &mut ControlFlowGraph,
        events: &EventLog,
    ) -> Result<(usize, usize)> {
        let reachable = cfg.reachable_blocks();
        let dead: Vec<BlockId> = cfg
            .blocks()
            .map(|b| b.id())
            .filter(|b| !reachable.contains(b.index()))
            .collect();

        let mut calls = 0;
        for &block in &dead {
            calls += cfg.block(block).map_or(0, |b| {
                b.operators()
                    .iter()
                    .filter_map(|&op| cfg.operator(op))
                    .filter(|op| matches!(op.kind, OperatorKind::Call { .. }))
                    .count()
            });
            cfg.remove_block(block)?;
            events
                .record(EventKind::BlockRemoved)
                .method(cfg.method())
                .message(format!("{block} unreachable"));
        }
        Ok((dead.len(), calls))
    }

    fn remove_dead_operators(cfg: &mut ControlFlowGraph, events: &EventLog) -> Result<usize> {
        let dead: Vec<(OperatorId, usize)> = {
            let snapshot = cfg.acquire(CacheKind::LIVENESS)?;
            let (tree, liveness) = (snapshot.tree()?, snapshot.liveness()?);
            let properties = snapshot.properties()?;
            let cfg = snapshot.cfg();

            let mut dead = Vec::new();
            for &block in tree.blocks() {
                let (Some(bb), Some(out)) = (cfg.block(block), liveness.live_out(block)) else {
                    continue;
                };
                let mut live = out.clone();

                for &op in bb.operators().iter().rev() {
                    let Some(operator) = cfg.operator(op) else {
                        continue;
                    };
                    let kind = &operator.kind;
                    match kind.result() {
                        // address-taken storage may be read through any pointer
                        Some(dest) if properties.is_address_taken(dest) => {}
                        Some(dest) if !kind.has_side_effects() && !live.contains(dest.index()) => {
                            dead.push((op, tree.operator_index(op).unwrap_or_default()));
                            continue;
                        }
                        Some(dest) => live.remove(dest.index()),
                        None => {}
                    }
                    for var in kind.used_variables() {
                        live.insert(var.index());
                    }
                }
            }
            dead
        };

        for &(op, position) in &dead {
            let kind = cfg.remove_operator(op)?;
            events
                .record(EventKind::InstructionRemoved)
                .at(cfg.method(), position)
                .message(kind.to_string());
        }
        Ok(dead.len())
    }
}

/// Returns `true` if `cond` holds for two integer constants.
#[allow(clippy::cast_sign_loss)]
fn evaluate_condition(cond: Condition, signed: bool, left: i64, right: i64) -> bool {
    if signed {
        cond.evaluate(left, right)
    } else {
        cond.evaluate(left as u64, right as u64)
    }
}
