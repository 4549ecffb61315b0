//! Driver for the temporary reduction rewriter.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info};

use crate::{
    compiler::{
        passes::TemporaryReduction, CompilerContext, Phase, PhaseMovement, PhaseTransition,
        LAYOUT_TYPES,
    },
    Result,
};

/// Runs [`TemporaryReduction`] on every method.
///
/// Removing a call can turn callers thread-safe or allocation-free, so when a
/// run deleted calls and the configuration asks for it, the phase sends
/// control back to `LayoutTypes` to recompute layout and annotations. It does
/// so once per round: a backward move requested by anyone else starts a new
/// round.
#[derive(Debug, Default)]
pub struct ReduceNumberOfTemporaries {
    rewound: bool,
}

impl ReduceNumberOfTemporaries {
    /// Creates the phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Phase for ReduceNumberOfTemporaries {
    fn name(&self) -> &'static str {
        "ReduceNumberOfTemporaries"
    }

    fn description(&self) -> &'static str {
        "Propagates copies, fuses compares into branches and removes dead code"
    }

    fn run(&mut self, ctx: &CompilerContext) -> Result<PhaseTransition> {
        let pass = match ctx.config.max_rewrite_iterations {
            Some(limit) => TemporaryReduction::new().with_max_iterations(limit),
            None => TemporaryReduction::new(),
        };

        let rewrites = AtomicUsize::new(0);
        let calls_removed = AtomicUsize::new(0);
        let events = &ctx.events;
        ctx.for_each_method(|method, cfg| {
            let stats = pass.run(cfg, events)?;
            rewrites.fetch_add(stats.rewrites, Ordering::Relaxed);
            calls_removed.fetch_add(stats.calls_removed, Ordering::Relaxed);
            if stats.changed() {
                debug!(
                    %method,
                    iterations = stats.iterations,
                    rewrites = stats.rewrites,
                    operators_removed = stats.operators_removed,
                    blocks_removed = stats.blocks_removed,
                    "temporaries reduced"
                );
            }
            Ok(stats.changed())
        })?;

        let rewrites = rewrites.into_inner();
        let calls_removed = calls_removed.into_inner();
        info!(rewrites, calls_removed, "temporary reduction finished");

        if calls_removed > 0 && ctx.config.reanalyze_after_call_elimination && !self.rewound {
            self.rewound = true;
            return Ok(PhaseTransition::Goto(LAYOUT_TYPES.to_string()));
        }
        Ok(PhaseTransition::Next)
    }

    fn validate_phase_movement(
        &mut self,
        _ctx: &CompilerContext,
        movement: PhaseMovement,
    ) -> Result<()> {
        // our own Goto must not re-arm the rewind
        if movement.is_backward_past_own() && movement.from != movement.own {
            self.rewound = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::EventKind,
        config::PipelineConfig,
        ir::{CfgBuilder, Expression, IrType, MethodId},
        typesystem::TypeSystem,
    };

    /// The call sits behind a branch on a constant and dies with its block.
    fn dead_call() -> crate::ir::ControlFlowGraph {
        CfgBuilder::new(MethodId::new(0), "dead_call")
            .build_with(|f| {
                let x = f.local("x", IrType::I32);
                f.block(0, |b| {
                    b.assign_to(x, Expression::int(0));
                    b.branch(x, 2, 1);
                });
                f.block(1, |b| b.ret());
                f.block(2, |b| {
                    b.call_void(MethodId::new(1), &[]);
                    b.ret();
                });
            })
            .unwrap()
    }

    #[test]
    fn test_call_elimination_rewinds_once() {
        let config = PipelineConfig::default().with_parallel(false);
        let ctx = CompilerContext::with_config(TypeSystem::default(), config);
        ctx.add_method(dead_call()).unwrap();

        let mut phase = ReduceNumberOfTemporaries::new();
        assert_eq!(
            phase.run(&ctx).unwrap(),
            PhaseTransition::Goto(LAYOUT_TYPES.to_string())
        );
        assert!(ctx.events.count(EventKind::BlockRemoved) >= 1);

        // nothing left to remove; and the rewind is only offered once
        ctx.add_method(dead_call()).unwrap();
        assert_eq!(phase.run(&ctx).unwrap(), PhaseTransition::Next);
    }

    #[test]
    fn test_outside_rewind_rearms_call_elimination() {
        let config = PipelineConfig::default().with_parallel(false);
        let ctx = CompilerContext::with_config(TypeSystem::default(), config);
        let mut phase = ReduceNumberOfTemporaries::new();
        let goto = PhaseTransition::Goto(LAYOUT_TYPES.to_string());

        ctx.add_method(dead_call()).unwrap();
        assert_eq!(phase.run(&ctx).unwrap(), goto);

        // the move caused by the phase itself keeps the rewind spent
        phase
            .validate_phase_movement(&ctx, PhaseMovement { from: 3, to: 1, own: 3 })
            .unwrap();
        ctx.add_method(dead_call()).unwrap();
        assert_eq!(phase.run(&ctx).unwrap(), PhaseTransition::Next);

        // forward moves and moves that stay behind the phase change nothing
        phase
            .validate_phase_movement(&ctx, PhaseMovement { from: 3, to: 4, own: 3 })
            .unwrap();
        phase
            .validate_phase_movement(&ctx, PhaseMovement { from: 6, to: 5, own: 3 })
            .unwrap();
        ctx.add_method(dead_call()).unwrap();
        assert_eq!(phase.run(&ctx).unwrap(), PhaseTransition::Next);

        // a rewind from the end of the schedule starts a new round
        phase
            .validate_phase_movement(&ctx, PhaseMovement { from: 6, to: 0, own: 3 })
            .unwrap();
        ctx.add_method(dead_call()).unwrap();
        assert_eq!(phase.run(&ctx).unwrap(), goto);
    }

    #[test]
    fn test_no_rewind_when_disabled() {
        let config = PipelineConfig::fast();
        let ctx = CompilerContext::with_config(TypeSystem::default(), config);
        ctx.add_method(dead_call()).unwrap();

        let mut phase = ReduceNumberOfTemporaries::new();
        assert_eq!(phase.run(&ctx).unwrap(), PhaseTransition::Next);
        let remaining_calls = ctx
            .with_method(MethodId::new(0), |cfg| {
                cfg.operators()
                    .filter(|(_, op)| matches!(op.kind, crate::ir::OperatorKind::Call { .. }))
                    .count()
            })
            .unwrap();
        assert_eq!(remaining_calls, 0);
    }
}
