//! Final cleanup before register allocation.

use crate::{
    compiler::{CompilerContext, EventKind, IrLevel, Phase, PhaseTransition},
    ir::{OperatorId, OperatorKind},
    Result,
};

/// Strips no-ops and marks the IR as [`IrLevel::Lowest`].
pub struct PrepareForRegisterAllocation;

impl Phase for PrepareForRegisterAllocation {
    fn name(&self) -> &'static str {
        "PrepareForRegisterAllocation"
    }

    fn description(&self) -> &'static str {
        "Removes no-ops left by earlier rewrites"
    }

    fn run(&mut self, ctx: &CompilerContext) -> Result<PhaseTransition> {
        let events = &ctx.events;
        ctx.for_each_method(|method, cfg| {
            let nops: Vec<OperatorId> = cfg
                .operators()
                .filter(|(_, op)| matches!(op.kind, OperatorKind::Nop))
                .map(|(id, _)| id)
                .collect();
            for &nop in &nops {
                cfg.remove_operator(nop)?;
            }
            if !nops.is_empty() {
                events
                    .record(EventKind::NopRemoved)
                    .method(method)
                    .message(format!("{} no-ops", nops.len()));
            }
            Ok(!nops.is_empty())
        })?;

        ctx.raise_ir_level(IrLevel::Lowest);
        Ok(PhaseTransition::Next)
    }
}
