//! IR consistency check.

use crate::{
    analysis::CacheKind,
    compiler::{CompilerContext, Phase, PhaseTransition},
    ir::ControlFlowGraph,
    Result,
};

/// Checks one method: structure first, then that every use has a reaching definition.
///
/// # Errors
///
/// Returns [`crate::Error::Invariant`] for structural defects and
/// [`crate::Error::UseBeforeDefinition`] for undefined reads.
pub fn verify_method(cfg: &mut ControlFlowGraph) -> Result<()> {
    cfg.validate()?;
    cfg.acquire(CacheKind::USE_DEF_CHAINS | CacheKind::VARIABLE_PROPERTIES)?
        .verify_definitions()
}

/// Rejects malformed input before any transformation runs.
pub struct VerifyIr;

impl Phase for VerifyIr {
    fn name(&self) -> &'static str {
        "VerifyIr"
    }

    fn description(&self) -> &'static str {
        "Checks block structure and use/def consistency of every method"
    }

    fn run(&mut self, ctx: &CompilerContext) -> Result<PhaseTransition> {
        ctx.for_each_method(|_, cfg| verify_method(cfg).map(|()| false))?;
        Ok(PhaseTransition::Next)
    }
}
