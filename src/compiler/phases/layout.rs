//! Type layout and inter-procedural annotation.

use tracing::{debug, info};

use crate::{
    analysis::{CallDirection, CallsDatabase},
    compiler::{CompilerContext, EventKind, Phase, PhaseMovement, PhaseTransition},
    ir::MethodId,
    typesystem::MethodFacts,
    Result,
};

/// Lays out all concrete types and annotates methods from the calls database.
///
/// In order:
///
/// 1. Scan every method for global stores and allocations
/// 2. Lay out types with the platform's alignment and refresh data placements
/// 3. Build the calls database and flatten it in both directions
/// 4. Mark thread-safe and allocation-free methods
///
/// The layout, data placements, calls database and annotations are owned by
/// this phase: whenever control moves back to this phase or before it, they
/// are discarded so the next run recomputes them.
#[derive(Debug, Default)]
pub struct LayoutTypes {
    alignment: Option<u32>,
}

impl LayoutTypes {
    /// Creates the phase using the platform's memory alignment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the alignment rule.
    #[must_use]
    pub fn with_alignment(mut self, alignment: u32) -> Self {
        self.alignment = Some(alignment);
        self
    }
}

impl Phase for LayoutTypes {
    fn name(&self) -> &'static str {
        "LayoutTypes"
    }

    fn description(&self) -> &'static str {
        "Computes type layout, data placements and calls-database annotations"
    }

    fn run(&mut self, ctx: &CompilerContext) -> Result<PhaseTransition> {
        let scans: Vec<(MethodId, MethodFacts, Vec<MethodId>)> = ctx
            .method_ids()
            .into_iter()
            .map(|id| {
                ctx.with_method(id, |cfg| {
                    (id, MethodFacts::scan(cfg), CallsDatabase::call_targets(cfg))
                })
            })
            .collect::<Result<_>>()?;

        let mut types = ctx.types_mut()?;
        for (id, facts, _) in &scans {
            types.record_facts(*id, *facts)?;
        }

        let alignment = self
            .alignment
            .unwrap_or_else(|| types.platform().memory_alignment());
        types.layout_types(alignment)?;
        types.refresh_data_values()?;

        let mut db =
            CallsDatabase::analyze(scans.into_iter().map(|(id, _, callees)| (id, callees)))?;
        types.flatten_calls_database(&mut db, CallDirection::Callees)?;
        types.flatten_calls_database(&mut db, CallDirection::Callers)?;
        let thread_safe = types.annotate_thread_safe_methods(&db)?;
        let no_allocation = types.annotate_no_allocation_methods(&db)?;
        let generation = types.layout_generation();
        let type_count = types.types().count();
        drop(types);

        let edges = db.edge_count();
        ctx.set_calls_database(Some(db))?;

        ctx
            .events
            .record(EventKind::LayoutComputed)
            .phase(self.name())
            .message(format!(
                "{type_count} types, alignment {alignment}, generation {generation}"
            ));
        ctx
            .events
            .record(EventKind::AnnotationsComputed)
            .phase(self.name())
            .message(format!(
                "{edges} call edges, {thread_safe} thread-safe, {no_allocation} allocation-free"
            ));
        info!(
            generation,
            edges, thread_safe, no_allocation, "type layout and annotations computed"
        );

        Ok(PhaseTransition::Next)
    }

    fn validate_phase_movement(
        &mut self,
        ctx: &CompilerContext,
        movement: PhaseMovement,
    ) -> Result<()> {
        if !movement.is_backward_past_own() {
            return Ok(());
        }

        let mut types = ctx.types_mut()?;
        if !types.is_layout_valid() {
            return Ok(());
        }
        types.invalidate_layout();
        let invalidations = types.invalidation_count();
        drop(types);
        ctx.set_calls_database(None)?;

        ctx
            .events
            .record(EventKind::LayoutInvalidated)
            .phase(self.name())
            .message(format!(
                "control moved from phase #{} back to #{}",
                movement.from, movement.to
            ));
        debug!(
            from = movement.from,
            to = movement.to,
            invalidations,
            "layout discarded on backward movement"
        );
        Ok(())
    }
}
