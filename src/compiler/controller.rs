//! Phase pipeline execution.
//!
//! The [`Controller`] walks the scheduled phases with a cursor. After each
//! phase it follows the returned [`PhaseTransition`]: `Next` advances, `Goto`
//! moves the cursor to a named phase (possibly an earlier one) and `Done`
//! ends the run. Every cursor move, including the step over a skipped phase,
//! is announced to all phases through
//! [`Phase::validate_phase_movement`](crate::compiler::Phase::validate_phase_movement),
//! so phases owning derived state can discard it before control re-enters
//! them or anything scheduled before them.
//!
//! ```text
//!   VerifyIr ─► LayoutTypes ─► ExpandFieldAccesses ─► ReduceNumberOfTemporaries ─► ...
//!                    ▲                                          │
//!                    └────────── Goto("LayoutTypes") ───────────┘
//!                     (LayoutTypes invalidates layout first)
//! ```
//!
//! The number of moves per run is bounded by
//! [`PipelineConfig::max_phase_transitions`](crate::config::PipelineConfig::max_phase_transitions).

use std::collections::HashMap;

use tracing::{debug, info};

use crate::{
    compiler::{
        phases::verify_method,
        scheduler::{PhaseCatalogue, PhaseEntry},
        CompilerContext, EventKind, PhaseMovement, PhaseTransition,
    },
    Error, Result,
};

/// What one [`Controller::run`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerReport {
    /// Phases executed, in order, with repetitions
    pub executed: Vec<String>,
    /// Phases passed over because they were disabled or not applicable
    pub skipped: Vec<String>,
    /// Moves that re-entered the current phase or an earlier one
    pub rewinds: usize,
    /// Cursor moves performed
    pub transitions: usize,
}

impl ControllerReport {
    /// Returns how often `phase` was executed.
    #[must_use]
    pub fn runs_of(&self, phase: &str) -> usize {
        self.executed.iter().filter(|p| *p == phase).count()
    }
}

/// Executes a scheduled [`PhaseCatalogue`] against a [`CompilerContext`].
pub struct Controller {
    entries: Vec<PhaseEntry>,
    index: HashMap<String, usize>,
    cursor: usize,
    transitions: usize,
}

impl Controller {
    /// Schedules `catalogue` and positions the cursor on its first phase.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PhaseCycle`] or [`Error::UnknownPhase`] if the catalogue
    /// cannot be scheduled.
    pub fn new(catalogue: PhaseCatalogue) -> Result<Self> {
        let entries = catalogue.into_scheduled()?;
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.descriptor.name.clone(), i))
            .collect();
        Ok(Controller {
            entries,
            index,
            cursor: 0,
            transitions: 0,
        })
    }

    /// Creates a controller over [`PhaseCatalogue::with_default_phases`].
    ///
    /// # Errors
    ///
    /// See [`Controller::new`].
    pub fn with_default_phases() -> Result<Self> {
        Self::new(PhaseCatalogue::with_default_phases())
    }

    /// Returns the phase names in execution order.
    #[must_use]
    pub fn schedule(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.descriptor.name.as_str())
            .collect()
    }

    /// Returns the phase the next [`run`](Self::run) starts with, `None` once
    /// the pipeline has finished.
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.entries
            .get(self.cursor)
            .map(|e| e.descriptor.name.as_str())
    }

    /// Runs phases from the cursor until the schedule is exhausted or a phase
    /// returns [`PhaseTransition::Done`].
    ///
    /// # Errors
    ///
    /// - Any error a phase returns; the cursor stays on that phase
    /// - [`Error::UnknownPhase`] for a `Goto` naming an unscheduled phase
    /// - [`Error::Invariant`] if the run exceeds the configured transition bound
    /// - [`Error::UseBeforeDefinition`] when verification after each phase is
    ///   enabled and a phase left a method inconsistent
    pub fn run(&mut self, ctx: &CompilerContext) -> Result<ControllerReport> {
        let mut report = ControllerReport::default();
        self.transitions = 0;

        while let Some(entry) = self.entries.get_mut(self.cursor) {
            let current = self.cursor;
            let name = entry.descriptor.name.clone();
            let level = ctx.ir_level();

            let enabled = ctx.config.is_phase_enabled(&name, entry.descriptor.enabled);
            if !enabled || !entry.descriptor.applies_at(level) {
                let reason = if enabled {
                    format!("not applicable at {level}")
                } else {
                    "disabled".to_string()
                };
                debug!(phase = %name, %reason, "phase skipped");
                ctx
                    .events
                    .record(EventKind::PhaseSkipped)
                    .phase(name.as_str())
                    .message(reason);
                report.skipped.push(name);
                self.move_to(ctx, current, current + 1, &mut report)?;
                continue;
            }

            info!(phase = %name, %level, "phase started");
            ctx
                .events
                .record(EventKind::PhaseStarted)
                .phase(name.as_str())
                .message(entry.phase.description());
            let transition = entry.phase.run(ctx)?;
            report.executed.push(name.clone());

            if ctx.config.verify_after_each_phase {
                ctx.for_each_method(|_, cfg| verify_method(cfg).map(|()| false))?;
            }

            let next = match transition {
                PhaseTransition::Next => current + 1,
                PhaseTransition::Goto(target) => *self
                    .index
                    .get(&target)
                    .ok_or(Error::UnknownPhase(target))?,
                PhaseTransition::Done => {
                    debug!(phase = %name, "pipeline finished early");
                    self.cursor = self.entries.len();
                    break;
                }
            };
            self.move_to(ctx, current, next, &mut report)?;
        }

        report.transitions = self.transitions;
        info!(
            executed = report.executed.len(),
            skipped = report.skipped.len(),
            rewinds = report.rewinds,
            "pipeline finished"
        );
        Ok(report)
    }

    /// Moves the cursor back (or forward) to `phase`, notifying all phases.
    ///
    /// After a finished run this re-enters the pipeline: the next
    /// [`run`](Self::run) resumes at `phase`, with state owned by later
    /// phases already invalidated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPhase`] if `phase` is not scheduled, or any
    /// error raised while a phase discards state.
    pub fn rewind_to(&mut self, ctx: &CompilerContext, phase: &str) -> Result<()> {
        let target = *self
            .index
            .get(phase)
            .ok_or_else(|| Error::UnknownPhase(phase.to_string()))?;
        let mut report = ControllerReport::default();
        self.move_to(ctx, self.cursor, target, &mut report)
    }

    fn move_to(
        &mut self,
        ctx: &CompilerContext,
        from: usize,
        to: usize,
        report: &mut ControllerReport,
    ) -> Result<()> {
        self.transitions += 1;
        if self.transitions > ctx.config.max_phase_transitions {
            return Err(invariant_error!(
                "more than {} phase transitions, last from #{} to #{}",
                ctx.config.max_phase_transitions,
                from,
                to
            ));
        }

        for (own, entry) in self.entries.iter_mut().enumerate() {
            entry
                .phase
                .validate_phase_movement(ctx, PhaseMovement { from, to, own })?;
        }

        if to <= from {
            report.rewinds += 1;
            let target = self
                .entries
                .get(to)
                .map_or("", |e| e.descriptor.name.as_str());
            info!(from, to, phase = target, "control moved backward");
            ctx
                .events
                .record(EventKind::PhaseRewound)
                .phase(target)
                .message(format!("#{from} -> #{to}"));
        }

        self.cursor = to;
        Ok(())
    }
}
