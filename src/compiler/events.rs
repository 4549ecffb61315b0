//! Change tracking for the pipeline.
//!
//! Every rewrite and every controller decision is recorded as an [`Event`] in
//! an [`EventLog`]. The log is append-only and can be shared by reference
//! across rayon workers; events are recorded through a builder that commits
//! when dropped:
//!
//! ```rust,ignore
//! ctx.events
//!     .record(EventKind::CopyPropagated)
//!     .at(method, position)
//!     .message(format!("{dest} <- {source}"));
//! ```

use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

use strum::{Display, EnumIter, IntoEnumIterator};

use crate::ir::MethodId;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum EventKind {
    /// A single-use temporary was replaced by its source
    CopyPropagated,
    /// A zero-extend feeding a branch was removed
    ZeroExtendFolded,
    /// A comparison followed by `== 0` was folded into the inverted comparison
    ComparisonInverted,
    /// A branch now tests the operands of the preceding operator directly
    BranchStrengthReduced,
    /// A constant definition resolved a branch in its own block
    ConstantBranchPropagated,
    /// A conditional branch was duplicated next to a reaching definition
    BranchReplicated,
    /// A branch on a constant became an unconditional jump
    BranchFolded,
    /// A dead operator was deleted
    InstructionRemoved,
    /// An unreachable block was deleted
    BlockRemoved,
    /// A field access was lowered to pointer arithmetic
    FieldAccessLowered,
    /// A no-op was stripped before register allocation
    NopRemoved,
    /// A phase began executing
    PhaseStarted,
    /// A phase was skipped (disabled or not applicable)
    PhaseSkipped,
    /// Control moved back to an earlier phase
    PhaseRewound,
    /// Type layout was computed
    LayoutComputed,
    /// Layout-derived state was discarded
    LayoutInvalidated,
    /// Method annotations were propagated over the calls database
    AnnotationsComputed,
    /// Register allocation constraints were recorded
    ConstraintsCollected,
    /// Informational message
    Info,
    /// Warning
    Warning,
}

impl EventKind {
    /// Returns `true` for kinds that describe a change to the IR.
    #[must_use]
    pub const fn is_transformation(self) -> bool {
        matches!(
            self,
            EventKind::CopyPropagated
                | EventKind::ZeroExtendFolded
                | EventKind::ComparisonInverted
                | EventKind::BranchStrengthReduced
                | EventKind::ConstantBranchPropagated
                | EventKind::BranchReplicated
                | EventKind::BranchFolded
                | EventKind::InstructionRemoved
                | EventKind::BlockRemoved
                | EventKind::FieldAccessLowered
                | EventKind::NopRemoved
        )
    }
}

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Kind
    pub kind: EventKind,
    /// Method the event refers to, if any
    pub method: Option<MethodId>,
    /// Spanning-tree position inside the method, if any
    pub location: Option<usize>,
    /// Phase that was executing
    pub phase: Option<String>,
    /// Free-form detail
    pub message: String,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(phase) = &self.phase {
            write!(f, " {phase}")?;
        }
        if let Some(method) = self.method {
            write!(f, " {method}")?;
            if let Some(location) = self.location {
                write!(f, "@{location}")?;
            }
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// Builder returned by [`EventLog::record`]; the event is committed on drop.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    event: Option<Event>,
}

impl EventBuilder<'_> {
    /// Attaches a method and a position inside it.
    pub fn at(mut self, method: MethodId, location: usize) -> Self {
        if let Some(event) = &mut self.event {
            event.method = Some(method);
            event.location = Some(location);
        }
        self
    }

    /// Attaches a method.
    pub fn method(mut self, method: MethodId) -> Self {
        if let Some(event) = &mut self.event {
            event.method = Some(method);
        }
        self
    }

    /// Attaches the executing phase.
    pub fn phase(mut self, phase: impl Into<String>) -> Self {
        if let Some(event) = &mut self.event {
            event.phase = Some(phase.into());
        }
        self
    }

    /// Sets the message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        if let Some(event) = &mut self.event {
            event.message = message.into();
        }
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        if let Some(event) = self.event.take() {
            self.log.events.push(event);
        }
    }
}

/// Append-only, thread-safe event log.
///
/// [`take`](Self::take) moves the current contents out through a shared
/// reference; events already taken are hidden from later reads.
#[derive(Default)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
    taken: AtomicUsize,
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog").field("len", &self.len()).finish()
    }
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts recording an event of `kind`.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder {
            log: self,
            event: Some(Event {
                kind,
                method: None,
                location: None,
                phase: None,
                message: String::new(),
            }),
        }
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.record(EventKind::Info).message(message);
    }

    /// Records a warning.
    pub fn warn(&self, message: impl Into<String>) {
        self.record(EventKind::Warning).message(message);
    }

    /// Appends every event of `other`.
    pub fn merge(&self, other: EventLog) {
        for event in other.iter() {
            self.events.push(event.clone());
        }
    }

    /// Moves all visible events into a new log.
    pub fn take(&self) -> EventLog {
        let end = self.events.count();
        let start = self.taken.swap(end, Ordering::AcqRel);
        let taken = EventLog::new();
        for (index, event) in self.events.iter() {
            if index >= start && index < end {
                taken.events.push(event.clone());
            }
        }
        taken
    }

    /// Iterates visible events in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        let start = self.taken.load(Ordering::Acquire);
        self.events
            .iter()
            .filter(move |(index, _)| *index >= start)
            .map(|(_, event)| event)
    }

    /// Returns the number of visible events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events
            .count()
            .saturating_sub(self.taken.load(Ordering::Acquire))
    }

    /// Returns `true` if no events are visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts visible events of `kind`.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        self.iter().filter(|e| e.kind == kind).count()
    }

    /// Returns `true` if any visible event changed the IR.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.iter().any(|e| e.kind.is_transformation())
    }

    /// Summarizes the log.
    #[must_use]
    pub fn stats(&self) -> DerivedStats {
        let mut stats = DerivedStats::default();
        for event in self.iter() {
            match event.kind {
                EventKind::CopyPropagated
                | EventKind::ZeroExtendFolded
                | EventKind::ComparisonInverted => stats.temporaries_eliminated += 1,
                EventKind::BranchStrengthReduced
                | EventKind::ConstantBranchPropagated
                | EventKind::BranchReplicated
                | EventKind::BranchFolded => stats.branches_rewritten += 1,
                EventKind::InstructionRemoved | EventKind::NopRemoved => {
                    stats.instructions_removed += 1;
                }
                EventKind::BlockRemoved => stats.blocks_removed += 1,
                EventKind::FieldAccessLowered => stats.field_accesses_lowered += 1,
                EventKind::PhaseStarted => stats.phases_run += 1,
                EventKind::PhaseSkipped => stats.phases_skipped += 1,
                EventKind::PhaseRewound => stats.rewinds += 1,
                EventKind::LayoutComputed => stats.layouts += 1,
                EventKind::Warning => stats.warnings += 1,
                EventKind::LayoutInvalidated
                | EventKind::AnnotationsComputed
                | EventKind::ConstraintsCollected
                | EventKind::Info => {}
            }
        }
        stats
    }

    /// Returns a per-kind count of all visible events, in declaration order.
    #[must_use]
    pub fn histogram(&self) -> Vec<(EventKind, usize)> {
        EventKind::iter()
            .map(|kind| (kind, self.count(kind)))
            .filter(|&(_, n)| n > 0)
            .collect()
    }
}

/// Aggregate counts derived from an [`EventLog`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DerivedStats {
    /// Temporaries removed by copy, zero-extend and comparison propagation
    pub temporaries_eliminated: usize,
    /// Branches strength-reduced, folded or replicated
    pub branches_rewritten: usize,
    /// Operators deleted
    pub instructions_removed: usize,
    /// Blocks deleted
    pub blocks_removed: usize,
    /// Field accesses lowered
    pub field_accesses_lowered: usize,
    /// Phases executed
    pub phases_run: usize,
    /// Phases skipped
    pub phases_skipped: usize,
    /// Backward phase movements
    pub rewinds: usize,
    /// Layout computations
    pub layouts: usize,
    /// Warnings
    pub warnings: usize,
}

impl fmt::Display for DerivedStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} phases ({} skipped, {} rewinds), {} temporaries, {} branches, {} ops and {} blocks removed",
            self.phases_run,
            self.phases_skipped,
            self.rewinds,
            self.temporaries_eliminated,
            self.branches_rewritten,
            self.instructions_removed,
            self.blocks_removed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_commits_on_drop() {
        let log = EventLog::new();
        log
            .record(EventKind::CopyPropagated)
            .at(MethodId::new(3), 7)
            .phase("ReduceNumberOfTemporaries")
            .message("v2 <- v0");

        let event = log.iter().next().unwrap();
        assert_eq!(event.method, Some(MethodId::new(3)));
        assert_eq!(event.location, Some(7));
        assert_eq!(
            event.to_string(),
            "[CopyPropagated] ReduceNumberOfTemporaries m3@7: v2 <- v0"
        );
    }

    #[test]
    fn test_take_and_merge() {
        let log = EventLog::new();
        log.info("first");
        log.warn("second");
        assert_eq!(log.len(), 2);

        let taken = log.take();
        assert!(log.is_empty());
        assert_eq!(taken.len(), 2);

        log.info("third");
        assert_eq!(log.len(), 1);
        assert_eq!(log.iter().next().unwrap().message, "third");

        log.merge(taken);
        assert_eq!(log.len(), 3);
        assert_eq!(log.count(EventKind::Warning), 1);
    }

    #[test]
    fn test_stats() {
        let log = EventLog::new();
        log.record(EventKind::CopyPropagated);
        log.record(EventKind::BranchStrengthReduced);
        log.record(EventKind::InstructionRemoved);
        log.record(EventKind::PhaseStarted);
        log.record(EventKind::PhaseRewound);

        let stats = log.stats();
        assert_eq!(stats.temporaries_eliminated, 1);
        assert_eq!(stats.branches_rewritten, 1);
        assert_eq!(stats.instructions_removed, 1);
        assert_eq!(stats.rewinds, 1);
        assert!(log.has_changes());
        assert_eq!(log.histogram().len(), 5);
    }
}
