//! Scheduling and control-flow tests for user-registered phases.
//!
//! Custom phases are registered next to the default catalogue to observe the
//! shared state at their position in the schedule and to drive the controller
//! backward.

use std::sync::{Arc, Mutex};

use ember_midend::{
    compiler::phases::{LayoutTypes, VerifyIr},
    compiler::LAYOUT_TYPES,
    prelude::*,
};

/// What an [`Observer`] saw when it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Observation {
    layout_valid: bool,
    calls_known: bool,
    level: IrLevel,
}

/// Records the unit's state each time it runs.
struct Observer {
    name: &'static str,
    seen: Arc<Mutex<Vec<Observation>>>,
}

impl Phase for Observer {
    fn name(&self) -> &'static str {
        self.name
    }

    fn run(&mut self, ctx: &CompilerContext) -> Result<PhaseTransition> {
        let observation = Observation {
            layout_valid: ctx.types()?.is_layout_valid(),
            calls_known: ctx.calls_database()?.is_some(),
            level: ctx.ir_level(),
        };
        self.seen
            .lock()
            .map_err(|_| Error::LockError)?
            .push(observation);
        Ok(PhaseTransition::Next)
    }
}

/// Sends control back to `target` the first `times` times it runs.
struct Rewinder {
    target: &'static str,
    times: usize,
}

impl Phase for Rewinder {
    fn name(&self) -> &'static str {
        "Rewinder"
    }

    fn run(&mut self, _ctx: &CompilerContext) -> Result<PhaseTransition> {
        if self.times == 0 {
            return Ok(PhaseTransition::Next);
        }
        self.times -= 1;
        Ok(PhaseTransition::Goto(self.target.to_string()))
    }
}

fn identity() -> Result<ControlFlowGraph> {
    CfgBuilder::new(MethodId::new(0), "identity")
        .arg("x", IrType::I32)
        .returns(IrType::I32)
        .build_with(|f| {
            let x = f.arg(0);
            f.block(0, |blk| {
                let t = blk.copy(x);
                blk.ret_val(t);
            });
        })
}

fn unit(config: PipelineConfig) -> Result<CompilerContext> {
    let ctx = CompilerContext::with_config(TypeSystem::default(), config);
    ctx.add_method(identity()?)?;
    Ok(ctx)
}

#[test]
fn test_observer_joins_layout_block() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut catalogue = PhaseCatalogue::with_default_phases();
    catalogue.register(
        PhaseDescriptor::new("Observer")
            .after(LAYOUT_TYPES)
            .in_block("layout"),
        Box::new(Observer {
            name: "Observer",
            seen: Arc::clone(&seen),
        }),
    )?;

    // inside the block, registration order puts the observer behind field expansion
    let schedule = catalogue.schedule()?;
    let position = |name: &str| schedule.iter().position(|p| p == name);
    assert_eq!(position("Observer"), Some(3));
    assert_eq!(position("ExpandFieldAccesses"), Some(2));

    let ctx = unit(PipelineConfig::default())?;
    Controller::new(catalogue)?.run(&ctx)?;

    let seen = seen.lock().map_err(|_| Error::LockError)?;
    assert_eq!(
        *seen,
        vec![Observation {
            layout_valid: true,
            calls_known: true,
            level: IrLevel::ScalarValues,
        }]
    );
    Ok(())
}

#[test]
fn test_custom_goto_invalidates_and_relays() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut catalogue = PhaseCatalogue::with_default_phases();
    catalogue.register(
        PhaseDescriptor::new("Rewinder").after("PrepareForRegisterAllocation"),
        Box::new(Rewinder {
            target: LAYOUT_TYPES,
            times: 2,
        }),
    )?;
    catalogue.register(
        PhaseDescriptor::new("Observer").after("Rewinder"),
        Box::new(Observer {
            name: "Observer",
            seen: Arc::clone(&seen),
        }),
    )?;

    let ctx = unit(PipelineConfig::default())?;
    let mut controller = Controller::new(catalogue)?;
    let report = controller.run(&ctx)?;

    assert_eq!(report.rewinds, 2);
    assert_eq!(report.runs_of(LAYOUT_TYPES), 3);
    assert_eq!(report.runs_of("Rewinder"), 3);
    assert_eq!(report.runs_of("Observer"), 1);
    assert_eq!(controller.current(), None);

    assert_eq!(ctx.events.count(EventKind::LayoutInvalidated), 2);
    assert_eq!(ctx.events.count(EventKind::PhaseRewound), 2);
    let types = ctx.types()?;
    assert_eq!(types.layout_generation(), 3);
    assert!(types.is_layout_valid());
    drop(types);

    let seen = seen.lock().map_err(|_| Error::LockError)?;
    assert!(seen[0].layout_valid && seen[0].calls_known);
    assert_eq!(seen[0].level, IrLevel::Lowest);
    Ok(())
}

#[test]
fn test_forward_goto_leaves_layout_alone() -> Result<()> {
    let mut catalogue = PhaseCatalogue::new();
    catalogue.register(PhaseDescriptor::new("VerifyIr"), Box::new(VerifyIr))?;
    catalogue.register(
        PhaseDescriptor::new(LAYOUT_TYPES).after("VerifyIr"),
        Box::new(LayoutTypes::new()),
    )?;
    catalogue.register(
        PhaseDescriptor::new("Rewinder").after(LAYOUT_TYPES),
        Box::new(Rewinder {
            target: "Tail",
            times: 1,
        }),
    )?;
    let seen = Arc::new(Mutex::new(Vec::new()));
    catalogue.register(
        PhaseDescriptor::new("Skipped").after("Rewinder"),
        Box::new(Observer {
            name: "Skipped",
            seen: Arc::clone(&seen),
        }),
    )?;
    catalogue.register(
        PhaseDescriptor::new("Tail").after("Skipped"),
        Box::new(Observer {
            name: "Tail",
            seen: Arc::clone(&seen),
        }),
    )?;

    let ctx = unit(PipelineConfig::default())?;
    let report = Controller::new(catalogue)?.run(&ctx)?;

    assert_eq!(report.executed, vec!["VerifyIr", LAYOUT_TYPES, "Rewinder", "Tail"]);
    assert_eq!(report.rewinds, 0);
    assert_eq!(ctx.events.count(EventKind::LayoutInvalidated), 0);
    assert_eq!(seen.lock().map_err(|_| Error::LockError)?.len(), 1);
    Ok(())
}

#[test]
fn test_disabled_reduction_keeps_methods() -> Result<()> {
    let config = PipelineConfig::default().with_phase_disabled("ReduceNumberOfTemporaries");
    let ctx = unit(config)?;
    let before = ctx.with_method(MethodId::new(0), |cfg| cfg.operator_count())?;

    let report = Controller::with_default_phases()?.run(&ctx)?;
    assert!(report
        .skipped
        .contains(&"ReduceNumberOfTemporaries".to_string()));
    assert_eq!(
        ctx.with_method(MethodId::new(0), |cfg| cfg.operator_count())?,
        before
    );
    assert_eq!(ctx.events.count(EventKind::CopyPropagated), 0);
    assert_eq!(ctx.ir_level(), IrLevel::Lowest);
    Ok(())
}

fn marker(name: &'static str) -> Box<dyn Phase> {
    Box::new(Observer {
        name,
        seen: Arc::default(),
    })
}

#[test]
fn test_block_cycle_is_reported() -> Result<()> {
    // Intruder runs after LayoutTypes but ExpandFieldAccesses needs it, so the
    // layout block cannot stay contiguous
    let mut catalogue = PhaseCatalogue::new();
    catalogue.register(PhaseDescriptor::new("VerifyIr"), marker("VerifyIr"))?;
    catalogue.register(
        PhaseDescriptor::new(LAYOUT_TYPES)
            .after("VerifyIr")
            .in_block("layout"),
        marker(LAYOUT_TYPES),
    )?;
    catalogue.register(
        PhaseDescriptor::new("Intruder").after(LAYOUT_TYPES),
        marker("Intruder"),
    )?;
    catalogue.register(
        PhaseDescriptor::new("ExpandFieldAccesses")
            .after(LAYOUT_TYPES)
            .after("Intruder")
            .in_block("layout"),
        marker("ExpandFieldAccesses"),
    )?;

    match catalogue.schedule() {
        Err(Error::PhaseCycle(cycle)) => {
            assert!(cycle.contains(&"[layout]".to_string()));
            assert!(cycle.contains(&"Intruder".to_string()));
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
    assert!(Controller::new(catalogue).is_err());
    Ok(())
}
