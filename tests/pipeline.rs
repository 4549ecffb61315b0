//! Whole-pipeline integration tests.
//!
//! Each test sets up a compilation unit (types plus method bodies), runs the
//! default phase catalogue through the `Controller` and inspects the unit
//! afterwards: IR level, layout state, annotations, events and, where it
//! matters, interpreted behavior.

use ember_midend::prelude::*;

/// Stores both arguments into a freshly allocated pair, reads them back and
/// returns the larger one.
fn pair_max(pair: TypeId) -> Result<ControlFlowGraph> {
    let first = FieldRef {
        owner: pair,
        index: 0,
    };
    let second = FieldRef {
        owner: pair,
        index: 1,
    };
    CfgBuilder::new(MethodId::new(0), "pair_max")
        .arg("a", IrType::I32)
        .arg("b", IrType::I32)
        .returns(IrType::I32)
        .build_with(|f| {
            let (a, b) = (f.arg(0), f.arg(1));
            let mut loaded = (a, b);
            f.block(0, |blk| {
                let p = blk.alloc(pair);
                blk.store_field(p, first, a);
                blk.store_field(p, second, b);
                let x = blk.load_field(p, first, IrType::I32);
                let y = blk.load_field(p, second, IrType::I32);
                let lt = blk.compare(Condition::Lt, x, y);
                blk.branch(lt, 1, 2);
                loaded = (x, y);
            });
            f.block(1, |blk| blk.ret_val(loaded.1));
            f.block(2, |blk| blk.ret_val(loaded.0));
        })
}

/// Calls `callee` only on a path that constant propagation removes.
fn guarded_call(id: usize, callee: usize) -> Result<ControlFlowGraph> {
    CfgBuilder::new(MethodId::new(id), format!("guarded{id}"))
        .build_with(|f| {
            let enabled = f.local("enabled", IrType::I32);
            f.block(0, |blk| {
                blk.assign_to(enabled, Expression::int(0));
                blk.branch(enabled, 2, 1);
            });
            f.block(1, |blk| blk.ret());
            f.block(2, |blk| {
                blk.call_void(MethodId::new(callee), &[]);
                blk.ret();
            });
        })
}

/// Writes global 0.
fn writer(id: usize) -> Result<ControlFlowGraph> {
    CfgBuilder::new(MethodId::new(id), format!("writer{id}")).build_with(|f| {
        f.block(0, |blk| {
            blk.store_global(GlobalId::new(0), Expression::int(1));
            blk.ret();
        });
    })
}

fn field_unit() -> Result<(CompilerContext, TypeId)> {
    let mut types = TypeSystem::new(PlatformAbstraction::embedded32());
    let pair = types.add_struct("Pair", &[("first", IrType::I32), ("second", IrType::I32)]);
    types
        .data_manager_mut()
        .add_object(GlobalId::new(0), "scratch", IrType::Object(pair));
    let ctx = CompilerContext::with_config(types, PipelineConfig::thorough());
    ctx.add_method(pair_max(pair)?)?;
    Ok((ctx, pair))
}

#[test]
fn test_default_pipeline_lowers_and_reduces() -> Result<()> {
    let (ctx, _) = field_unit()?;
    let original = ctx.with_method(MethodId::new(0), Clone::clone)?;

    let mut controller = Controller::with_default_phases()?;
    let report = controller.run(&ctx)?;

    assert_eq!(
        report.executed,
        vec![
            "VerifyIr",
            "LayoutTypes",
            "ExpandFieldAccesses",
            "ReduceNumberOfTemporaries",
            "PrepareForRegisterAllocation",
        ]
    );
    assert_eq!(report.skipped, vec!["CollectRegisterAllocationConstraints"]);
    assert_eq!(report.rewinds, 0);
    assert_eq!(ctx.ir_level(), IrLevel::Lowest);

    let types = ctx.types()?;
    assert!(types.is_layout_valid());
    assert_eq!(types.data_manager().placement_of(GlobalId::new(0))?, (0, 8));
    let offsets = |field: FieldRef| i64::from(types.field_offset(field).unwrap_or(0));

    let optimized = ctx.with_method(MethodId::new(0), Clone::clone)?;
    assert!(optimized
        .operators()
        .all(|(_, op)| !op.kind.is_field_access() && !matches!(op.kind, OperatorKind::Nop)));
    assert!(optimized
        .operators()
        .any(|(_, op)| matches!(op.kind, OperatorKind::CompareBranch { .. })));

    for (a, b) in [(1, 2), (5, -5), (3, 3)] {
        let args = [Value::Int(a), Value::Int(b)];
        let expected = Interpreter::new()
            .with_field_offsets(offsets)
            .run(&original, &args)?;
        let actual = Interpreter::new().run(&optimized, &args)?;
        assert_eq!(expected.result, actual.result);
        assert_eq!(actual.result, Some(Value::Int(a.max(b))));
    }

    let stats = ctx.events.stats();
    assert_eq!(stats.field_accesses_lowered, 4);
    assert_eq!(stats.layouts, 1);
    assert_eq!(stats.phases_run, 5);
    Ok(())
}

#[test]
fn test_call_elimination_redoes_layout() -> Result<()> {
    let ctx = CompilerContext::with_config(TypeSystem::default(), PipelineConfig::thorough());
    ctx.add_method(guarded_call(0, 1)?)?;
    ctx.add_method(writer(1)?)?;

    let mut controller = Controller::with_default_phases()?;
    let report = controller.run(&ctx)?;

    assert_eq!(report.runs_of("LayoutTypes"), 2);
    assert_eq!(report.runs_of("ReduceNumberOfTemporaries"), 2);
    assert_eq!(report.rewinds, 1);
    assert_eq!(ctx.events.count(EventKind::LayoutInvalidated), 1);

    let types = ctx.types()?;
    assert_eq!(types.layout_generation(), 2);
    assert_eq!(types.invalidation_count(), 1);
    // the only call is gone, so the caller no longer inherits the global write
    assert!(types
        .annotations_of(MethodId::new(0))?
        .contains(MethodAnnotations::THREAD_SAFE));
    assert!(!types
        .annotations_of(MethodId::new(1))?
        .contains(MethodAnnotations::THREAD_SAFE));
    drop(types);

    let calls = ctx.calls_database()?;
    let db = calls.as_ref().ok_or(Error::Error("no calls database".into()))?;
    assert!(db.callees(MethodId::new(0)).is_empty());
    Ok(())
}

#[test]
fn test_rewound_pipeline_redoes_layout_after_call_elimination() -> Result<()> {
    let ctx = CompilerContext::with_config(TypeSystem::default(), PipelineConfig::thorough());
    ctx.add_method(guarded_call(0, 1)?)?;
    ctx.add_method(writer(1)?)?;

    let mut controller = Controller::with_default_phases()?;
    assert_eq!(controller.run(&ctx)?.runs_of("LayoutTypes"), 2);

    // a method added between runs gets its dead call removed in the second run
    ctx.add_method(guarded_call(2, 1)?)?;
    controller.rewind_to(&ctx, "VerifyIr")?;
    let report = controller.run(&ctx)?;

    assert_eq!(report.runs_of("LayoutTypes"), 2);
    assert_eq!(report.runs_of("ReduceNumberOfTemporaries"), 2);
    let types = ctx.types()?;
    assert!(types.is_layout_valid());
    assert!(types
        .annotations_of(MethodId::new(2))?
        .contains(MethodAnnotations::THREAD_SAFE));
    drop(types);

    let calls = ctx.calls_database()?;
    let db = calls.as_ref().ok_or(Error::Error("no calls database".into()))?;
    assert!(db.callees(MethodId::new(2)).is_empty());
    Ok(())
}

#[test]
fn test_rewinding_before_layout_recomputes_it() -> Result<()> {
    let (ctx, pair) = field_unit()?;
    let mut controller = Controller::with_default_phases()?;
    controller.run(&ctx)?;
    assert_eq!(ctx.types()?.layout_generation(), 1);

    controller.rewind_to(&ctx, "VerifyIr")?;
    {
        let types = ctx.types()?;
        assert!(!types.is_layout_valid());
        assert!(types.data_manager().is_stale());
        assert!(types.layout_of(pair).is_err());
    }
    assert!(ctx.calls_database()?.is_none());

    let report = controller.run(&ctx)?;
    assert_eq!(report.runs_of("LayoutTypes"), 1);
    let types = ctx.types()?;
    assert!(types.is_layout_valid());
    assert_eq!(types.layout_generation(), 2);
    assert!(!types.data_manager().is_stale());
    Ok(())
}

#[test]
fn test_constraints_collected_when_enabled() -> Result<()> {
    let config = PipelineConfig::default().with_phase_enabled("CollectRegisterAllocationConstraints");
    let ctx = CompilerContext::with_config(TypeSystem::default(), config);
    let cfg = CfgBuilder::new(MethodId::new(0), "forward")
        .arg("x", IrType::I32)
        .returns(IrType::I32)
        .build_with(|f| {
            let x = f.arg(0);
            f.block(0, |blk| {
                let r = blk.call(MethodId::new(9), &[Expression::Var(x)], IrType::I32);
                blk.ret_val(r);
            });
        })?;
    ctx.add_method(cfg)?;

    let report = Controller::with_default_phases()?.run(&ctx)?;
    assert_eq!(report.runs_of("CollectRegisterAllocationConstraints"), 1);
    assert!(report.skipped.is_empty());

    let constraints = ctx
        .constraints
        .get(&MethodId::new(0))
        .ok_or(Error::MethodNotFound(MethodId::new(0)))?;
    let r0 = Register::new(0);
    assert!(constraints
        .iter()
        .any(|c| c.kind == ConstraintKind::IncomingArgument(r0) && c.operator.is_none()));
    assert!(constraints
        .iter()
        .any(|c| c.kind == ConstraintKind::OutgoingArgument(r0) && c.operator.is_some()));
    assert_eq!(
        constraints
            .iter()
            .filter(|c| c.kind == ConstraintKind::ReturnValue(r0))
            .count(),
        2
    );
    Ok(())
}

#[test]
fn test_undefined_read_aborts_pipeline() -> Result<()> {
    let ctx = CompilerContext::new(TypeSystem::default());
    let cfg = CfgBuilder::new(MethodId::new(0), "broken")
        .returns(IrType::I32)
        .build_with(|f| {
            let ghost = f.temp(IrType::I32);
            f.block(0, |blk| blk.ret_val(ghost));
        })?;
    ctx.add_method(cfg)?;

    let mut controller = Controller::with_default_phases()?;
    let err = controller.run(&ctx).unwrap_err();
    assert!(matches!(err, Error::UseBeforeDefinition { .. }));
    assert_eq!(controller.current(), Some("VerifyIr"));
    assert!(!ctx.types()?.is_layout_valid());
    Ok(())
}

#[test]
fn test_object_oriented_input_skips_layout_block() -> Result<()> {
    let ctx = CompilerContext::new(TypeSystem::default());
    ctx.set_ir_level(IrLevel::ObjectOriented);
    ctx.add_method(writer(0)?)?;

    let report = Controller::with_default_phases()?.run(&ctx)?;
    assert_eq!(report.executed, vec!["VerifyIr", "ReduceNumberOfTemporaries"]);
    assert_eq!(
        report.skipped,
        vec![
            "LayoutTypes",
            "ExpandFieldAccesses",
            "PrepareForRegisterAllocation",
            "CollectRegisterAllocationConstraints",
        ]
    );
    assert_eq!(ctx.ir_level(), IrLevel::ObjectOriented);
    Ok(())
}
