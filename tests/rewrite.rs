//! Temporary reduction integration tests.
//!
//! These tests drive the rewrite engine through the public API:
//! 1. Build a method with `CfgBuilder`
//! 2. Run `TemporaryReduction` on a copy
//! 3. Compare the interpreted results of both versions on fixed inputs
//! 4. Check termination, idempotence and the declining guards

use ember_midend::{
    compiler::{passes::TemporaryReduction, EventKind, EventLog},
    ir::{
        BinaryOp, CfgBuilder, Condition, ControlFlowGraph, Expression, GlobalId, Interpreter,
        IrType, MethodId, OperatorKind, Value,
    },
    Result,
};

/// `if a < b return b else return a`
fn max() -> Result<ControlFlowGraph> {
    CfgBuilder::new(MethodId::new(0), "max")
        .arg("a", IrType::I32)
        .arg("b", IrType::I32)
        .returns(IrType::I32)
        .build_with(|f| {
            let (a, b) = (f.arg(0), f.arg(1));
            f.block(0, |blk| {
                let lt = blk.compare(Condition::Lt, a, b);
                blk.branch(lt, 1, 2);
            });
            f.block(1, |blk| blk.ret_val(b));
            f.block(2, |blk| blk.ret_val(a));
        })
}

/// Sums `0..n` with a counted loop.
fn sum_to() -> Result<ControlFlowGraph> {
    CfgBuilder::new(MethodId::new(1), "sum_to")
        .arg("n", IrType::I32)
        .returns(IrType::I32)
        .build_with(|f| {
            let n = f.arg(0);
            let i = f.local("i", IrType::I32);
            let s = f.local("s", IrType::I32);
            f.block(0, |blk| {
                blk.assign_to(i, Expression::int(0));
                blk.assign_to(s, Expression::int(0));
                blk.jump(1);
            });
            f.block(1, |blk| {
                let c = blk.compare(Condition::Lt, i, n);
                blk.branch(c, 2, 3);
            });
            f.block(2, |blk| {
                let t = blk.copy(i);
                blk.binary_to(s, BinaryOp::Add, s, t);
                blk.binary_to(i, BinaryOp::Add, i, Expression::int(1));
                blk.jump(1);
            });
            f.block(3, |blk| blk.ret_val(s));
        })
}

/// `if zeroextend(x == 0) != 0 return 1 else return 2`
fn zero_test() -> Result<ControlFlowGraph> {
    CfgBuilder::new(MethodId::new(2), "zero_test")
        .arg("x", IrType::I32)
        .returns(IrType::I32)
        .build_with(|f| {
            let x = f.arg(0);
            f.block(0, |blk| {
                let z = blk.compare(Condition::Eq, x, Expression::int(0));
                let w = blk.zero_extend(z, 8);
                blk.branch(w, 1, 2);
            });
            f.block(1, |blk| blk.ret_val(Expression::int(1)));
            f.block(2, |blk| blk.ret_val(Expression::int(2)));
        })
}

/// `t = a < b; u = t == 0; if u != 0 return a else return b`
fn negated_compare() -> Result<ControlFlowGraph> {
    CfgBuilder::new(MethodId::new(3), "negated_compare")
        .arg("a", IrType::I32)
        .arg("b", IrType::I32)
        .returns(IrType::I32)
        .build_with(|f| {
            let (a, b) = (f.arg(0), f.arg(1));
            f.block(0, |blk| {
                let t = blk.compare(Condition::Lt, a, b);
                let u = blk.compare(Condition::Eq, t, Expression::int(0));
                blk.branch(u, 1, 2);
            });
            f.block(1, |blk| blk.ret_val(a));
            f.block(2, |blk| blk.ret_val(b));
        })
}

/// `v` is defined in two predecessors of the block testing it.
fn merged_condition() -> Result<ControlFlowGraph> {
    CfgBuilder::new(MethodId::new(4), "merged_condition")
        .arg("a", IrType::I32)
        .returns(IrType::I32)
        .build_with(|f| {
            let a = f.arg(0);
            let v = f.local("v", IrType::I32);
            f.block(0, |blk| blk.branch(a, 1, 2));
            f.block(1, |blk| {
                blk.assign_to(v, Expression::int(0));
                blk.nop();
                blk.jump(3);
            });
            f.block(2, |blk| {
                blk.assign_to(v, a);
                blk.jump(3);
            });
            f.block(3, |blk| blk.branch(v, 4, 5));
            f.block(4, |blk| blk.ret_val(Expression::int(10)));
            f.block(5, |blk| blk.ret_val(Expression::int(20)));
        })
}

/// Global side effects on both paths.
fn globals() -> Result<ControlFlowGraph> {
    CfgBuilder::new(MethodId::new(5), "globals")
        .arg("x", IrType::I32)
        .build_with(|f| {
            let x = f.arg(0);
            f.block(0, |blk| {
                let t = blk.copy(x);
                blk.store_global(GlobalId::new(0), t);
                let c = blk.compare(Condition::Gt, x, Expression::int(3));
                blk.branch(c, 1, 2);
            });
            f.block(1, |blk| {
                blk.store_global(GlobalId::new(1), Expression::int(1));
                blk.ret();
            });
            f.block(2, |blk| blk.ret());
        })
}

fn samples() -> Result<Vec<(ControlFlowGraph, usize)>> {
    Ok(vec![
        (max()?, 2),
        (sum_to()?, 1),
        (zero_test()?, 1),
        (negated_compare()?, 2),
        (merged_condition()?, 1),
        (globals()?, 1),
    ])
}

fn inputs(arity: usize) -> Vec<Vec<Value>> {
    let values = [-4, 0, 1, 3, 7];
    match arity {
        1 => values.iter().map(|&v| vec![Value::Int(v)]).collect(),
        _ => values
            .iter()
            .flat_map(|&a| values.iter().map(move |&b| vec![Value::Int(a), Value::Int(b)]))
            .collect(),
    }
}

#[test]
fn test_reduction_preserves_semantics() -> Result<()> {
    for (original, arity) in samples()? {
        let mut optimized = original.clone();
        let events = EventLog::new();
        let stats = TemporaryReduction::new().run(&mut optimized, &events)?;
        assert!(stats.changed(), "{} was not reduced", original.name());
        optimized.validate()?;

        for args in inputs(arity) {
            let expected = Interpreter::new().run(&original, &args)?;
            let actual = Interpreter::new().run(&optimized, &args)?;
            assert_eq!(
                expected.result,
                actual.result,
                "{} differs for {args:?}",
                original.name()
            );
            assert_eq!(expected.globals, actual.globals);
            assert!(actual.steps <= expected.steps);
        }
    }
    Ok(())
}

#[test]
fn test_reduction_terminates_within_bound() -> Result<()> {
    for (mut cfg, _) in samples()? {
        let bound = cfg.operator_count() + cfg.variable_count() + 1;
        let stats = TemporaryReduction::new().run(&mut cfg, &EventLog::new())?;
        assert!(stats.iterations <= bound);
    }
    Ok(())
}

#[test]
fn test_second_run_changes_nothing() -> Result<()> {
    for (mut cfg, _) in samples()? {
        TemporaryReduction::new().run(&mut cfg, &EventLog::new())?;
        let generation = cfg.generation();

        let events = EventLog::new();
        let stats = TemporaryReduction::new().run(&mut cfg, &events)?;
        assert!(!stats.changed(), "{} changed on the second run", cfg.name());
        assert!(events.is_empty());
        assert_eq!(cfg.generation(), generation);
    }
    Ok(())
}

#[test]
fn test_copy_of_redefined_source_is_kept() -> Result<()> {
    // t = x; x = 5; y = t + 1; return y
    let mut cfg = CfgBuilder::new(MethodId::new(0), "redefined")
        .arg("x", IrType::I32)
        .returns(IrType::I32)
        .build_with(|f| {
            let x = f.arg(0);
            f.block(0, |blk| {
                let t = blk.copy(x);
                blk.assign_to(x, Expression::int(5));
                let y = blk.add(t, Expression::int(1));
                blk.ret_val(y);
            });
        })?;
    let before: Vec<OperatorKind> = cfg.operators().map(|(_, op)| op.kind.clone()).collect();

    let events = EventLog::new();
    TemporaryReduction::new().run(&mut cfg, &events)?;

    let after: Vec<OperatorKind> = cfg.operators().map(|(_, op)| op.kind.clone()).collect();
    assert_eq!(before, after);
    assert_eq!(events.count(EventKind::CopyPropagated), 0);
    Ok(())
}

#[test]
fn test_copy_across_pointer_write_is_kept() -> Result<()> {
    // p = &x; t = x; *p = 5; y = t + 1; return y
    let mut cfg = CfgBuilder::new(MethodId::new(0), "aliased")
        .returns(IrType::I32)
        .build_with(|f| {
            let x = f.local("x", IrType::I32);
            f.block(0, |blk| {
                blk.assign_to(x, Expression::int(2));
                let p = blk.address_of(x);
                let t = blk.copy(x);
                blk.store(p, Expression::int(5));
                let y = blk.add(t, Expression::int(1));
                blk.ret_val(y);
            });
        })?;

    let events = EventLog::new();
    TemporaryReduction::new().run(&mut cfg, &events)?;
    assert_eq!(events.count(EventKind::CopyPropagated), 0);

    let result = Interpreter::new().run(&cfg, &[])?.result;
    assert_eq!(result, Some(Value::Int(3)));
    Ok(())
}

#[test]
fn test_cross_block_constant_resolves_branch() -> Result<()> {
    let original = merged_condition()?;
    let mut cfg = original.clone();
    let events = EventLog::new();
    TemporaryReduction::new().run(&mut cfg, &events)?;

    assert_eq!(events.count(EventKind::ConstantBranchPropagated), 1);
    assert_eq!(events.count(EventKind::BranchReplicated), 1);

    // the constant path jumps straight to the `return 20` block
    let before = Interpreter::new().run(&original, &[Value::Int(1)])?;
    let after = Interpreter::new().run(&cfg, &[Value::Int(1)])?;
    assert_eq!(after.result, Some(Value::Int(20)));
    assert_eq!(after.trace.len() + 1, before.trace.len());
    Ok(())
}
