//! Register allocation constraint collection.
//!
//! Walks each lowered method and records the calling-convention bindings the
//! register allocator has to honour:
//!
//! | Variable | Constraint |
//! |----------|------------|
//! | `i`-th method argument | [`ConstraintKind::IncomingArgument`] or [`ConstraintKind::StackArgument`] |
//! | `i`-th call argument | [`ConstraintKind::OutgoingArgument`] or [`ConstraintKind::StackArgument`] |
//! | call result, returned value | [`ConstraintKind::ReturnValue`] |
//! | address-taken variable | [`ConstraintKind::MemoryResident`] |
//!
//! Arguments beyond the platform's argument registers are passed in stack
//! slots numbered from 0. The phase only annotates; graphs are not mutated.

use std::fmt;

use tracing::debug;

use crate::{
    analysis::CacheKind,
    compiler::{CompilerContext, EventKind, Phase, PhaseTransition},
    ir::{ControlFlowGraph, Expression, OperatorId, OperatorKind, VarId},
    typesystem::Register,
    Result,
};

/// How a variable is bound for register allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// Arrives in this register on entry
    IncomingArgument(Register),
    /// Must be in this register at the call
    OutgoingArgument(Register),
    /// Passed in this stack slot
    StackArgument(usize),
    /// Produced in or returned through this register
    ReturnValue(Register),
    /// Must live in memory because its address is taken
    MemoryResident,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintKind::IncomingArgument(r) => write!(f, "incoming {r}"),
            ConstraintKind::OutgoingArgument(r) => write!(f, "outgoing {r}"),
            ConstraintKind::StackArgument(slot) => write!(f, "stack[{slot}]"),
            ConstraintKind::ReturnValue(r) => write!(f, "return {r}"),
            ConstraintKind::MemoryResident => f.write_str("memory"),
        }
    }
}

/// One constraint on a variable, optionally tied to the operator imposing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterConstraint {
    /// Call or return imposing the constraint; `None` for method-wide ones
    pub operator: Option<OperatorId>,
    /// Constrained variable
    pub variable: VarId,
    /// The binding
    pub kind: ConstraintKind,
}

/// Collects [`RegisterConstraint`]s for every method into
/// [`CompilerContext::constraints`].
pub struct CollectRegisterAllocationConstraints;

impl Phase for CollectRegisterAllocationConstraints {
    fn name(&self) -> &'static str {
        "CollectRegisterAllocationConstraints"
    }

    fn description(&self) -> &'static str {
        "Records calling-convention and memory-residency constraints for register allocation"
    }

    fn run(&mut self, ctx: &CompilerContext) -> Result<PhaseTransition> {
        let (registers, return_register) = {
            let types = ctx.types()?;
            let platform = types.platform();
            (
                platform.argument_registers().to_vec(),
                platform.return_register(),
            )
        };
        let convention = Convention {
            registers: &registers,
            return_register,
        };

        let events = &ctx.events;
        let constraints = &ctx.constraints;
        ctx.for_each_method(|method, cfg| {
            let collected = convention.collect(cfg)?;
            events
                .record(EventKind::ConstraintsCollected)
                .method(method)
                .message(format!("{} constraints", collected.len()));
            debug!(%method, constraints = collected.len(), "register constraints collected");
            constraints.insert(method, collected);
            Ok(false)
        })?;

        Ok(PhaseTransition::Next)
    }
}

struct Convention<'a> {
    registers: &'a [Register],
    return_register: Register,
}

impl Convention<'_> {
    fn argument(&self, index: usize, register: fn(Register) -> ConstraintKind) -> ConstraintKind {
        match self.registers.get(index) {
            Some(&r) => register(r),
            None => ConstraintKind::StackArgument(index - self.registers.len()),
        }
    }

    fn collect(&self, cfg: &mut ControlFlowGraph) -> Result<Vec<RegisterConstraint>> {
        let arguments = cfg.arguments().to_vec();
        let snapshot = cfg.acquire(CacheKind::VARIABLE_PROPERTIES)?;
        let tree = snapshot.tree()?;
        let properties = snapshot.properties()?;
        let cfg = snapshot.cfg();

        let mut out: Vec<RegisterConstraint> = arguments
            .iter()
            .enumerate()
            .map(|(i, &variable)| RegisterConstraint {
                operator: None,
                variable,
                kind: self.argument(i, ConstraintKind::IncomingArgument),
            })
            .collect();

        for &op in tree.operators() {
            let Some(operator) = cfg.operator(op) else {
                continue;
            };
            match &operator.kind {
                OperatorKind::Call { dest, args, .. } => {
                    for (i, arg) in args.iter().enumerate() {
                        if let Expression::Var(variable) = arg {
                            out.push(RegisterConstraint {
                                operator: Some(op),
                                variable: *variable,
                                kind: self.argument(i, ConstraintKind::OutgoingArgument),
                            });
                        }
                    }
                    if let Some(variable) = dest {
                        out.push(RegisterConstraint {
                            operator: Some(op),
                            variable: *variable,
                            kind: ConstraintKind::ReturnValue(self.return_register),
                        });
                    }
                }
                OperatorKind::Return {
                    value: Some(Expression::Var(variable)),
                } => out.push(RegisterConstraint {
                    operator: Some(op),
                    variable: *variable,
                    kind: ConstraintKind::ReturnValue(self.return_register),
                }),
                _ => {}
            }
        }

        out.extend(properties.address_taken().map(|variable| RegisterConstraint {
            operator: None,
            variable,
            kind: ConstraintKind::MemoryResident,
        }));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{CfgBuilder, IrType, MethodId},
        typesystem::{PlatformAbstraction, TypeSystem},
    };

    #[test]
    fn test_collects_calling_convention() {
        let ctx = CompilerContext::new(TypeSystem::new(PlatformAbstraction::embedded32()));
        let mut builder = CfgBuilder::new(MethodId::new(0), "six").returns(IrType::I32);
        for name in ["a", "b", "c", "d", "e", "f"] {
            builder = builder.arg(name, IrType::I32);
        }
        let cfg = builder
            .build_with(|f| {
                let args: Vec<VarId> = (0..6).map(|i| f.arg(i)).collect();
                let local = f.local("buf", IrType::I32);
                f.block(0, |b| {
                    b.assign_to(local, args[0]);
                    let p = b.address_of(local);
                    b.store(p, args[1]);
                    let call_args: Vec<Expression> =
                        args.iter().rev().map(|&v| Expression::Var(v)).collect();
                    let r = b.call(MethodId::new(1), &call_args, IrType::I32);
                    b.ret_val(r);
                });
            })
            .unwrap();
        ctx.add_method(cfg).unwrap();

        let before = ctx.with_method(MethodId::new(0), |cfg| cfg.generation()).unwrap();
        CollectRegisterAllocationConstraints.run(&ctx).unwrap();
        let after = ctx.with_method(MethodId::new(0), |cfg| cfg.generation()).unwrap();
        assert_eq!(before, after);

        let constraints = ctx.constraints.get(&MethodId::new(0)).unwrap();
        let kinds = |kind: fn(&ConstraintKind) -> bool| {
            constraints.iter().filter(|c| kind(&c.kind)).count()
        };
        assert_eq!(kinds(|k| matches!(k, ConstraintKind::IncomingArgument(_))), 4);
        assert_eq!(kinds(|k| matches!(k, ConstraintKind::OutgoingArgument(_))), 4);
        // two incoming and two outgoing stack slots
        assert_eq!(kinds(|k| matches!(k, ConstraintKind::StackArgument(_))), 4);
        // the call result, then the same value returned
        assert_eq!(kinds(|k| matches!(k, ConstraintKind::ReturnValue(_))), 2);
        assert_eq!(kinds(|k| matches!(k, ConstraintKind::MemoryResident)), 1);

        let f = constraints
            .iter()
            .find(|c| c.operator.is_none() && c.kind == ConstraintKind::StackArgument(1))
            .unwrap();
        assert_eq!(f.variable, VarId::new(5));
        assert_eq!(ctx.events.count(EventKind::ConstraintsCollected), 1);
    }
}
