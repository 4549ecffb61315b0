//! Lowering of symbolic field accesses.
//!
//! ```text
//! v2 = v0.f1          t = v0 + 4
//!                     v2 = *t
//! v0.f1 = v1    =>    t' = v0 + 4
//!                     *t' = v1
//! ```
//!
//! Offsets come from the current type layout. A field at offset 0 is accessed
//! through the object reference directly.

use tracing::debug;

use crate::{
    compiler::{CompilerContext, EventKind, EventLog, IrLevel, Phase, PhaseTransition},
    ir::{BinaryOp, ControlFlowGraph, Expression, FieldRef, IrType, OperatorId, OperatorKind},
    typesystem::TypeSystem,
    Error, Result,
};

/// Rewrites `LoadField`/`StoreField` into address arithmetic plus `Load`/`Store`.
///
/// Needs a valid layout and raises the IR to [`IrLevel::ScalarValues`].
pub struct ExpandFieldAccesses;

impl Phase for ExpandFieldAccesses {
    fn name(&self) -> &'static str {
        "ExpandFieldAccesses"
    }

    fn description(&self) -> &'static str {
        "Lowers field loads and stores to pointer arithmetic using the type layout"
    }

    fn run(&mut self, ctx: &CompilerContext) -> Result<PhaseTransition> {
        let guard = ctx.types()?;
        if !guard.is_layout_valid() {
            return Err(Error::LayoutUnavailable(
                "field accesses cannot be lowered before LayoutTypes".to_string(),
            ));
        }

        let types = &*guard;
        let events = &ctx.events;
        ctx.for_each_method(|_, cfg| Ok(lower_field_accesses(cfg, types, events)? > 0))?;
        drop(guard);

        ctx.raise_ir_level(IrLevel::ScalarValues);
        Ok(PhaseTransition::Next)
    }
}

/// Lowers every field access of `cfg` and returns how many were rewritten.
///
/// # Errors
///
/// Returns [`Error::LayoutUnavailable`] or [`Error::Invariant`] if a field
/// cannot be resolved against `types`.
pub fn lower_field_accesses(
    cfg: &mut ControlFlowGraph,
    types: &TypeSystem,
    events: &EventLog,
) -> Result<usize> {
    let accesses: Vec<OperatorId> = cfg
        .operators()
        .filter(|(_, op)| op.kind.is_field_access())
        .map(|(id, _)| id)
        .collect();

    for &op in &accesses {
        let kind = cfg
            .operator(op)
            .map(|o| o.kind.clone())
            .ok_or_else(|| invariant_error!("{} vanished during field lowering", op))?;

        let lowered = match kind {
            OperatorKind::LoadField {
                dest,
                object,
                field,
            } => OperatorKind::Load {
                dest,
                address: field_address(cfg, op, object, field, types)?,
            },
            OperatorKind::StoreField {
                object,
                field,
                value,
            } => OperatorKind::Store {
                address: field_address(cfg, op, object, field, types)?,
                value,
            },
            _ => continue,
        };

        let old = cfg.replace_operator(op, lowered)?;
        events
            .record(EventKind::FieldAccessLowered)
            .method(cfg.method())
            .message(format!("{old}"));
    }

    if !accesses.is_empty() {
        debug!(method = %cfg.method(), lowered = accesses.len(), "field accesses lowered");
    }
    Ok(accesses.len())
}

/// Materializes `object + offset(field)` in front of `anchor`.
fn field_address(
    cfg: &mut ControlFlowGraph,
    anchor: OperatorId,
    object: Expression,
    field: FieldRef,
    types: &TypeSystem,
) -> Result<Expression> {
    let offset = types.field_offset(field)?;
    if offset == 0 {
        return Ok(object);
    }

    let address = cfg.add_temporary(IrType::Pointer);
    cfg.insert_before(
        anchor,
        OperatorKind::Binary {
            dest: address,
            op: BinaryOp::Add,
            signed: false,
            left: object,
            right: Expression::int(i64::from(offset)),
        },
    )?;
    Ok(Expression::Var(address))
}
