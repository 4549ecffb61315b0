//! Deterministic reference evaluator for method bodies.
//!
//! The interpreter gives every operator a precise meaning so transformations
//! can be checked for semantic equivalence: run a method before and after a
//! pass with the same inputs and compare the [`Execution`]s.
//!
//! # Memory model
//!
//! - Each variable has one slot in the frame. `AddressOf` yields a pointer to
//!   that slot; `Load`/`Store` through it read and write the variable.
//! - `Alloc` creates a fresh heap object. Fields live at byte offsets inside the
//!   object; the offset of a [`FieldRef`] comes from a caller-supplied function
//!   (by default `index * 8`), which lets lowered and unlowered field accesses
//!   agree when the function matches the computed layout.
//! - Globals default to zero and are reported in the result.
//! - Calls are delegated to a caller-supplied handler.

use std::collections::{BTreeMap, HashMap};

use crate::{
    ir::{
        BinaryOp, BlockId, Condition, ConstValue, ControlFlowGraph, Expression, FieldRef,
        GlobalId, MethodId, OperatorKind, VarId,
    },
    Error, Result,
};

/// Default bound on executed operators.
pub const DEFAULT_STEP_LIMIT: usize = 100_000;

/// Storage a pointer refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {
    /// A variable slot of the running frame
    Var(VarId),
    /// A heap object, numbered in allocation order
    Object(usize),
}

/// A runtime value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// Integer or boolean (0/1)
    Int(i64),
    /// Floating-point number
    Float(f64),
    /// Pointer into a variable slot or heap object
    Ptr {
        /// Referenced storage.
        base: Location,
        /// Byte offset inside the storage.
        offset: i64,
    },
    /// The null reference
    Null,
}

impl Value {
    fn from_const(value: &ConstValue) -> Self {
        match value {
            ConstValue::Int(v) => Value::Int(*v),
            ConstValue::Bool(b) => Value::Int(i64::from(*b)),
            ConstValue::Float(f) => Value::Float(*f),
            ConstValue::Null => Value::Null,
        }
    }

    /// Returns `true` if a binary conditional branch on this value is taken.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(v) => *v != 0,
            Value::Float(f) => *f != 0.0,
            Value::Ptr { .. } => true,
            Value::Null => false,
        }
    }

    fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::Null => Ok(0),
            other => Err(Error::Evaluation(format!("expected integer, found {other:?}"))),
        }
    }
}

/// Outcome of running a method.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// The returned value, `None` for `return` without a value.
    pub result: Option<Value>,
    /// Blocks entered, in order.
    pub trace: Vec<BlockId>,
    /// Final values of every global that was written.
    pub globals: BTreeMap<GlobalId, Value>,
    /// Every call performed, with evaluated arguments.
    pub calls: Vec<(MethodId, Vec<Value>)>,
    /// Number of operators executed.
    pub steps: usize,
}

type CallHandler<'a> = Box<dyn FnMut(MethodId, &[Value]) -> Result<Option<Value>> + 'a>;
type FieldOffsets<'a> = Box<dyn Fn(FieldRef) -> i64 + 'a>;

/// Reference interpreter over a [`ControlFlowGraph`].
pub struct Interpreter<'a> {
    step_limit: usize,
    calls: Option<CallHandler<'a>>,
    field_offsets: FieldOffsets<'a>,
}

impl Default for Interpreter<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Interpreter<'a> {
    /// Creates an interpreter with the default step limit and no call handler.
    #[must_use]
    pub fn new() -> Self {
        Interpreter {
            step_limit: DEFAULT_STEP_LIMIT,
            calls: None,
            field_offsets: Box::new(|field| i64::from(field.index) * 8),
        }
    }

    /// Sets the maximum number of operators a run may execute.
    #[must_use]
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    /// Installs the handler invoked for every `Call` operator.
    #[must_use]
    pub fn with_calls<F>(mut self, handler: F) -> Self
    where
        F: FnMut(MethodId, &[Value]) -> Result<Option<Value>> + 'a,
    {
        self.calls = Some(Box::new(handler));
        self
    }

    /// Installs the function mapping fields to byte offsets.
    #[must_use]
    pub fn with_field_offsets<F>(mut self, offsets: F) -> Self
    where
        F: Fn(FieldRef) -> i64 + 'a,
    {
        self.field_offsets = Box::new(offsets);
        self
    }

    /// Runs `cfg` with the given argument values.
    ///
    /// # Errors
    ///
    /// - [`Error::ExecutionLimit`] if the step limit is exceeded
    /// - [`Error::Evaluation`] on reads of undefined variables, type mismatches,
    ///   division by zero, invalid pointers or calls without a handler
    /// - [`Error::Invariant`] if control reaches a block without a terminator
    pub fn run(&mut self, cfg: &ControlFlowGraph, args: &[Value]) -> Result<Execution> {
        let mut frame = Frame {
            vars: vec![None; cfg.variable_count()],
            heap: HashMap::new(),
            objects: 0,
            globals: BTreeMap::new(),
        };

        if args.len() != cfg.arguments().len() {
            return Err(Error::Evaluation(format!(
                "{} expects {} arguments, got {}",
                cfg.name(),
                cfg.arguments().len(),
                args.len()
            )));
        }
        for (var, value) in cfg.arguments().iter().zip(args) {
            frame.vars[var.index()] = Some(*value);
        }

        let mut block = cfg
            .entry()
            .ok_or_else(|| invariant_error!("{} has no entry block", cfg.name()))?;
        let mut trace = Vec::new();
        let mut calls = Vec::new();
        let mut steps = 0usize;

        loop {
            trace.push(block);
            let ops = cfg
                .block(block)
                .ok_or_else(|| invariant_error!("control reached removed block {}", block))?
                .operators();

            let mut next = None;
            for &op in ops {
                steps += 1;
                if steps > self.step_limit {
                    return Err(Error::ExecutionLimit(self.step_limit));
                }

                let operator = cfg
                    .operator(op)
                    .ok_or_else(|| invariant_error!("{} listed in {} is dead", op, block))?;
                match self.step(&mut frame, &operator.kind, &mut calls)? {
                    Flow::Continue => {}
                    Flow::Goto(target) => {
                        next = Some(target);
                        break;
                    }
                    Flow::Return(result) => {
                        return Ok(Execution {
                            result,
                            trace,
                            globals: frame.globals,
                            calls,
                            steps,
                        });
                    }
                }
            }

            block = next.ok_or_else(|| invariant_error!("{} falls off its end", block))?;
        }
    }

    fn step(
        &mut self,
        frame: &mut Frame,
        kind: &OperatorKind,
        calls: &mut Vec<(MethodId, Vec<Value>)>,
    ) -> Result<Flow> {
        match kind {
            OperatorKind::Assign { dest, src } => {
                let v = frame.eval(src)?;
                frame.set(*dest, v);
            }
            OperatorKind::ZeroExtend { dest, src, bits } => {
                let v = frame.eval(src)?.as_int()?;
                #[allow(clippy::cast_possible_wrap)]
                let masked = if *bits >= 64 {
                    v
                } else {
                    v & (((1u64 << bits) - 1) as i64)
                };
                frame.set(*dest, Value::Int(masked));
            }
            OperatorKind::Binary {
                dest,
                op,
                signed,
                left,
                right,
            } => {
                let l = frame.eval(left)?;
                let r = frame.eval(right)?;
                let v = match (l, r) {
                    (Value::Float(a), Value::Float(b)) => Value::Float(match op {
                        BinaryOp::Add => a + b,
                        BinaryOp::Sub => a - b,
                        BinaryOp::Mul => a * b,
                        BinaryOp::Div => a / b,
                        _ => {
                            return Err(Error::Evaluation(format!("'{op}' on floats")));
                        }
                    }),
                    (Value::Ptr { base, offset }, other) | (other, Value::Ptr { base, offset })
                        if matches!(op, BinaryOp::Add) =>
                    {
                        Value::Ptr {
                            base,
                            offset: offset.wrapping_add(other.as_int()?),
                        }
                    }
                    (Value::Ptr { base, offset }, other)
                        if matches!(op, BinaryOp::Sub) =>
                    {
                        Value::Ptr {
                            base,
                            offset: offset.wrapping_sub(other.as_int()?),
                        }
                    }
                    (a, b) => Value::Int(
                        op.evaluate(a.as_int()?, b.as_int()?, *signed)
                            .ok_or_else(|| Error::Evaluation("division by zero".to_string()))?,
                    ),
                };
                frame.set(*dest, v);
            }
            OperatorKind::CompareAndSet {
                dest,
                cond,
                signed,
                left,
                right,
            } => {
                let holds = compare(*cond, *signed, frame.eval(left)?, frame.eval(right)?)?;
                frame.set(*dest, Value::Int(i64::from(holds)));
            }
            OperatorKind::AddressOf { dest, target } => {
                frame.set(
                    *dest,
                    Value::Ptr {
                        base: Location::Var(*target),
                        offset: 0,
                    },
                );
            }
            OperatorKind::Load { dest, address } => {
                let ptr = frame.eval(address)?;
                let v = frame.read(ptr)?;
                frame.set(*dest, v);
            }
            OperatorKind::Store { address, value } => {
                let ptr = frame.eval(address)?;
                let v = frame.eval(value)?;
                frame.write(ptr, v)?;
            }
            OperatorKind::LoadField {
                dest,
                object,
                field,
            } => {
                let ptr = offset_by(frame.eval(object)?, (self.field_offsets)(*field))?;
                let v = frame.read(ptr)?;
                frame.set(*dest, v);
            }
            OperatorKind::StoreField {
                object,
                field,
                value,
            } => {
                let ptr = offset_by(frame.eval(object)?, (self.field_offsets)(*field))?;
                let v = frame.eval(value)?;
                frame.write(ptr, v)?;
            }
            OperatorKind::LoadGlobal { dest, global } => {
                let v = frame.globals.get(global).copied().unwrap_or(Value::Int(0));
                frame.set(*dest, v);
            }
            OperatorKind::StoreGlobal { global, value } => {
                let v = frame.eval(value)?;
                frame.globals.insert(*global, v);
            }
            OperatorKind::Alloc { dest, .. } => {
                let id = frame.objects;
                frame.objects += 1;
                frame.set(
                    *dest,
                    Value::Ptr {
                        base: Location::Object(id),
                        offset: 0,
                    },
                );
            }
            OperatorKind::Call { dest, method, args } => {
                let values = args
                    .iter()
                    .map(|a| frame.eval(a))
                    .collect::<Result<Vec<_>>>()?;
                let handler = self.calls.as_mut().ok_or_else(|| {
                    Error::Evaluation(format!("call to {method} without a call handler"))
                })?;
                let result = (*handler)(*method, &values)?;
                calls.push((*method, values));
                if let Some(dest) = dest {
                    let v = result.ok_or_else(|| {
                        Error::Evaluation(format!("{method} returned no value"))
                    })?;
                    frame.set(*dest, v);
                }
            }
            OperatorKind::Nop => {}
            OperatorKind::Jump { target } => return Ok(Flow::Goto(*target)),
            OperatorKind::Branch {
                cond,
                taken,
                not_taken,
            } => {
                let target = if frame.eval(cond)?.is_truthy() {
                    *taken
                } else {
                    *not_taken
                };
                return Ok(Flow::Goto(target));
            }
            OperatorKind::CompareBranch {
                cond,
                signed,
                left,
                right,
                taken,
                not_taken,
            } => {
                let holds = compare(*cond, *signed, frame.eval(left)?, frame.eval(right)?)?;
                return Ok(Flow::Goto(if holds { *taken } else { *not_taken }));
            }
            OperatorKind::Return { value } => {
                let v = value.as_ref().map(|e| frame.eval(e)).transpose()?;
                return Ok(Flow::Return(v));
            }
        }
        Ok(Flow::Continue)
    }
}

enum Flow {
    Continue,
    Goto(BlockId),
    Return(Option<Value>),
}

struct Frame {
    vars: Vec<Option<Value>>,
    heap: HashMap<(usize, i64), Value>,
    objects: usize,
    globals: BTreeMap<GlobalId, Value>,
}

impl Frame {
    fn eval(&self, expr: &Expression) -> Result<Value> {
        match expr {
            Expression::Const(c) => Ok(Value::from_const(c)),
            Expression::Var(v) => self
                .vars
                .get(v.index())
                .copied()
                .flatten()
                .ok_or_else(|| Error::Evaluation(format!("read of undefined variable {v}"))),
        }
    }

    fn set(&mut self, var: VarId, value: Value) {
        if let Some(slot) = self.vars.get_mut(var.index()) {
            *slot = Some(value);
        }
    }

    fn read(&self, ptr: Value) -> Result<Value> {
        match ptr {
            Value::Ptr {
                base: Location::Var(v),
                offset: 0,
            } => self.eval(&Expression::Var(v)),
            Value::Ptr {
                base: Location::Object(o),
                offset,
            } => Ok(self.heap.get(&(o, offset)).copied().unwrap_or(Value::Int(0))),
            other => Err(Error::Evaluation(format!("load through {other:?}"))),
        }
    }

    fn write(&mut self, ptr: Value, value: Value) -> Result<()> {
        match ptr {
            Value::Ptr {
                base: Location::Var(v),
                offset: 0,
            } => {
                self.set(v, value);
                Ok(())
            }
            Value::Ptr {
                base: Location::Object(o),
                offset,
            } => {
                self.heap.insert((o, offset), value);
                Ok(())
            }
            other => Err(Error::Evaluation(format!("store through {other:?}"))),
        }
    }
}

fn offset_by(ptr: Value, delta: i64) -> Result<Value> {
    match ptr {
        Value::Ptr { base, offset } => Ok(Value::Ptr {
            base,
            offset: offset.wrapping_add(delta),
        }),
        other => Err(Error::Evaluation(format!("field access on {other:?}"))),
    }
}

#[allow(clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn compare(cond: Condition, signed: bool, left: Value, right: Value) -> Result<bool> {
    match (left, right) {
        (Value::Float(a), Value::Float(b)) => Ok(cond.evaluate(a, b)),
        (Value::Float(a), b) => Ok(cond.evaluate(a, b.as_int()? as f64)),
        (a, Value::Float(b)) => Ok(cond.evaluate(a.as_int()? as f64, b)),
        (Value::Ptr { .. }, _) | (_, Value::Ptr { .. }) => {
            let key = |v: Value| match v {
                Value::Ptr { base, offset } => Some((base, offset)),
                _ => None,
            };
            Ok(cond.evaluate(key(left), key(right)))
        }
        (a, b) => {
            let (a, b) = (a.as_int()?, b.as_int()?);
            Ok(if signed {
                cond.evaluate(a, b)
            } else {
                cond.evaluate(a as u64, b as u64)
            })
        }
    }
}
