//! Shared state of one compilation unit.

use std::sync::{
    atomic::{AtomicU8, Ordering},
    RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use dashmap::DashMap;
use rayon::prelude::*;

use crate::{
    analysis::CallsDatabase,
    compiler::{EventLog, IrLevel, RegisterConstraint},
    config::PipelineConfig,
    ir::{ControlFlowGraph, MethodId},
    typesystem::TypeSystem,
    Error, Result,
};

/// Everything the phases of one compilation unit share.
///
/// Method bodies live in a `DashMap` so per-method phase work can run on the
/// rayon pool: a worker removes a method's graph, owns it exclusively while
/// transforming it, and reinserts it. Unit-wide state (types, calls database)
/// sits behind `RwLock`s and is only written by unit-level phases.
pub struct CompilerContext {
    /// Method bodies, one graph per method.
    pub methods: DashMap<MethodId, ControlFlowGraph>,

    /// Register allocation constraints, filled by the constraint collector.
    pub constraints: DashMap<MethodId, Vec<RegisterConstraint>>,

    /// Accumulated events from all phases.
    pub events: EventLog,

    /// Pipeline configuration.
    pub config: PipelineConfig,

    types: RwLock<TypeSystem>,
    calls: RwLock<Option<CallsDatabase>>,
    level: AtomicU8,
}

impl CompilerContext {
    /// Creates a context with default configuration at [`IrLevel::ConcreteTypes`].
    #[must_use]
    pub fn new(types: TypeSystem) -> Self {
        Self::with_config(types, PipelineConfig::default())
    }

    /// Creates a context with custom configuration.
    #[must_use]
    pub fn with_config(types: TypeSystem, config: PipelineConfig) -> Self {
        Self {
            methods: DashMap::new(),
            constraints: DashMap::new(),
            events: EventLog::new(),
            config,
            types: RwLock::new(types),
            calls: RwLock::new(None),
            level: AtomicU8::new(IrLevel::ConcreteTypes as u8),
        }
    }

    /// Adds a method body and declares it in the type system's method table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockError`] if the type system lock is poisoned.
    pub fn add_method(&self, cfg: ControlFlowGraph) -> Result<()> {
        self.types_mut()?.declare_method(cfg.method(), cfg.name());
        self.methods.insert(cfg.method(), cfg);
        Ok(())
    }

    /// Removes and returns a method body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MethodNotFound`] if the method has no body.
    pub fn take_method(&self, method: MethodId) -> Result<ControlFlowGraph> {
        self.methods
            .remove(&method)
            .map(|(_, cfg)| cfg)
            .ok_or(Error::MethodNotFound(method))
    }

    /// Returns all methods with a body, in id order.
    #[must_use]
    pub fn method_ids(&self) -> Vec<MethodId> {
        let mut ids: Vec<MethodId> = self.methods.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Runs `f` on one method body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MethodNotFound`] if the method has no body.
    pub fn with_method<R>(&self, method: MethodId, f: impl FnOnce(&ControlFlowGraph) -> R) -> Result<R> {
        self.methods
            .get(&method)
            .map(|cfg| f(&cfg))
            .ok_or(Error::MethodNotFound(method))
    }

    /// Runs `f` on every method body, in parallel unless disabled by configuration.
    ///
    /// Each invocation owns its graph exclusively. Returns `true` if any
    /// invocation reported a change.
    ///
    /// # Errors
    ///
    /// Returns the first error in method-id order; every method is still
    /// processed and reinserted.
    pub fn for_each_method<F>(&self, f: F) -> Result<bool>
    where
        F: Fn(MethodId, &mut ControlFlowGraph) -> Result<bool> + Send + Sync,
    {
        let ids = self.method_ids();
        let process = |method: &MethodId| -> Result<bool> {
            // Remove (brief lock), transform with no lock held, reinsert
            let Some((_, mut cfg)) = self.methods.remove(method) else {
                return Ok(false);
            };
            let result = f(*method, &mut cfg);
            self.methods.insert(*method, cfg);
            result
        };

        let results: Vec<Result<bool>> = if self.config.parallel {
            ids.par_iter().map(process).collect()
        } else {
            ids.iter().map(process).collect()
        };

        let mut changed = false;
        for result in results {
            changed |= result?;
        }
        Ok(changed)
    }

    /// Returns read access to the type system.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockError`] if the lock is poisoned.
    pub fn types(&self) -> Result<RwLockReadGuard<'_, TypeSystem>> {
        self.types.read().map_err(|_| Error::LockError)
    }

    /// Returns write access to the type system.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockError`] if the lock is poisoned.
    pub fn types_mut(&self) -> Result<RwLockWriteGuard<'_, TypeSystem>> {
        self.types.write().map_err(|_| Error::LockError)
    }

    /// Returns the current calls database, if one has been built.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockError`] if the lock is poisoned.
    pub fn calls_database(&self) -> Result<RwLockReadGuard<'_, Option<CallsDatabase>>> {
        self.calls.read().map_err(|_| Error::LockError)
    }

    /// Replaces the calls database; `None` discards it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockError`] if the lock is poisoned.
    pub fn set_calls_database(&self, db: Option<CallsDatabase>) -> Result<()> {
        *self.calls.write().map_err(|_| Error::LockError)? = db;
        Ok(())
    }

    /// Returns the current IR level.
    #[must_use]
    pub fn ir_level(&self) -> IrLevel {
        IrLevel::from_repr(self.level.load(Ordering::Acquire)).unwrap_or(IrLevel::Lowest)
    }

    /// Sets the IR level, e.g. to describe the front-end's output.
    pub fn set_ir_level(&self, level: IrLevel) {
        self.level.store(level as u8, Ordering::Release);
    }

    /// Raises the IR level; a lower `level` is ignored.
    pub fn raise_ir_level(&self, level: IrLevel) {
        self.level.fetch_max(level as u8, Ordering::AcqRel);
    }
}
