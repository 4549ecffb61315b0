//! The type system of one compilation unit.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::{
    analysis::{CallDirection, CallsDatabase},
    ir::{FieldRef, IrType, MethodId, TypeId},
    typesystem::{
        layout::LayoutEngine, DataManager, FieldDefinition, MethodAnnotations, MethodFacts,
        MethodRecord, PlatformAbstraction, TypeDefinition, TypeKind, TypeLayout,
    },
    Error, Result,
};

/// Types, their layout, the data manager and the method table of a unit.
///
/// Layout is computed explicitly with [`layout_types`](Self::layout_types) and
/// stays valid until [`invalidate_layout`](Self::invalidate_layout), which also
/// marks data placements stale and drops method annotations derived alongside
/// the layout. Each successful layout run bumps the
/// [`layout_generation`](Self::layout_generation).
#[derive(Debug, Clone)]
pub struct TypeSystem {
    platform: PlatformAbstraction,
    types: BTreeMap<TypeId, TypeDefinition>,
    layouts: HashMap<TypeId, TypeLayout>,
    layout_alignment: u32,
    layout_valid: bool,
    layout_generation: u64,
    invalidations: usize,
    methods: BTreeMap<MethodId, MethodRecord>,
    data_manager: DataManager,
}

impl Default for TypeSystem {
    fn default() -> Self {
        Self::new(PlatformAbstraction::default())
    }
}

impl TypeSystem {
    /// Creates an empty type system for `platform`.
    #[must_use]
    pub fn new(platform: PlatformAbstraction) -> Self {
        TypeSystem {
            layout_alignment: platform.memory_alignment(),
            platform,
            types: BTreeMap::new(),
            layouts: HashMap::new(),
            layout_valid: false,
            layout_generation: 0,
            invalidations: 0,
            methods: BTreeMap::new(),
            data_manager: DataManager::new(),
        }
    }

    /// Returns the target platform.
    #[must_use]
    pub const fn platform(&self) -> &PlatformAbstraction {
        &self.platform
    }

    /// Registers a type and returns its id. Any existing layout becomes invalid.
    pub fn add_type(
        &mut self,
        name: impl Into<String>,
        kind: TypeKind,
        fields: Vec<FieldDefinition>,
    ) -> TypeId {
        let id = TypeId::new(self.types.len());
        self.types.insert(
            id,
            TypeDefinition {
                id,
                name: name.into(),
                kind,
                fields,
            },
        );
        if self.layout_valid {
            self.invalidate_layout();
        }
        id
    }

    /// Registers a struct with the given `(name, type)` fields.
    pub fn add_struct(&mut self, name: impl Into<String>, fields: &[(&str, IrType)]) -> TypeId {
        self.add_type(name, TypeKind::Struct, to_fields(fields))
    }

    /// Registers a class deriving from `base`.
    pub fn add_class(
        &mut self,
        name: impl Into<String>,
        base: Option<TypeId>,
        fields: &[(&str, IrType)],
    ) -> TypeId {
        self.add_type(name, TypeKind::Class { base }, to_fields(fields))
    }

    /// Returns a type definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] for unknown ids.
    pub fn definition(&self, id: TypeId) -> Result<&TypeDefinition> {
        self.types.get(&id).ok_or(Error::TypeNotFound(id))
    }

    /// Iterates all type definitions in id order.
    pub fn types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types.values()
    }

    /// Computes the layout of every concrete type.
    ///
    /// On failure the previous state is kept invalid; nothing is partially laid out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecursiveLayout`] for a struct that embeds itself,
    /// [`Error::TypeNotFound`] for references to unknown types, or
    /// [`Error::Invariant`] for a class deriving from a non-class.
    pub fn layout_types(&mut self, alignment: u32) -> Result<()> {
        let layouts = LayoutEngine::new(&self.types, &self.platform, alignment).run()?;

        self.layouts = layouts;
        self.layout_alignment = alignment.max(1);
        self.layout_valid = true;
        self.layout_generation += 1;
        debug!(
            types = self.layouts.len(),
            alignment = self.layout_alignment,
            generation = self.layout_generation,
            "type layout computed"
        );
        Ok(())
    }

    /// Discards the layout, data placements and method annotations.
    pub fn invalidate_layout(&mut self) {
        self.layouts.clear();
        self.layout_valid = false;
        self.invalidations += 1;
        self.data_manager.mark_stale();
        for record in self.methods.values_mut() {
            record.annotations = MethodAnnotations::empty();
        }
        debug!(invalidations = self.invalidations, "type layout invalidated");
    }

    /// Returns `true` between a successful layout and the next invalidation.
    #[must_use]
    pub const fn is_layout_valid(&self) -> bool {
        self.layout_valid
    }

    /// Returns the number of successful layout runs.
    #[must_use]
    pub const fn layout_generation(&self) -> u64 {
        self.layout_generation
    }

    /// Returns the number of times the layout was invalidated.
    #[must_use]
    pub const fn invalidation_count(&self) -> usize {
        self.invalidations
    }

    /// Returns the alignment used by the last layout run.
    #[must_use]
    pub const fn layout_alignment(&self) -> u32 {
        self.layout_alignment
    }

    /// Returns the layout of a concrete type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LayoutUnavailable`] if no valid layout exists or the type
    /// is not concrete, [`Error::TypeNotFound`] for unknown ids.
    pub fn layout_of(&self, id: TypeId) -> Result<&TypeLayout> {
        let def = self.definition(id)?;
        if !self.layout_valid {
            return Err(Error::LayoutUnavailable(format!(
                "layout of {} requested before layout_types",
                def.name
            )));
        }
        self.layouts
            .get(&id)
            .ok_or_else(|| Error::LayoutUnavailable(format!("{} has no layout", def.name)))
    }

    /// Returns the byte offset of `field` inside its owner.
    ///
    /// # Errors
    ///
    /// As [`layout_of`](Self::layout_of), plus [`Error::Invariant`] if the
    /// owner declares no such field.
    pub fn field_offset(&self, field: FieldRef) -> Result<u32> {
        self.layout_of(field.owner)?
            .field_offset(field.index)
            .ok_or_else(|| invariant_error!("{} has no field #{}", field.owner, field.index))
    }

    /// Returns the type of `field`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] or [`Error::Invariant`] for unknown fields.
    pub fn field_type(&self, field: FieldRef) -> Result<IrType> {
        self.definition(field.owner)?
            .fields
            .get(field.index as usize)
            .map(|f| f.ty)
            .ok_or_else(|| invariant_error!("{} has no field #{}", field.owner, field.index))
    }

    /// Returns the data manager.
    #[must_use]
    pub const fn data_manager(&self) -> &DataManager {
        &self.data_manager
    }

    /// Returns the data manager for registering objects.
    pub fn data_manager_mut(&mut self) -> &mut DataManager {
        &mut self.data_manager
    }

    /// Recomputes data placements from the current layout.
    ///
    /// # Errors
    ///
    /// See [`DataManager::refresh_values`].
    pub fn refresh_data_values(&mut self) -> Result<()> {
        let mut data = std::mem::take(&mut self.data_manager);
        let result = data.refresh_values(self);
        self.data_manager = data;
        result
    }

    /// Adds a method to the method table, keeping existing facts and annotations.
    pub fn declare_method(&mut self, id: MethodId, name: impl Into<String>) {
        self.methods.entry(id).or_insert_with(|| MethodRecord {
            id,
            name: name.into(),
            facts: MethodFacts::default(),
            annotations: MethodAnnotations::empty(),
        });
    }

    /// Returns a method record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MethodNotFound`] for undeclared methods.
    pub fn method(&self, id: MethodId) -> Result<&MethodRecord> {
        self.methods.get(&id).ok_or(Error::MethodNotFound(id))
    }

    /// Iterates the method table in id order.
    pub fn methods(&self) -> impl Iterator<Item = &MethodRecord> {
        self.methods.values()
    }

    /// Stores freshly scanned local facts of a method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MethodNotFound`] for undeclared methods.
    pub fn record_facts(&mut self, id: MethodId, facts: MethodFacts) -> Result<()> {
        self.methods
            .get_mut(&id)
            .ok_or(Error::MethodNotFound(id))?
            .facts = facts;
        Ok(())
    }

    /// Returns the current annotations of a method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MethodNotFound`] for undeclared methods.
    pub fn annotations_of(&self, id: MethodId) -> Result<MethodAnnotations> {
        Ok(self.method(id)?.annotations)
    }

    /// Computes the transitive closure of `db` in one direction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MethodNotFound`] if the database contains a method this
    /// type system never declared.
    pub fn flatten_calls_database(
        &self,
        db: &mut CallsDatabase,
        direction: CallDirection,
    ) -> Result<()> {
        if let Some(unknown) = db.methods().find(|m| !self.methods.contains_key(m)) {
            return Err(Error::MethodNotFound(unknown));
        }
        db.flatten(direction);
        Ok(())
    }

    /// Marks methods that never write global state, directly or through callees.
    ///
    /// Calls leaving the unit count as writes.
    ///
    /// # Returns
    ///
    /// The number of methods annotated thread-safe.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] unless `db` was flattened towards callers.
    pub fn annotate_thread_safe_methods(&mut self, db: &CallsDatabase) -> Result<usize> {
        self.annotate(db, MethodAnnotations::THREAD_SAFE, |f| f.writes_global)
    }

    /// Marks methods that never allocate, directly or through callees.
    ///
    /// Calls leaving the unit count as allocations.
    ///
    /// # Returns
    ///
    /// The number of methods annotated allocation-free.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] unless `db` was flattened towards callers.
    pub fn annotate_no_allocation_methods(&mut self, db: &CallsDatabase) -> Result<usize> {
        self.annotate(db, MethodAnnotations::NO_ALLOCATION, |f| f.allocates)
    }

    fn annotate(
        &mut self,
        db: &CallsDatabase,
        flag: MethodAnnotations,
        violates: impl Fn(&MethodFacts) -> bool,
    ) -> Result<usize> {
        if !db.is_flattened(CallDirection::Callers) {
            return Err(invariant_error!(
                "annotating {:?} needs the calls database flattened towards callers",
                flag
            ));
        }

        let mut cleared: BTreeSet<MethodId> = BTreeSet::new();
        for record in self.methods.values() {
            let calls_out = db
                .external_callees(record.id)
                .is_some_and(|callees| !callees.is_empty());
            if violates(&record.facts) || calls_out {
                cleared.insert(record.id);
                if let Some(callers) = db.transitive_callers(record.id) {
                    cleared.extend(callers.iter().copied());
                }
            }
        }

        let mut annotated = 0;
        for record in self.methods.values_mut() {
            if cleared.contains(&record.id) {
                record.annotations.remove(flag);
            } else {
                record.annotations.insert(flag);
                annotated += 1;
            }
        }
        debug!(?flag, annotated, cleared = cleared.len(), "methods annotated");
        Ok(annotated)
    }
}

fn to_fields(fields: &[(&str, IrType)]) -> Vec<FieldDefinition> {
    fields
        .iter()
        .map(|&(name, ty)| FieldDefinition {
            name: name.to_string(),
            ty,
        })
        .collect()
}
