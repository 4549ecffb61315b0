//! Global data objects and their placement in the data image.
//!
//! Every global of the compilation unit is backed by a data object whose size
//! depends on type layout. [`DataManager::refresh_values`] recomputes offsets
//! and sizes from the current layout; invalidating the layout marks them stale
//! until the next refresh.

use std::collections::BTreeMap;

use crate::{
    ir::{GlobalId, IrType},
    typesystem::{TypeKind, TypeSystem},
    Error, Result,
};

/// A global data object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataObject {
    /// Display name
    pub name: String,
    /// Stored type; struct types are stored inline, classes as a reference
    pub ty: IrType,
    placement: Option<(u32, u32)>,
}

impl DataObject {
    /// Returns `(offset, size)` in the data image, `None` while stale.
    #[must_use]
    pub const fn placement(&self) -> Option<(u32, u32)> {
        self.placement
    }
}

/// Owner of all global data objects.
#[derive(Debug, Clone, Default)]
pub struct DataManager {
    objects: BTreeMap<GlobalId, DataObject>,
    image_size: u32,
    stale: bool,
    refreshes: usize,
}

impl DataManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a global; its placement is unknown until the next refresh.
    pub fn add_object(&mut self, global: GlobalId, name: impl Into<String>, ty: IrType) {
        self.objects.insert(
            global,
            DataObject {
                name: name.into(),
                ty,
                placement: None,
            },
        );
        self.stale = true;
    }

    /// Returns a registered object.
    #[must_use]
    pub fn object(&self, global: GlobalId) -> Option<&DataObject> {
        self.objects.get(&global)
    }

    /// Returns the number of registered objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if no object is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Returns `true` if placements no longer match the layout.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        self.stale
    }

    /// Returns how many times placements have been recomputed.
    #[must_use]
    pub const fn refresh_count(&self) -> usize {
        self.refreshes
    }

    /// Returns the total data image size after the last refresh.
    #[must_use]
    pub const fn image_size(&self) -> u32 {
        self.image_size
    }

    /// Forgets all placements.
    pub fn mark_stale(&mut self) {
        for object in self.objects.values_mut() {
            object.placement = None;
        }
        self.image_size = 0;
        self.stale = true;
    }

    /// Returns the `(offset, size)` placement of a global.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LayoutUnavailable`] while placements are stale, or
    /// [`Error::Invariant`] if the global is not registered.
    pub fn placement_of(&self, global: GlobalId) -> Result<(u32, u32)> {
        let object = self
            .objects
            .get(&global)
            .ok_or_else(|| invariant_error!("{} has no data object", global))?;
        object
            .placement
            .filter(|_| !self.stale)
            .ok_or_else(|| Error::LayoutUnavailable(format!("placement of {}", object.name)))
    }

    /// Recomputes every object's offset and size from `types`' current layout.
    ///
    /// Objects are placed in id order, each aligned to its own alignment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LayoutUnavailable`] if `types` has no valid layout, or
    /// [`Error::TypeNotFound`] if an object names an unknown type.
    pub fn refresh_values(&mut self, types: &TypeSystem) -> Result<()> {
        if !types.is_layout_valid() {
            return Err(Error::LayoutUnavailable(
                "data objects need a type layout".to_string(),
            ));
        }

        let pointer_size = types.platform().pointer_size();
        let alignment = types.layout_alignment();
        let mut offset = 0u32;

        for object in self.objects.values_mut() {
            let (size, align) = match object.ty {
                IrType::Object(id) if types.definition(id)?.kind == TypeKind::Struct => {
                    let layout = types.layout_of(id)?;
                    (layout.size(), layout.alignment())
                }
                ty => {
                    let size = ty.size(pointer_size);
                    (size, size.clamp(1, alignment))
                }
            };
            offset = offset.div_ceil(align) * align;
            object.placement = Some((offset, size));
            offset += size;
        }

        self.image_size = offset;
        self.stale = false;
        self.refreshes += 1;
        Ok(())
    }
}
