//! Type definitions and memory layout computation.
//!
//! Value types (primitives and structs) are stored inline; a field of struct
//! type embeds the whole struct. Classes are heap objects: fields of class
//! type hold a pointer, and an instance starts with the platform's object
//! header followed by the fields of its base classes.
//!
//! Every field is aligned to its natural alignment capped at the layout's
//! memory alignment, and every type's size is rounded up to its own alignment.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{
    ir::{IrType, TypeId},
    typesystem::PlatformAbstraction,
    Error, Result,
};

/// What kind of type a definition describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// A scalar value type
    Primitive(IrType),
    /// A value type with fields, stored inline
    Struct,
    /// A reference type, optionally deriving from another class
    Class {
        /// Base class, `None` for a root class
        base: Option<TypeId>,
    },
    /// A generic type with unbound parameters; has no layout
    OpenGeneric,
}

/// A field declared directly on a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    /// Field name
    pub name: String,
    /// Declared type
    pub ty: IrType,
}

/// A type registered with the type system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefinition {
    /// Identifier
    pub id: TypeId,
    /// Display name
    pub name: String,
    /// Kind
    pub kind: TypeKind,
    /// Fields declared on this type, excluding inherited ones
    pub fields: Vec<FieldDefinition>,
}

impl TypeDefinition {
    /// Returns `true` if the type can be laid out.
    #[must_use]
    pub const fn is_concrete(&self) -> bool {
        !matches!(self.kind, TypeKind::OpenGeneric)
    }

    /// Returns `true` for primitives and structs.
    #[must_use]
    pub const fn is_value_type(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(_) | TypeKind::Struct)
    }
}

/// Computed memory layout of one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeLayout {
    size: u32,
    alignment: u32,
    field_offsets: Vec<u32>,
}

impl TypeLayout {
    /// Returns the instance size in bytes, header included for classes.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Returns the alignment in bytes.
    #[must_use]
    pub const fn alignment(&self) -> u32 {
        self.alignment
    }

    /// Returns the byte offset of the `index`-th declared field.
    #[must_use]
    pub fn field_offset(&self, index: u32) -> Option<u32> {
        self.field_offsets.get(index as usize).copied()
    }

    /// Returns the offsets of all declared fields.
    #[must_use]
    pub fn field_offsets(&self) -> &[u32] {
        &self.field_offsets
    }
}

const fn align_up(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

/// Memoizing layout computation over a set of definitions.
pub(crate) struct LayoutEngine<'a> {
    types: &'a BTreeMap<TypeId, TypeDefinition>,
    platform: &'a PlatformAbstraction,
    alignment: u32,
    done: HashMap<TypeId, TypeLayout>,
    active: HashSet<TypeId>,
}

impl<'a> LayoutEngine<'a> {
    pub(crate) fn new(
        types: &'a BTreeMap<TypeId, TypeDefinition>,
        platform: &'a PlatformAbstraction,
        alignment: u32,
    ) -> Self {
        LayoutEngine {
            types,
            platform,
            alignment: alignment.max(1),
            done: HashMap::new(),
            active: HashSet::new(),
        }
    }

    /// Lays out every concrete type.
    pub(crate) fn run(mut self) -> Result<HashMap<TypeId, TypeLayout>> {
        for (id, def) in self.types {
            if def.is_concrete() {
                self.layout(*id)?;
            }
        }
        Ok(self.done)
    }

    fn definition(&self, id: TypeId) -> Result<&'a TypeDefinition> {
        self.types.get(&id).ok_or(Error::TypeNotFound(id))
    }

    fn scalar(&self, ty: IrType) -> (u32, u32) {
        let size = ty.size(self.platform.pointer_size());
        (size, size.clamp(1, self.alignment))
    }

    /// Size and alignment of a field of type `ty`.
    fn storage(&mut self, ty: IrType) -> Result<(u32, u32)> {
        if let IrType::Object(id) = ty {
            if self.definition(id)?.kind == TypeKind::Struct {
                let inner = self.layout(id)?;
                return Ok((inner.size, inner.alignment));
            }
        }
        Ok(self.scalar(ty))
    }

    fn layout(&mut self, id: TypeId) -> Result<TypeLayout> {
        if let Some(done) = self.done.get(&id) {
            return Ok(done.clone());
        }
        if !self.active.insert(id) {
            return Err(Error::RecursiveLayout(id));
        }

        let def = self.definition(id)?;
        let (mut offset, mut alignment) = match def.kind {
            TypeKind::Primitive(ty) => self.scalar(ty),
            TypeKind::Struct => (0, 1),
            TypeKind::Class { base: Some(base) } => {
                match self.definition(base)?.kind {
                    TypeKind::Class { .. } => {}
                    _ => {
                        return Err(invariant_error!(
                            "{} derives from non-class {}",
                            def.name,
                            base
                        ))
                    }
                }
                let base_layout = self.layout(base)?;
                (base_layout.size, base_layout.alignment)
            }
            TypeKind::Class { base: None } => (
                self.platform.object_header_size(),
                self.platform.pointer_size().clamp(1, self.alignment),
            ),
            TypeKind::OpenGeneric => {
                return Err(Error::LayoutUnavailable(format!(
                    "{} is an open generic type",
                    def.name
                )))
            }
        };

        let mut field_offsets = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            let (size, field_alignment) = self.storage(field.ty)?;
            offset = align_up(offset, field_alignment);
            field_offsets.push(offset);
            offset += size;
            alignment = alignment.max(field_alignment);
        }

        let layout = TypeLayout {
            size: align_up(offset, alignment),
            alignment,
            field_offsets,
        };

        self.active.remove(&id);
        self.done.insert(id, layout.clone());
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, ty: IrType) -> FieldDefinition {
        FieldDefinition {
            name: name.to_string(),
            ty,
        }
    }

    fn def(id: usize, kind: TypeKind, fields: Vec<FieldDefinition>) -> (TypeId, TypeDefinition) {
        let id = TypeId::new(id);
        (
            id,
            TypeDefinition {
                id,
                name: format!("T{}", id.index()),
                kind,
                fields,
            },
        )
    }

    #[test]
    fn test_struct_padding_and_inline_embedding() {
        let types: BTreeMap<_, _> = [
            def(
                0,
                TypeKind::Struct,
                vec![field("a", IrType::U8), field("b", IrType::I32)],
            ),
            def(
                1,
                TypeKind::Struct,
                vec![
                    field("flag", IrType::Bool),
                    field("inner", IrType::Object(TypeId::new(0))),
                ],
            ),
        ]
        .into_iter()
        .collect();
        let platform = PlatformAbstraction::embedded32();
        let layouts = LayoutEngine::new(&types, &platform, 4).run().unwrap();

        let inner = &layouts[&TypeId::new(0)];
        assert_eq!(inner.field_offsets(), &[0, 4]);
        assert_eq!(inner.size(), 8);

        let outer = &layouts[&TypeId::new(1)];
        assert_eq!(outer.field_offsets(), &[0, 4]);
        assert_eq!(outer.size(), 12);
    }

    #[test]
    fn test_class_inherits_base_fields() {
        let types: BTreeMap<_, _> = [
            def(
                0,
                TypeKind::Class { base: None },
                vec![field("x", IrType::I32)],
            ),
            def(
                1,
                TypeKind::Class {
                    base: Some(TypeId::new(0)),
                },
                vec![field("next", IrType::Object(TypeId::new(1))), field("y", IrType::I64)],
            ),
            def(2, TypeKind::OpenGeneric, vec![]),
        ]
        .into_iter()
        .collect();
        let platform = PlatformAbstraction::embedded32();
        let layouts = LayoutEngine::new(&types, &platform, 4).run().unwrap();

        assert_eq!(layouts[&TypeId::new(0)].field_offsets(), &[8]);
        assert_eq!(layouts[&TypeId::new(0)].size(), 12);
        // a self-reference in a class is a pointer, not a recursion
        assert_eq!(layouts[&TypeId::new(1)].field_offsets(), &[12, 16]);
        assert_eq!(layouts[&TypeId::new(1)].size(), 24);
        assert!(!layouts.contains_key(&TypeId::new(2)));
    }

    #[test]
    fn test_alignment_cap() {
        let types: BTreeMap<_, _> = [def(
            0,
            TypeKind::Struct,
            vec![field("a", IrType::U8), field("b", IrType::F64)],
        )]
        .into_iter()
        .collect();
        let platform = PlatformAbstraction::host64();

        let wide = LayoutEngine::new(&types, &platform, 8).run().unwrap();
        assert_eq!(wide[&TypeId::new(0)].field_offsets(), &[0, 8]);
        let packed = LayoutEngine::new(&types, &platform, 2).run().unwrap();
        assert_eq!(packed[&TypeId::new(0)].field_offsets(), &[0, 2]);
        assert_eq!(packed[&TypeId::new(0)].size(), 10);
    }

    #[test]
    fn test_self_embedding_struct_is_rejected() {
        let types: BTreeMap<_, _> = [def(
            0,
            TypeKind::Struct,
            vec![field("me", IrType::Object(TypeId::new(0)))],
        )]
        .into_iter()
        .collect();
        let platform = PlatformAbstraction::embedded32();
        let result = LayoutEngine::new(&types, &platform, 4).run();
        assert!(matches!(result, Err(Error::RecursiveLayout(id)) if id == TypeId::new(0)));
    }
}
