//! Session-scoped type registry

use std::sync::Arc;

use dashmap::DashMap;

use crate::id::ElemID;
use crate::model::{Element, PrimitiveKind, TypeRef};

/// What the registry knows about a type so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeShape {
    /// Referenced but not (yet) declared.
    Placeholder,
    Primitive(PrimitiveKind),
    Object,
}

/// Get-or-create cache of types keyed by id. Every lookup of one name within a
/// registry hands out the same shared handle, so field type references resolve
/// to one representation per session.
///
/// One registry belongs to one parse/merge session. It is shared by reference
/// (usually through an `Arc`) among that session's parser workers; the map is
/// the session-scoped lock.
pub struct TypeRegistry {
    types: DashMap<ElemID, (Arc<ElemID>, TypeShape)>,
}

impl TypeRegistry {
    /// A fresh registry holding only the builtin primitives.
    pub fn new() -> Self {
        let registry = TypeRegistry {
            types: DashMap::new(),
        };
        for kind in [PrimitiveKind::String, PrimitiveKind::Number, PrimitiveKind::Boolean] {
            registry.declare(&ElemID::builtin(kind.keyword()), TypeShape::Primitive(kind));
        }
        registry
    }

    /// Resolve a qualified source name (`salesforce_string`).
    pub fn get_or_create(&self, qualified_name: &str) -> TypeRef {
        self.get_or_create_id(&ElemID::from_qualified(qualified_name))
    }

    pub fn get_or_create_id(&self, id: &ElemID) -> TypeRef {
        if let Some(entry) = self.types.get(id) {
            return TypeRef::from_handle(entry.0.clone());
        }
        let entry = self
            .types
            .entry(id.clone())
            .or_insert_with(|| (Arc::new(id.clone()), TypeShape::Placeholder));
        TypeRef::from_handle(entry.0.clone())
    }

    /// Record what a type is. A placeholder is upgraded in place so handles
    /// already given out stay valid; an already declared shape is kept.
    pub fn declare(&self, id: &ElemID, shape: TypeShape) -> TypeRef {
        let mut entry = self
            .types
            .entry(id.clone())
            .or_insert_with(|| (Arc::new(id.clone()), TypeShape::Placeholder));
        if entry.1 == TypeShape::Placeholder {
            entry.1 = shape;
        }
        TypeRef::from_handle(entry.0.clone())
    }

    /// Declare the type an element defines, if it defines one.
    pub fn register_element(&self, element: &Element) -> Option<TypeRef> {
        match element {
            Element::Primitive(p) => Some(self.declare(&p.elem_id, TypeShape::Primitive(p.primitive))),
            Element::Object(o) => Some(self.declare(&o.elem_id, TypeShape::Object)),
            Element::Field(_) | Element::Instance(_) => None,
        }
    }

    pub fn shape(&self, id: &ElemID) -> Option<TypeShape> {
        self.types.get(id).map(|entry| entry.1)
    }

    pub fn lookup(&self, id: &ElemID) -> Option<TypeRef> {
        self.types.get(id).map(|entry| TypeRef::from_handle(entry.0.clone()))
    }

    /// Rebind a reference to this registry's handle for its id.
    pub fn intern(&self, type_ref: &TypeRef) -> TypeRef {
        self.get_or_create_id(type_ref.id())
    }

    /// Rebind every type reference an element holds (after deserialization or
    /// when taking in adapter-built elements).
    pub fn intern_element(&self, element: &mut Element) {
        for type_ref in element.type_refs_mut() {
            *type_ref = self.intern(type_ref);
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// All known ids, sorted.
    pub fn ids(&self) -> Vec<ElemID> {
        let mut ids: Vec<ElemID> = self.types.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Ids referenced but never declared.
    pub fn unresolved(&self) -> Vec<ElemID> {
        let mut ids: Vec<ElemID> = self
            .types
            .iter()
            .filter(|entry| entry.value().1 == TypeShape::Placeholder)
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
