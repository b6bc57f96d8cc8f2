//! Test utilities for cairn-core

use crate::id::ElemID;
use crate::model::{Element, Fragment, InstanceElement, ObjectType, SourcePath, TypeRef, Values};

/// Object type `adapter.name` with builtin-string fields.
pub fn object(adapter: &str, name: &str, fields: &[&str]) -> ObjectType {
    let mut object = ObjectType::new(ElemID::new_type(adapter, name));
    for field in fields {
        object.add_field(*field, TypeRef::detached(ElemID::builtin("string")));
    }
    object
}

/// Same as [`object`], placed at `path`.
pub fn object_at(adapter: &str, name: &str, fields: &[&str], path: &[&str]) -> Element {
    Element::Object(object(adapter, name, fields).with_path(SourcePath::new(path.iter().copied())))
}

pub fn instance(adapter: &str, type_name: &str, name: &str, value: serde_json::Value) -> InstanceElement {
    let values: Values = match value {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => Values::new(),
    };
    InstanceElement::new(
        TypeRef::detached(ElemID::new_type(adapter, type_name)),
        name,
        values,
    )
}

pub fn fragment(element: impl Into<Element>, origin: &str) -> Fragment {
    Fragment::new(element, origin)
}
