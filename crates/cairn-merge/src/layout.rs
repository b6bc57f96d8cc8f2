//! Standard / custom / installed-package split of object types
//!
//! Adapters hand their object types through [`LayoutPolicy::split_object`]
//! before emitting fragments. Each part carries the path it is serialized
//! under, which is what the path index later records.

use std::collections::BTreeMap;

use cairn_core::annotations::CUSTOM;
use cairn_core::{Field, ObjectType, SourcePath, Value};
use serde::{Deserialize, Serialize};

const OBJECTS: &str = "objects";
const STANDARD: &str = "standard";
const CUSTOM_DIR: &str = "custom";
const INSTALLED_PACKAGES: &str = "installed_packages";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutPolicy {
    /// Suffix marking customer-defined names (`Invoice__c`).
    pub custom_suffix: String,
    /// Separator between a package namespace and the name (`ns__Invoice__c`).
    pub namespace_separator: String,
}

impl Default for LayoutPolicy {
    fn default() -> Self {
        LayoutPolicy {
            custom_suffix: "__c".to_string(),
            namespace_separator: "__".to_string(),
        }
    }
}

impl LayoutPolicy {
    pub fn is_custom(&self, name: &str) -> bool {
        !self.custom_suffix.is_empty() && name.ends_with(&self.custom_suffix)
    }

    pub fn field_is_custom(&self, field: &Field) -> bool {
        self.is_custom(&field.name) || field.annotations.get(CUSTOM).and_then(Value::as_bool) == Some(true)
    }

    /// Package namespace of a name, if any: `ns__Name__c` → `ns`.
    pub fn namespace<'n>(&self, name: &'n str) -> Option<&'n str> {
        if self.namespace_separator.is_empty() {
            return None;
        }
        let stem = name.strip_suffix(self.custom_suffix.as_str()).unwrap_or(name);
        let (namespace, rest) = stem.split_once(self.namespace_separator.as_str())?;
        (!namespace.is_empty() && !rest.is_empty()).then_some(namespace)
    }

    fn installed_package_path(&self, object: &ObjectType, namespace: &str) -> SourcePath {
        SourcePath::new([
            object.elem_id.adapter(),
            INSTALLED_PACKAGES,
            namespace,
            OBJECTS,
            object.elem_id.type_name(),
        ])
    }

    fn objects_path(object: &ObjectType, kind: &str) -> SourcePath {
        SourcePath::new([object.elem_id.adapter(), OBJECTS, kind, object.elem_id.type_name()])
    }

    /// Split an object type into path-tagged parts:
    ///
    /// - a namespaced object is one part under its installed package;
    /// - a custom object is one part under `objects/custom`, with namespaced
    ///   fields split out per package;
    /// - a standard object keeps annotations and standard fields under
    ///   `objects/standard`, custom fields under `objects/custom` and namespaced
    ///   fields under their package.
    pub fn split_object(&self, object: &ObjectType) -> Vec<ObjectType> {
        let name = object.elem_id.type_name();
        if let Some(namespace) = self.namespace(name) {
            let mut whole = object.clone();
            whole.paths = vec![self.installed_package_path(object, namespace)];
            return vec![whole];
        }

        let object_custom = self.is_custom(name);
        let mut base = ObjectType::new(object.elem_id.clone());
        base.annotations = object.annotations.clone();
        base.annotation_types = object.annotation_types.clone();
        base.field_overrides = object.field_overrides.clone();
        base.paths = vec![Self::objects_path(object, if object_custom { CUSTOM_DIR } else { STANDARD })];

        let mut custom = ObjectType::new(object.elem_id.clone());
        custom.paths = vec![Self::objects_path(object, CUSTOM_DIR)];
        let mut packages: BTreeMap<&str, ObjectType> = BTreeMap::new();

        for (field_name, field) in &object.fields {
            let target = if let Some(namespace) = self.namespace(field_name) {
                packages.entry(namespace).or_insert_with(|| {
                    let mut part = ObjectType::new(object.elem_id.clone());
                    part.paths = vec![self.installed_package_path(object, namespace)];
                    part
                })
            } else if !object_custom && self.field_is_custom(field) {
                &mut custom
            } else {
                &mut base
            };
            target.fields.insert(field_name.clone(), field.clone());
        }

        let mut parts = vec![base];
        if !custom.fields.is_empty() {
            parts.push(custom);
        }
        parts.extend(packages.into_values());
        parts
    }
}
