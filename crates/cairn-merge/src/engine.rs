//! Reduction of fragments into canonical elements
//!
//! Fragments are grouped by merge key, each group is ordered by
//! `(origin, canonical JSON)`, and the group is folded into one element. The
//! ordering makes the output independent of arrival order while keeping the
//! rule that a later source unit wins an annotation overlay.

use std::collections::BTreeMap;

use cairn_core::annotations::API_NAME;
use cairn_core::id::ID_SEPARATOR;
use cairn_core::model::DESCRIPTOR_FIELDS;
use cairn_core::{
    ElemID, Element, Field, Fragment, IdKind, InstanceElement, ObjectType, PrimitiveType, SourcePath, TypeRef,
    TypeRegistry, Values,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::conflict::{Conflict, ConflictReason};
use crate::overlay::overlay_values;
use crate::promote::promote_field;

/// Knobs of the merge engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Field annotation naming the service-side field, used to match
    /// descriptor records against live fields.
    pub api_name_annotation: String,
}

impl Default for MergeOptions {
    fn default() -> Self {
        MergeOptions {
            api_name_annotation: API_NAME.to_string(),
        }
    }
}

/// Canonical elements of one session, sorted by id, and the conflicts met
/// while producing them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutput {
    pub elements: Vec<Element>,
    pub conflicts: Vec<Conflict>,
}

impl MergeOutput {
    pub fn get(&self, id: &ElemID) -> Option<&Element> {
        self.elements
            .binary_search_by(|element| element.elem_id().cmp(id))
            .ok()
            .map(|index| &self.elements[index])
    }

    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn into_map(self) -> BTreeMap<ElemID, Element> {
        self.elements
            .into_iter()
            .map(|element| (element.elem_id().clone(), element))
            .collect()
    }
}

/// How a group is reduced, decided by its first fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupClass {
    Primitive,
    /// Object types, standalone fields and type-descriptor instances.
    Object,
    Instance,
}

impl GroupClass {
    fn of(element: &Element) -> Self {
        match element {
            Element::Primitive(_) => GroupClass::Primitive,
            Element::Object(_) | Element::Field(_) => GroupClass::Object,
            Element::Instance(instance) if instance.described_type().is_some() => GroupClass::Object,
            Element::Instance(_) => GroupClass::Instance,
        }
    }
}

pub struct MergeEngine<'a> {
    registry: &'a TypeRegistry,
    options: MergeOptions,
}

impl<'a> MergeEngine<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self::with_options(registry, MergeOptions::default())
    }

    pub fn with_options(registry: &'a TypeRegistry, options: MergeOptions) -> Self {
        MergeEngine { registry, options }
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Merge every fragment of a session.
    pub fn merge(&self, fragments: &[Fragment]) -> MergeOutput {
        let mut groups: BTreeMap<ElemID, Vec<(&Fragment, String)>> = BTreeMap::new();
        for fragment in fragments {
            let canonical = serde_json::to_string(&fragment.element).unwrap_or_default();
            groups
                .entry(fragment.merge_key())
                .or_default()
                .push((fragment, canonical));
        }

        let mut output = MergeOutput::default();
        for (id, mut group) in groups {
            group.sort_by(|a, b| (a.0.origin.as_str(), &a.1).cmp(&(b.0.origin.as_str(), &b.1)));
            let ordered: Vec<&Fragment> = group.into_iter().map(|(fragment, _)| fragment).collect();
            let mut element = self.merge_group(&id, &ordered, &mut output.conflicts);
            self.registry.intern_element(&mut element);
            self.registry.register_element(&element);
            output.elements.push(element);
        }

        output.conflicts.sort_by_key(Conflict::sort_key);
        for conflict in &output.conflicts {
            warn!(%conflict, "Merge conflict");
        }
        info!(
            fragments = fragments.len(),
            elements = output.elements.len(),
            conflicts = output.conflicts.len(),
            "Merged fragments"
        );
        output
    }

    fn merge_group(&self, id: &ElemID, group: &[&Fragment], conflicts: &mut Vec<Conflict>) -> Element {
        let first = group[0];
        let class = GroupClass::of(&first.element);
        let mut members: Vec<&Fragment> = Vec::with_capacity(group.len());
        for fragment in group {
            if GroupClass::of(&fragment.element) == class {
                members.push(fragment);
            } else {
                conflicts.push(Conflict::new(
                    id.clone(),
                    &first.origin,
                    &fragment.origin,
                    ConflictReason::KindMismatch {
                        kept: first.element.kind_name().to_string(),
                        dropped: fragment.element.kind_name().to_string(),
                    },
                ));
            }
        }

        match class {
            GroupClass::Primitive => Element::Primitive(merge_primitive(id, &members, conflicts)),
            GroupClass::Object => Element::Object(self.merge_object(id, &members, conflicts)),
            GroupClass::Instance => Element::Instance(merge_instance(id, &members, conflicts)),
        }
    }

    fn merge_object(&self, id: &ElemID, members: &[&Fragment], conflicts: &mut Vec<Conflict>) -> ObjectType {
        let mut merged = ObjectType::new(id.clone());
        let mut field_origins: BTreeMap<String, String> = BTreeMap::new();
        let mut annotation_origins: BTreeMap<String, String> = BTreeMap::new();
        let mut overrides: Vec<(String, Values)> = Vec::new();
        let mut descriptors: Vec<&InstanceElement> = Vec::new();
        let mut live = false;

        for fragment in members {
            match &fragment.element {
                Element::Object(object) => {
                    live = true;
                    overlay_values(&mut merged.annotations, object.annotations.clone());
                    merge_annotation_types(
                        id,
                        &mut merged.annotation_types,
                        &object.annotation_types,
                        &fragment.origin,
                        &mut annotation_origins,
                        conflicts,
                    );
                    for field in object.fields.values() {
                        merge_field(&mut merged, field, &fragment.origin, &mut field_origins, conflicts);
                    }
                    overrides.extend(object.field_overrides.iter().map(|(n, v)| (n.clone(), v.clone())));
                    merged.paths.extend(object.paths.iter().cloned());
                }
                Element::Field(field) => {
                    live = true;
                    merge_field(&mut merged, field, &fragment.origin, &mut field_origins, conflicts);
                }
                Element::Instance(instance) => {
                    descriptors.push(instance);
                    merged.paths.extend(instance.paths.iter().cloned());
                }
                // Filtered out by group class.
                Element::Primitive(_) => {}
            }
        }

        if !live && !descriptors.is_empty() {
            debug!(id = %id, "Promoting descriptor instance to object type");
        }
        for descriptor in descriptors {
            self.apply_descriptor(&mut merged, descriptor);
        }

        for (name, values) in overrides {
            match merged.fields.get_mut(&name) {
                Some(field) => overlay_values(&mut field.annotations, values),
                None => {
                    debug!(id = %id, field = %name, "Keeping override of undeclared field");
                    overlay_values(merged.field_overrides.entry(name).or_default(), values);
                }
            }
        }

        normalize_paths(&mut merged.paths);
        merged
    }

    /// Overlay descriptor records onto live fields, adding a field for every
    /// record no live field matches.
    fn apply_descriptor(&self, merged: &mut ObjectType, descriptor: &InstanceElement) {
        let mut type_level = descriptor.value.clone();
        type_level.remove(DESCRIPTOR_FIELDS);
        overlay_values(&mut merged.annotations, type_level);

        let adapter = merged.elem_id.adapter().to_string();
        for record in descriptor.field_descriptors().unwrap_or_default() {
            let Some(promoted) = promote_field(record, &adapter) else {
                continue;
            };
            match self.matching_field(merged, &promoted.name) {
                Some(key) => {
                    if let Some(field) = merged.fields.get_mut(&key) {
                        overlay_values(&mut field.annotations, promoted.annotations);
                    }
                }
                None if promoted.name.contains(ID_SEPARATOR) => {
                    warn!(
                        elem_id = %merged.elem_id,
                        field = %promoted.name,
                        "Skipping descriptor field whose name cannot form an element id"
                    );
                }
                None => {
                    let type_ref = self.registry.get_or_create_id(&promoted.type_id);
                    merged.add_field(promoted.name, type_ref).annotations = promoted.annotations;
                }
            }
        }
    }

    fn matching_field(&self, object: &ObjectType, name: &str) -> Option<String> {
        if object.fields.contains_key(name) {
            return Some(name.to_string());
        }
        object
            .fields
            .values()
            .find(|field| {
                field
                    .annotations
                    .get(&self.options.api_name_annotation)
                    .and_then(|v| v.as_str())
                    == Some(name)
            })
            .map(|field| field.name.clone())
    }
}

/// Merge fragments with default options.
pub fn merge_fragments(fragments: &[Fragment], registry: &TypeRegistry) -> MergeOutput {
    MergeEngine::new(registry).merge(fragments)
}

fn merge_field(
    merged: &mut ObjectType,
    field: &Field,
    origin: &str,
    field_origins: &mut BTreeMap<String, String>,
    conflicts: &mut Vec<Conflict>,
) {
    match merged.fields.get_mut(&field.name) {
        Some(existing) if existing.type_ref != field.type_ref => {
            let kept_origin = field_origins.get(&field.name).map(String::as_str).unwrap_or_default();
            conflicts.push(Conflict::new(
                existing.elem_id.clone(),
                kept_origin,
                origin,
                ConflictReason::FieldTypeMismatch {
                    field: field.name.clone(),
                    kept: existing.type_ref.id().clone(),
                    dropped: field.type_ref.id().clone(),
                },
            ));
        }
        Some(existing) => overlay_values(&mut existing.annotations, field.annotations.clone()),
        None => {
            let mut added = field.clone();
            added.elem_id = merged.elem_id.create_nested(IdKind::Field, field.name.clone());
            merged.fields.insert(field.name.clone(), added);
            field_origins.insert(field.name.clone(), origin.to_string());
        }
    }
}

fn merge_annotation_types(
    id: &ElemID,
    merged: &mut BTreeMap<String, TypeRef>,
    incoming: &BTreeMap<String, TypeRef>,
    origin: &str,
    origins: &mut BTreeMap<String, String>,
    conflicts: &mut Vec<Conflict>,
) {
    for (name, type_ref) in incoming {
        match merged.get(name) {
            Some(existing) if existing != type_ref => {
                let kept_origin = origins.get(name).map(String::as_str).unwrap_or_default();
                conflicts.push(Conflict::new(
                    id.create_nested(IdKind::Annotation, name.clone()),
                    kept_origin,
                    origin,
                    ConflictReason::AnnotationTypeMismatch {
                        annotation: name.clone(),
                        kept: existing.id().clone(),
                        dropped: type_ref.id().clone(),
                    },
                ));
            }
            Some(_) => {}
            None => {
                merged.insert(name.clone(), type_ref.clone());
                origins.insert(name.clone(), origin.to_string());
            }
        }
    }
}

fn merge_primitive(id: &ElemID, members: &[&Fragment], conflicts: &mut Vec<Conflict>) -> PrimitiveType {
    let mut merged: Option<(PrimitiveType, &str)> = None;
    let mut annotation_origins = BTreeMap::new();
    for fragment in members {
        let Element::Primitive(primitive) = &fragment.element else {
            continue;
        };
        let (target, first_origin) = merged.get_or_insert_with(|| {
            (PrimitiveType::new(id.clone(), primitive.primitive), fragment.origin.as_str())
        });
        if target.primitive != primitive.primitive {
            conflicts.push(Conflict::new(
                id.clone(),
                first_origin,
                &fragment.origin,
                ConflictReason::PrimitiveMismatch {
                    kept: target.primitive,
                    dropped: primitive.primitive,
                },
            ));
            continue;
        }
        overlay_values(&mut target.annotations, primitive.annotations.clone());
        merge_annotation_types(
            id,
            &mut target.annotation_types,
            &primitive.annotation_types,
            &fragment.origin,
            &mut annotation_origins,
            conflicts,
        );
        target.paths.extend(primitive.paths.iter().cloned());
    }
    let mut merged = match merged {
        Some((primitive, _)) => primitive,
        None => PrimitiveType::new(id.clone(), cairn_core::PrimitiveKind::String),
    };
    normalize_paths(&mut merged.paths);
    merged
}

fn merge_instance(id: &ElemID, members: &[&Fragment], conflicts: &mut Vec<Conflict>) -> InstanceElement {
    let mut merged: Option<(InstanceElement, &str)> = None;
    for fragment in members {
        let Element::Instance(instance) = &fragment.element else {
            continue;
        };
        let Some((target, first_origin)) = merged.as_mut() else {
            merged = Some((instance.clone(), fragment.origin.as_str()));
            continue;
        };
        if target.type_ref != instance.type_ref {
            conflicts.push(Conflict::new(
                id.clone(),
                first_origin,
                &fragment.origin,
                ConflictReason::InstanceTypeMismatch {
                    kept: target.type_ref.id().clone(),
                    dropped: instance.type_ref.id().clone(),
                },
            ));
            continue;
        }
        overlay_values(&mut target.value, instance.value.clone());
        target.paths.extend(instance.paths.iter().cloned());
    }
    let mut merged = match merged {
        Some((instance, _)) => instance,
        None => InstanceElement {
            elem_id: id.clone(),
            type_ref: TypeRef::detached(id.parent()),
            value: Values::new(),
            paths: Vec::new(),
        },
    };
    normalize_paths(&mut merged.paths);
    merged
}

fn normalize_paths(paths: &mut Vec<SourcePath>) {
    paths.retain(|path| !path.is_empty());
    paths.sort();
    paths.dedup();
}
