//! Core data structures for configuration elements

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::annotations::{ENFORCE_VALUE, REGEX, RESTRICTION, RESTRICTION_VALUES, VALUES};
use crate::error::ValidationError;
use crate::id::{ElemID, IdKind};

pub use serde_json::Value;

/// Annotation or value map. Keys are kept sorted so serialization is stable.
pub type Values = BTreeMap<String, Value>;

/// Type name (within its adapter) of instances that describe an object type.
pub const DESCRIPTOR_TYPE: &str = "CustomObject";
/// Member of a type-descriptor instance that lists its field descriptors.
pub const DESCRIPTOR_FIELDS: &str = "fields";
/// Key naming a field descriptor (and the described entity).
pub const DESCRIPTOR_FULL_NAME: &str = "fullName";

// ── Source paths ────────────────────────────────────────

/// Where an element (or part of one) is serialized, as ordered segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct SourcePath(pub Vec<String>);

impl SourcePath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SourcePath(segments.into_iter().map(Into::into).collect())
    }

    /// Derive a path from a source unit id: directory segments plus the file
    /// stem (`salesforce/objects/lead.nacl` → `[salesforce, objects, lead]`).
    pub fn from_source_unit(unit: &str) -> Self {
        let mut segments: Vec<String> = unit
            .split(['/', '\\'])
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if let Some(last) = segments.last_mut() {
            if let Some((stem, _ext)) = last.rsplit_once('.') {
                if !stem.is_empty() {
                    *last = stem.to_string();
                }
            }
        }
        SourcePath(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Relative file name for this path with the given extension.
    pub fn to_file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.0.join("/"), extension)
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

// ── Primitive kinds ─────────────────────────────────────

/// Scalar kinds a primitive type can wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    String,
    Number,
    Boolean,
}

impl PrimitiveKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            PrimitiveKind::String => "string",
            PrimitiveKind::Number => "number",
            PrimitiveKind::Boolean => "boolean",
        }
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "string" => Some(PrimitiveKind::String),
            "number" => Some(PrimitiveKind::Number),
            "boolean" => Some(PrimitiveKind::Boolean),
            _ => None,
        }
    }

    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (PrimitiveKind::String, Value::String(_))
                | (PrimitiveKind::Number, Value::Number(_))
                | (PrimitiveKind::Boolean, Value::Bool(_))
        )
    }
}

// ── Type references ─────────────────────────────────────

/// Reference from a field, instance or annotation to a type.
///
/// References handed out by one [`crate::TypeRegistry`] share a handle, so two
/// references to the same name in one session are [`TypeRef::same_handle`].
/// Equality, ordering and hashing only look at the id.
#[derive(Clone)]
pub struct TypeRef(Arc<ElemID>);

impl TypeRef {
    /// A reference not owned by any registry (e.g. fresh from deserialization).
    pub fn detached(id: ElemID) -> Self {
        TypeRef(Arc::new(id))
    }

    pub(crate) fn from_handle(handle: Arc<ElemID>) -> Self {
        TypeRef(handle)
    }

    pub fn id(&self) -> &ElemID {
        &self.0
    }

    pub fn same_handle(&self, other: &TypeRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self.0)
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for TypeRef {}

impl PartialOrd for TypeRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl Hash for TypeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl Serialize for TypeRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TypeRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        ElemID::deserialize(deserializer).map(TypeRef::detached)
    }
}

// ── Restrictions ────────────────────────────────────────

/// Value restrictions declared on a primitive type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Restriction {
    pub enforce_value: bool,
    pub regex: Option<String>,
    pub values: Option<Vec<Value>>,
}

impl Restriction {
    /// Read `_restriction` (and a bare `_values` list) from an annotation map.
    pub fn from_annotations(annotations: &Values) -> Option<Self> {
        let block = annotations.get(RESTRICTION).and_then(Value::as_object);
        let listed = annotations.get(VALUES).and_then(Value::as_array);
        if block.is_none() && listed.is_none() {
            return None;
        }
        Some(Restriction {
            enforce_value: block
                .and_then(|b| b.get(ENFORCE_VALUE))
                .and_then(Value::as_bool)
                .unwrap_or(true),
            regex: block
                .and_then(|b| b.get(REGEX))
                .and_then(Value::as_str)
                .map(str::to_string),
            values: block
                .and_then(|b| b.get(RESTRICTION_VALUES))
                .and_then(Value::as_array)
                .or(listed)
                .cloned(),
        })
    }

    pub fn check(&self, value: &Value) -> Result<(), ValidationError> {
        if !self.enforce_value {
            return Ok(());
        }
        if let Some(allowed) = &self.values {
            if !allowed.contains(value) {
                return Err(ValidationError::NotAllowed { value: value.clone() });
            }
        }
        if let Some(pattern) = &self.regex {
            let re = Regex::new(pattern).map_err(|source| ValidationError::InvalidRegex {
                pattern: pattern.clone(),
                source,
            })?;
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if !re.is_match(&text) {
                return Err(ValidationError::RegexMismatch {
                    value: text,
                    pattern: pattern.clone(),
                });
            }
        }
        Ok(())
    }
}

// ── Elements ────────────────────────────────────────────

/// A named scalar type with restriction annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimitiveType {
    pub elem_id: ElemID,
    pub primitive: PrimitiveKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Values,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotation_types: BTreeMap<String, TypeRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<SourcePath>,
}

impl PrimitiveType {
    pub fn new(elem_id: ElemID, primitive: PrimitiveKind) -> Self {
        PrimitiveType {
            elem_id,
            primitive,
            annotations: Values::new(),
            annotation_types: BTreeMap::new(),
            paths: Vec::new(),
        }
    }

    pub fn restriction(&self) -> Option<Restriction> {
        Restriction::from_annotations(&self.annotations)
    }

    /// Check a value against the scalar kind and any declared restriction.
    pub fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        if !self.primitive.accepts(value) {
            return Err(ValidationError::WrongKind {
                expected: self.primitive,
                value: value.clone(),
            });
        }
        match self.restriction() {
            Some(restriction) => restriction.check(value),
            None => Ok(()),
        }
    }
}

/// A field of an object type. Its id nests under the parent type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub elem_id: ElemID,
    pub name: String,
    pub type_ref: TypeRef,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Values,
}

impl Field {
    pub fn new(parent: &ElemID, name: impl Into<String>, type_ref: TypeRef) -> Self {
        let name = name.into();
        Field {
            elem_id: parent.create_nested(IdKind::Field, name.clone()),
            name,
            type_ref,
            annotations: Values::new(),
        }
    }

    pub fn with_annotations(mut self, annotations: Values) -> Self {
        self.annotations = annotations;
        self
    }

    /// Id of the object type owning this field.
    pub fn parent_id(&self) -> ElemID {
        self.elem_id.top_level_parent()
    }
}

/// A named entity with fields and annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectType {
    pub elem_id: ElemID,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<String, Field>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Values,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotation_types: BTreeMap<String, TypeRef>,
    /// Annotation-only overrides keyed by field name. On a fragment these are
    /// overrides to apply; on a canonical element, overrides whose field no
    /// fragment declared.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_overrides: BTreeMap<String, Values>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<SourcePath>,
}

impl ObjectType {
    pub fn new(elem_id: ElemID) -> Self {
        ObjectType {
            elem_id,
            fields: IndexMap::new(),
            annotations: Values::new(),
            annotation_types: BTreeMap::new(),
            field_overrides: BTreeMap::new(),
            paths: Vec::new(),
        }
    }

    /// Add (or replace) a field and return it for further editing.
    pub fn add_field(&mut self, name: impl Into<String>, type_ref: TypeRef) -> &mut Field {
        let field = Field::new(&self.elem_id, name, type_ref);
        let name = field.name.clone();
        self.fields.insert(name.clone(), field);
        &mut self.fields[&name]
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn with_path(mut self, path: SourcePath) -> Self {
        self.paths.push(path);
        self
    }
}

/// A value conforming to some type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceElement {
    pub elem_id: ElemID,
    pub type_ref: TypeRef,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub value: Values,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<SourcePath>,
}

impl InstanceElement {
    pub fn new(type_ref: TypeRef, name: impl Into<String>, value: Values) -> Self {
        InstanceElement {
            elem_id: type_ref.id().create_nested(IdKind::Instance, name),
            type_ref,
            value,
            paths: Vec::new(),
        }
    }

    /// Field descriptor records, if this instance describes a type. Only
    /// instances of the adapter's [`DESCRIPTOR_TYPE`] do; any other instance
    /// with a `fields` member is plain data.
    pub fn field_descriptors(&self) -> Option<Vec<&serde_json::Map<String, Value>>> {
        if self.type_ref.id().type_name() != DESCRIPTOR_TYPE {
            return None;
        }
        let records: Vec<&serde_json::Map<String, Value>> = match self.value.get(DESCRIPTOR_FIELDS)? {
            Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
            Value::Object(single) => vec![single],
            _ => return None,
        };
        let describes_fields = records
            .iter()
            .any(|r| r.get(DESCRIPTOR_FULL_NAME).is_some_and(Value::is_string));
        describes_fields.then_some(records)
    }

    /// The object type this instance describes: `adapter.<instance name>` for a
    /// descriptor instance carrying field records, otherwise `None`.
    pub fn described_type(&self) -> Option<ElemID> {
        self.field_descriptors()?;
        Some(ElemID::new_type(self.elem_id.adapter(), self.elem_id.name()))
    }
}

/// Closed set of element variants. Consumers match exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Element {
    Primitive(PrimitiveType),
    Object(ObjectType),
    Field(Field),
    Instance(InstanceElement),
}

impl Element {
    pub fn elem_id(&self) -> &ElemID {
        match self {
            Element::Primitive(p) => &p.elem_id,
            Element::Object(o) => &o.elem_id,
            Element::Field(f) => &f.elem_id,
            Element::Instance(i) => &i.elem_id,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Element::Primitive(_) => "primitive type",
            Element::Object(_) => "object type",
            Element::Field(_) => "field",
            Element::Instance(_) => "instance",
        }
    }

    /// Owning source: the id's adapter.
    pub fn source(&self) -> &str {
        self.elem_id().adapter()
    }

    /// Identity this element is merged under. Standalone fields merge into
    /// their parent type; type-descriptor instances into the type they describe.
    pub fn merge_key(&self) -> ElemID {
        match self {
            Element::Field(f) => f.parent_id(),
            Element::Instance(i) => i.described_type().unwrap_or_else(|| i.elem_id.clone()),
            Element::Primitive(_) | Element::Object(_) => self.elem_id().clone(),
        }
    }

    pub fn paths(&self) -> &[SourcePath] {
        match self {
            Element::Primitive(p) => &p.paths,
            Element::Object(o) => &o.paths,
            Element::Field(_) => &[],
            Element::Instance(i) => &i.paths,
        }
    }

    pub fn paths_mut(&mut self) -> Option<&mut Vec<SourcePath>> {
        match self {
            Element::Primitive(p) => Some(&mut p.paths),
            Element::Object(o) => Some(&mut o.paths),
            Element::Field(_) => None,
            Element::Instance(i) => Some(&mut i.paths),
        }
    }

    /// Every type reference held by this element.
    pub fn type_refs_mut(&mut self) -> Vec<&mut TypeRef> {
        match self {
            Element::Primitive(p) => p.annotation_types.values_mut().collect(),
            Element::Object(o) => o
                .annotation_types
                .values_mut()
                .chain(o.fields.values_mut().map(|f| &mut f.type_ref))
                .collect(),
            Element::Field(f) => vec![&mut f.type_ref],
            Element::Instance(i) => vec![&mut i.type_ref],
        }
    }
}

impl From<PrimitiveType> for Element {
    fn from(p: PrimitiveType) -> Self {
        Element::Primitive(p)
    }
}

impl From<ObjectType> for Element {
    fn from(o: ObjectType) -> Self {
        Element::Object(o)
    }
}

impl From<Field> for Element {
    fn from(f: Field) -> Self {
        Element::Field(f)
    }
}

impl From<InstanceElement> for Element {
    fn from(i: InstanceElement) -> Self {
        Element::Instance(i)
    }
}

// ── Fragments ───────────────────────────────────────────

/// A not-yet-merged element tagged with the source unit it came from (a file
/// name for parsed text, an adapter name for live data).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub origin: String,
    pub element: Element,
}

impl Fragment {
    pub fn new(element: impl Into<Element>, origin: impl Into<String>) -> Self {
        Fragment {
            origin: origin.into(),
            element: element.into(),
        }
    }

    pub fn source(&self) -> &str {
        self.element.source()
    }

    pub fn merge_key(&self) -> ElemID {
        self.element.merge_key()
    }
}
