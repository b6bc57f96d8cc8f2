//! Element identity

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::IdError;

/// Separator between the segments of a full element name.
pub const ID_SEPARATOR: char = '.';

/// Separator between adapter and type name in a qualified source name
/// (`salesforce_string` → adapter `salesforce`, name `string`).
pub const QUALIFIED_SEPARATOR: char = '_';

/// What an [`ElemID`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Type,
    Field,
    Instance,
    Annotation,
}

impl IdKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdKind::Type => "type",
            IdKind::Field => "field",
            IdKind::Instance => "instance",
            IdKind::Annotation => "annotation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "type" => Some(IdKind::Type),
            "field" => Some(IdKind::Field),
            "instance" => Some(IdKind::Instance),
            "annotation" => Some(IdKind::Annotation),
            _ => None,
        }
    }
}

/// Logical identity of an element. Two fragments describe the same entity iff
/// their ids compare equal.
///
/// The derived ordering (adapter, type name, kind, name parts) is the ordering
/// used everywhere output has to be deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ElemID {
    adapter: String,
    type_name: String,
    kind: IdKind,
    name_parts: Vec<String>,
}

impl ElemID {
    pub fn new(
        adapter: impl Into<String>,
        type_name: impl Into<String>,
        kind: IdKind,
        name_parts: Vec<String>,
    ) -> Self {
        ElemID {
            adapter: adapter.into(),
            type_name: type_name.into(),
            kind,
            name_parts,
        }
    }

    /// Id of a top-level type owned by `adapter`.
    pub fn new_type(adapter: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(adapter, type_name, IdKind::Type, Vec::new())
    }

    /// Id of a builtin type (no owning adapter).
    pub fn builtin(type_name: impl Into<String>) -> Self {
        Self::new_type("", type_name)
    }

    /// Resolve a qualified source name. The adapter is everything before the
    /// first `_`; a name without one (or starting with one) is a builtin.
    pub fn from_qualified(qualified_name: &str) -> Self {
        match qualified_name.split_once(QUALIFIED_SEPARATOR) {
            Some((adapter, name)) if !adapter.is_empty() && !name.is_empty() => {
                Self::new_type(adapter, name)
            }
            _ => Self::builtin(qualified_name),
        }
    }

    /// Parse a dotted full name as produced by [`ElemID::full_name`].
    pub fn from_full_name(full_name: &str) -> Result<Self, IdError> {
        if full_name.is_empty() {
            return Err(IdError::Empty);
        }
        let segments: Vec<&str> = full_name.split(ID_SEPARATOR).collect();
        match segments.as_slice() {
            [name] => Ok(Self::builtin(*name)),
            [adapter, type_name] => Ok(Self::new_type(*adapter, *type_name)),
            [_, _, kind] => match IdKind::parse(kind) {
                Some(_) => Err(IdError::MissingName(full_name.to_string())),
                None => Err(IdError::UnknownKind {
                    id: full_name.to_string(),
                    kind: kind.to_string(),
                }),
            },
            [adapter, type_name, kind, rest @ ..] => {
                let kind = IdKind::parse(kind).ok_or_else(|| IdError::UnknownKind {
                    id: full_name.to_string(),
                    kind: kind.to_string(),
                })?;
                if kind == IdKind::Type {
                    return Err(IdError::UnknownKind {
                        id: full_name.to_string(),
                        kind: kind.as_str().to_string(),
                    });
                }
                Ok(Self::new(
                    *adapter,
                    *type_name,
                    kind,
                    rest.iter().map(|s| s.to_string()).collect(),
                ))
            }
            [] => Err(IdError::Empty),
        }
    }

    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn kind(&self) -> IdKind {
        self.kind
    }

    pub fn name_parts(&self) -> &[String] {
        &self.name_parts
    }

    /// The element's own name: the last name part, or the type name for types.
    pub fn name(&self) -> &str {
        self.name_parts.last().map_or(self.type_name.as_str(), String::as_str)
    }

    pub fn is_builtin(&self) -> bool {
        self.adapter.is_empty()
    }

    /// Types and single-part instances are top level; everything else nests
    /// inside one.
    pub fn is_top_level(&self) -> bool {
        match self.kind {
            IdKind::Type => true,
            IdKind::Instance => self.name_parts.len() <= 1,
            IdKind::Field | IdKind::Annotation => false,
        }
    }

    /// Id of a child: `parent.field.name` for a type, or one more name part
    /// for an already nested id.
    pub fn create_nested(&self, kind: IdKind, name: impl Into<String>) -> Self {
        let name = name.into();
        if self.kind == IdKind::Type {
            Self::new(self.adapter.clone(), self.type_name.clone(), kind, vec![name])
        } else {
            let mut parts = self.name_parts.clone();
            parts.push(name);
            Self::new(self.adapter.clone(), self.type_name.clone(), self.kind, parts)
        }
    }

    /// The id one level up. A top-level id is its own parent.
    pub fn parent(&self) -> Self {
        match self.kind {
            IdKind::Type => self.clone(),
            _ if self.name_parts.len() > 1 => {
                let mut parts = self.name_parts.clone();
                parts.pop();
                Self::new(self.adapter.clone(), self.type_name.clone(), self.kind, parts)
            }
            IdKind::Instance => self.clone(),
            IdKind::Field | IdKind::Annotation => {
                Self::new_type(self.adapter.clone(), self.type_name.clone())
            }
        }
    }

    /// Walk up to the enclosing top-level element.
    pub fn top_level_parent(&self) -> Self {
        let mut current = self.clone();
        while !current.is_top_level() {
            current = current.parent();
        }
        current
    }

    /// Name as written in source (`adapter_type`).
    pub fn qualified_name(&self) -> String {
        if self.adapter.is_empty() {
            self.type_name.clone()
        } else {
            format!("{}{}{}", self.adapter, QUALIFIED_SEPARATOR, self.type_name)
        }
    }

    /// Dotted full name, e.g. `salesforce.lead.field.name`.
    pub fn full_name(&self) -> String {
        let mut out = if self.adapter.is_empty() {
            self.type_name.clone()
        } else {
            format!("{}{}{}", self.adapter, ID_SEPARATOR, self.type_name)
        };
        if self.kind != IdKind::Type {
            out.push(ID_SEPARATOR);
            out.push_str(self.kind.as_str());
            for part in &self.name_parts {
                out.push(ID_SEPARATOR);
                out.push_str(part);
            }
        }
        out
    }
}

impl fmt::Display for ElemID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

impl From<ElemID> for String {
    fn from(id: ElemID) -> Self {
        id.full_name()
    }
}

impl TryFrom<String> for ElemID {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ElemID::from_full_name(&value)
    }
}
