//! Error types for cairn-core

use thiserror::Error;

use crate::model::PrimitiveKind;

/// A full element name could not be parsed back into an [`crate::ElemID`].
#[derive(Debug, Error)]
pub enum IdError {
    #[error("empty element id")]
    Empty,

    #[error("unknown id kind `{kind}` in `{id}`")]
    UnknownKind { id: String, kind: String },

    #[error("element id `{0}` names a nested kind but no name")]
    MissingName(String),
}

/// Failures reading, writing or adopting a workspace state snapshot.
#[derive(Debug, Error)]
pub enum StateError {
    /// The snapshot was written by an engine with another schema version. The
    /// caller has to migrate it or run a full fetch; it is never coerced.
    #[error("state version mismatch: found {found:?}, expected {expected}")]
    VersionMismatch {
        found: Option<String>,
        expected: String,
    },

    #[error("state hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch { stored: String, computed: String },

    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A value does not satisfy a primitive type's restrictions.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("expected a {expected:?} value, got {value}")]
    WrongKind {
        expected: PrimitiveKind,
        value: serde_json::Value,
    },

    #[error("value {value} is not one of the allowed values")]
    NotAllowed { value: serde_json::Value },

    #[error("value {value:?} does not match /{pattern}/")]
    RegexMismatch { value: String, pattern: String },

    #[error("invalid restriction regex /{pattern}/: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
