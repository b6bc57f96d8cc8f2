//! Merge conflicts

use std::fmt;

use cairn_core::{ElemID, PrimitiveKind};
use serde::{Deserialize, Serialize};

/// Why two fragments of one identity could not be reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ConflictReason {
    /// The fragments declare different element variants.
    KindMismatch { kept: String, dropped: String },
    /// A field is declared twice with different types.
    FieldTypeMismatch { field: String, kept: ElemID, dropped: ElemID },
    PrimitiveMismatch { kept: PrimitiveKind, dropped: PrimitiveKind },
    AnnotationTypeMismatch { annotation: String, kept: ElemID, dropped: ElemID },
    InstanceTypeMismatch { kept: ElemID, dropped: ElemID },
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::KindMismatch { kept, dropped } => {
                write!(f, "declared as {} and as {}", kept, dropped)
            }
            ConflictReason::FieldTypeMismatch { field, kept, dropped } => {
                write!(f, "field `{}` declared with type {} and {}", field, kept, dropped)
            }
            ConflictReason::PrimitiveMismatch { kept, dropped } => {
                write!(f, "primitive declared as {} and {}", kept.keyword(), dropped.keyword())
            }
            ConflictReason::AnnotationTypeMismatch {
                annotation,
                kept,
                dropped,
            } => write!(
                f,
                "annotation `{}` declared with type {} and {}",
                annotation, kept, dropped
            ),
            ConflictReason::InstanceTypeMismatch { kept, dropped } => {
                write!(f, "instance declared with type {} and {}", kept, dropped)
            }
        }
    }
}

/// A conflict for one identity. The canonical element keeps the definition
/// from the first origin listed; the second is the one that was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub elem_id: ElemID,
    pub origins: Vec<String>,
    #[serde(flatten)]
    pub reason: ConflictReason,
}

impl Conflict {
    pub fn new(elem_id: ElemID, kept: &str, dropped: &str, reason: ConflictReason) -> Self {
        Conflict {
            elem_id,
            origins: vec![kept.to_string(), dropped.to_string()],
            reason,
        }
    }

    pub(crate) fn sort_key(&self) -> (ElemID, String, Vec<String>) {
        (self.elem_id.clone(), self.reason.to_string(), self.origins.clone())
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (in {})", self.elem_id, self.reason, self.origins.join(", "))
    }
}
