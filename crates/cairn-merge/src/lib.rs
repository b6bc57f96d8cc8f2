//! Merge engine: reduces element fragments to canonical elements

pub mod conflict;
pub mod engine;
pub mod layout;
pub mod overlay;
pub mod promote;


pub use conflict::{Conflict, ConflictReason};
pub use engine::{MergeEngine, MergeOptions, MergeOutput, merge_fragments};
pub use layout::LayoutPolicy;
pub use overlay::{overlay_value, overlay_values};
pub use promote::{PromotedField, promote_field};
