//! Cairn Core: element identity, element model, type registry, path index and
//! workspace state store

pub mod annotations;
pub mod diff;
pub mod error;
pub mod id;
pub mod model;
pub mod path_index;
pub mod registry;
pub mod state;
pub mod store;


#[cfg(test)]
pub mod test_utils;

pub use diff::{DiffEngine, ElementDiff, diff_elements};
pub use error::{IdError, StateError, ValidationError};
pub use id::{ElemID, IdKind};
pub use model::{
    DESCRIPTOR_TYPE, Element, Field, Fragment, InstanceElement, ObjectType, PrimitiveKind, PrimitiveType,
    Restriction, SourcePath, TypeRef, Value, Values,
};
pub use path_index::PathIndex;
pub use registry::{TypeRegistry, TypeShape};
pub use state::{STATE_VERSION, StateData, WorkspaceState};
pub use store::{STATE_DIR, STATE_FILE, clear_state, ensure_state_dir, load_state, save_state, state_dir, state_path};
