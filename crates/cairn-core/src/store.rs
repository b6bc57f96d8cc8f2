//! On-disk persistence of the workspace state

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StateError;
use crate::state::{StateData, WorkspaceState};

/// State directory: .cairn/
pub const STATE_DIR: &str = ".cairn";

/// State snapshot file
pub const STATE_FILE: &str = "state.json";

const STATE_TMP_FILE: &str = ".state.json.tmp";

pub fn state_dir(root: &Path) -> PathBuf {
    root.join(STATE_DIR)
}

pub fn state_path(root: &Path) -> PathBuf {
    state_dir(root).join(STATE_FILE)
}

/// Ensure the state directory exists
pub fn ensure_state_dir(root: &Path) -> std::io::Result<()> {
    let dir = state_dir(root);
    if !dir.exists() {
        fs::create_dir_all(&dir)?;
    }
    Ok(())
}

/// Persist the current snapshot with its content hash.
///
/// The JSON goes to a temporary file in the state directory, is fsynced, then
/// renamed over `state.json`, so a crash leaves either the old or the new file.
pub fn save_state(state: &WorkspaceState, root: &Path) -> Result<PathBuf, StateError> {
    ensure_state_dir(root)?;
    let mut data = StateData::clone(&state.snapshot());
    data.hash = Some(data.compute_hash()?);
    let json = serde_json::to_string_pretty(&data)?;

    let path = state_path(root);
    let tmp_path = state_dir(root).join(STATE_TMP_FILE);
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, &path)?;

    tracing::debug!("State saved: {}", path.display());
    Ok(path)
}

/// Load the persisted snapshot. `Ok(None)` when nothing was saved yet.
///
/// A snapshot with another schema version or whose stored hash does not match
/// its content is refused.
pub fn load_state(root: &Path) -> Result<Option<WorkspaceState>, StateError> {
    let path = state_path(root);
    if !path.exists() {
        return Ok(None);
    }
    let json = fs::read_to_string(&path)?;
    let data: StateData = serde_json::from_str(&json)?;
    data.check_version()?;

    if let Some(stored) = &data.hash {
        let computed = data.compute_hash()?;
        if stored != &computed {
            return Err(StateError::HashMismatch {
                stored: stored.clone(),
                computed,
            });
        }
    }

    let state = WorkspaceState::from_data(data)?;
    tracing::debug!("State loaded from: {}", path.display());
    Ok(Some(state))
}

/// Remove the state directory
pub fn clear_state(root: &Path) -> std::io::Result<()> {
    let dir = state_dir(root);
    if dir.exists() {
        fs::remove_dir_all(&dir)?;
    }
    Ok(())
}
