//! Error types for cairn-fetch

use cairn_core::StateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// One source failed. Its elements and timestamps are left untouched.
    #[error("fetch from `{source_name}` failed: {error:#}")]
    Adapter {
        source_name: String,
        error: anyhow::Error,
    },

    #[error("fetch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("filter `{filter}` failed: {error:#}")]
    Filter { filter: String, error: anyhow::Error },

    #[error(transparent)]
    State(#[from] StateError),
}

impl FetchError {
    /// Source the error is attributed to, if any.
    pub fn source_name(&self) -> Option<&str> {
        match self {
            FetchError::Adapter { source_name, .. } => Some(source_name),
            FetchError::Task(_) | FetchError::Filter { .. } | FetchError::State(_) => None,
        }
    }
}
