//! Fetch → filter → merge → store
//!
//! Adapters run on tokio tasks, bounded by a semaphore. Every fragment is
//! collected before the merge starts. A partial fetch only replaces the
//! elements, timestamps and path-index entries of the sources that succeeded.

use std::path::PathBuf;
use std::sync::Arc;

use cairn_core::{DiffEngine, ElementDiff, Fragment, TypeRegistry, WorkspaceState, save_state};
use cairn_merge::{Conflict, MergeEngine, MergeOptions};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::adapter::{Adapter, into_fragments};
use crate::error::FetchError;
use crate::filter::FetchFilter;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Adapters allowed to run at once.
    pub max_concurrency: usize,
    pub merge: MergeOptions,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            max_concurrency: 4,
            merge: MergeOptions::default(),
        }
    }
}

/// Result of one fetch.
#[derive(Debug)]
pub struct FetchOutcome {
    /// Change between the state before and after the fetch.
    pub diff: ElementDiff,
    pub conflicts: Vec<Conflict>,
    /// Sources that failed, with the reason.
    pub failed: Vec<FetchError>,
    /// Sources whose elements were replaced, sorted.
    pub fetched: Vec<String>,
}

impl FetchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct FetchPipeline {
    state: Arc<WorkspaceState>,
    adapters: Vec<Arc<dyn Adapter>>,
    filters: Vec<Box<dyn FetchFilter>>,
    options: FetchOptions,
    diff_engine: DiffEngine,
    persist_root: Option<PathBuf>,
}

impl FetchPipeline {
    pub fn new(state: Arc<WorkspaceState>) -> Self {
        Self::with_options(state, FetchOptions::default())
    }

    pub fn with_options(state: Arc<WorkspaceState>, options: FetchOptions) -> Self {
        FetchPipeline {
            state,
            adapters: Vec::new(),
            filters: Vec::new(),
            options,
            diff_engine: DiffEngine::new(),
            persist_root: None,
        }
    }

    pub fn add_adapter(&mut self, adapter: Arc<dyn Adapter>) -> &mut Self {
        self.adapters.push(adapter);
        self
    }

    pub fn add_filter(&mut self, filter: Box<dyn FetchFilter>) -> &mut Self {
        self.filters.push(filter);
        self
    }

    /// Save the state under `root` after every fetch that changed it.
    pub fn persist_to(&mut self, root: impl Into<PathBuf>) -> &mut Self {
        self.persist_root = Some(root.into());
        self
    }

    pub fn state(&self) -> &Arc<WorkspaceState> {
        &self.state
    }

    pub fn adapter_names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    /// Fetch `sources` (every registered adapter when `None`) and fold the
    /// result into the state.
    ///
    /// A failing adapter does not fail the fetch; it is reported in
    /// [`FetchOutcome::failed`]. A failing filter aborts the fetch before the
    /// state is touched.
    pub async fn fetch(&mut self, sources: Option<&[String]>) -> Result<FetchOutcome, FetchError> {
        let selected: Vec<Arc<dyn Adapter>> = self
            .adapters
            .iter()
            .filter(|adapter| sources.is_none_or(|wanted| wanted.iter().any(|s| s == adapter.name())))
            .cloned()
            .collect();
        if let Some(wanted) = sources {
            for name in wanted {
                if !selected.iter().any(|a| a.name() == name) {
                    debug!(source = %name, "No adapter registered for source");
                }
            }
        }

        let registry = Arc::new(TypeRegistry::new());
        let permits = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for adapter in selected {
            let permits = permits.clone();
            let registry = registry.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let result = adapter.fetch(&registry).await;
                (adapter.name().to_string(), result)
            });
        }

        let mut fragments: Vec<Fragment> = Vec::new();
        let mut fetched: Vec<String> = Vec::new();
        let mut failed: Vec<FetchError> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(elements))) => {
                    debug!(source = %name, elements = elements.len(), "Source fetched");
                    fragments.extend(into_fragments(&name, elements));
                    fetched.push(name);
                }
                Ok((name, Err(error))) => {
                    warn!(source = %name, "Fetch failed: {:#}", error);
                    failed.push(FetchError::Adapter {
                        source_name: name,
                        error,
                    });
                }
                Err(join_error) => {
                    warn!("Fetch task failed: {}", join_error);
                    failed.push(FetchError::Task(join_error));
                }
            }
        }
        fetched.sort();
        failed.sort_by(|a, b| a.source_name().cmp(&b.source_name()));

        for filter in &self.filters {
            filter
                .on_fetch(&mut fragments)
                .await
                .map_err(|error| FetchError::Filter {
                    filter: filter.name().to_string(),
                    error,
                })?;
        }

        let before = self.state.snapshot();
        if fetched.is_empty() {
            info!(failed = failed.len(), "Nothing fetched; state unchanged");
            let diff = self.diff_engine.compute_diff(&before.elements, &before.elements);
            return Ok(FetchOutcome {
                diff,
                conflicts: Vec::new(),
                failed,
                fetched,
            });
        }

        let merged = MergeEngine::with_options(&registry, self.options.merge.clone()).merge(&fragments);

        self.state.refresh_sources(merged.elements, &fragments, &fetched);

        let after = self.state.snapshot();
        let diff = self.diff_engine.compute_diff(&before.elements, &after.elements);
        if let Some(root) = &self.persist_root {
            save_state(&self.state, root)?;
        }

        info!(
            fetched = fetched.len(),
            failed = failed.len(),
            conflicts = merged.conflicts.len(),
            changes = diff.len(),
            "Fetch complete"
        );
        Ok(FetchOutcome {
            diff,
            conflicts: merged.conflicts,
            failed,
            fetched,
        })
    }
}
