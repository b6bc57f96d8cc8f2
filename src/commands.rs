//! CLI command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use cairn_core::{
    DiffEngine, StateError, TypeRegistry, WorkspaceState, clear_state, load_state, save_state,
};
use cairn_merge::{MergeEngine, MergeOutput};
use cairn_parser::{ParseOutcome, ParserPool, create_parser_pool};
use chrono::{Duration, Utc};

use crate::config::CairnConfig;

/// Everything one parse/merge session over the workspace produced.
struct Session {
    parsed: ParseOutcome,
    merged: MergeOutput,
    registry: Arc<TypeRegistry>,
}

async fn run_session(root: &Path) -> anyhow::Result<Session> {
    let config = CairnConfig::load(root)?;
    let units = config.discover(root)?;
    tracing::info!("Found {} source units", units.len());

    let pool = match config.workers {
        Some(workers) => ParserPool::new(workers),
        None => create_parser_pool(),
    };
    let registry = Arc::new(TypeRegistry::new());
    let parsed = pool.parse_all(units, registry.clone()).await?;
    let merged = MergeEngine::with_options(&registry, config.merge.clone()).merge(&parsed.fragments);
    Ok(Session {
        parsed,
        merged,
        registry,
    })
}

fn report(session: &Session) {
    for error in &session.parsed.errors {
        println!("error: {}", error);
    }
    for conflict in &session.merged.conflicts {
        println!("conflict: {}", conflict);
    }
    for id in session.registry.unresolved() {
        println!("warning: type {} is referenced but never declared", id);
    }
}

/// Parse and merge every source unit; fail if anything did not reconcile.
pub async fn check(root: PathBuf) -> anyhow::Result<()> {
    let session = run_session(&root).await?;
    report(&session);
    println!(
        "{} elements, {} syntax errors, {} conflicts",
        session.merged.elements.len(),
        session.parsed.errors.len(),
        session.merged.conflicts.len()
    );
    if !session.parsed.errors.is_empty() || !session.merged.conflicts.is_empty() {
        anyhow::bail!(
            "check failed: {} syntax errors, {} conflicts",
            session.parsed.errors.len(),
            session.merged.conflicts.len()
        );
    }
    Ok(())
}

/// Full re-index: replace the stored snapshot with the merged sources.
pub async fn index(root: PathBuf) -> anyhow::Result<()> {
    tracing::info!("Indexing workspace: {}", root.display());
    let session = run_session(&root).await?;
    report(&session);

    let previous = match load_state(&root) {
        Ok(Some(state)) => state.snapshot().elements.clone(),
        Ok(None) => Default::default(),
        Err(StateError::VersionMismatch { found, expected }) => {
            tracing::warn!(?found, %expected, "Stored state has another version; rebuilding it");
            Default::default()
        }
        Err(e) => return Err(e).context("could not load stored state"),
    };

    let state = WorkspaceState::new();
    state.override_elements(session.merged.elements, None);
    state.override_path_index(&session.parsed.fragments);
    let path = save_state(&state, &root)?;

    let diff = DiffEngine::new().compute_diff(&previous, &state.snapshot().elements);
    println!(
        "Indexed {} elements ({} added, {} removed, {} modified)",
        state.len(),
        diff.added.len(),
        diff.removed.len(),
        diff.modified.len()
    );
    println!("hash: {}", state.hash()?);
    tracing::info!("State written to {}", path.display());
    Ok(())
}

/// Describe the stored snapshot.
pub fn state(root: PathBuf, list: bool, stale_hours: Option<i64>) -> anyhow::Result<()> {
    let Some(state) = load_state(&root)? else {
        println!("No state stored under {}", root.display());
        return Ok(());
    };

    println!("version: {}", state.state_version().unwrap_or_default());
    println!("hash: {}", state.hash()?);
    println!("elements: {}", state.len());
    for (source, updated) in state.sources_update_dates() {
        println!("source {}: updated {}", source, updated.to_rfc3339());
    }

    if let Some(hours) = stale_hours {
        for source in state.stale_sources(Duration::hours(hours), Utc::now()) {
            println!("stale: {}", source);
        }
    }

    if list {
        let index = state.path_index();
        for id in state.list() {
            let paths: Vec<String> = index.paths_for(&id).iter().map(ToString::to_string).collect();
            if paths.is_empty() {
                println!("{}", id);
            } else {
                println!("{}  [{}]", id, paths.join(", "));
            }
        }
    }
    Ok(())
}

pub fn clear(root: PathBuf) -> anyhow::Result<()> {
    tracing::info!("Clearing state for: {}", root.display());
    clear_state(&root)?;
    tracing::info!("State cleared");
    Ok(())
}
