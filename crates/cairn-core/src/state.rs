//! Workspace state: the canonical snapshot and its bookkeeping

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::StateError;
use crate::id::ElemID;
use crate::model::{Element, Fragment};
use crate::path_index::PathIndex;

/// Schema version of [`StateData`] this engine reads and writes.
pub const STATE_VERSION: &str = "1";

/// The persisted record: canonical elements, per-source update dates, path
/// index, schema version and content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateData {
    pub version: Option<String>,
    #[serde(default)]
    pub elements: BTreeMap<ElemID, Element>,
    #[serde(default)]
    pub sources_update_dates: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub path_index: PathIndex,
    #[serde(default)]
    pub hash: Option<String>,
}

impl StateData {
    pub fn new() -> Self {
        StateData {
            version: Some(STATE_VERSION.to_string()),
            elements: BTreeMap::new(),
            sources_update_dates: BTreeMap::new(),
            path_index: PathIndex::new(),
            hash: None,
        }
    }

    /// SHA-256 (hex) over the element map and the path index.
    pub fn compute_hash(&self) -> Result<String, StateError> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&self.elements)?);
        hasher.update(b"\n");
        hasher.update(serde_json::to_vec(&self.path_index)?);
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Sources that currently own at least one element.
    pub fn existing_sources(&self) -> BTreeSet<String> {
        self.elements
            .keys()
            .filter(|id| !id.is_builtin())
            .map(|id| id.adapter().to_string())
            .collect()
    }

    fn apply_override(&mut self, incoming: &[Element], sources: Option<&[String]>, now: DateTime<Utc>) {
        match sources {
            Some(sources) => {
                self.elements
                    .retain(|id, _| !sources.iter().any(|s| s == id.adapter()));
                for source in sources {
                    self.sources_update_dates.insert(source.clone(), now);
                }
            }
            None => {
                self.elements.clear();
                self.sources_update_dates.clear();
            }
        }
        for element in incoming {
            self.elements.insert(element.elem_id().clone(), element.clone());
        }
        if sources.is_none() {
            for source in self.existing_sources() {
                self.sources_update_dates.insert(source, now);
            }
        }
    }

    pub(crate) fn check_version(&self) -> Result<(), StateError> {
        match self.version.as_deref() {
            Some(STATE_VERSION) => Ok(()),
            other => Err(StateError::VersionMismatch {
                found: other.map(str::to_string),
                expected: STATE_VERSION.to_string(),
            }),
        }
    }
}

impl Default for StateData {
    fn default() -> Self {
        Self::new()
    }
}

/// Live workspace state. Readers get immutable snapshots; every mutation
/// builds a new snapshot and swaps it in, so a reader sees either the state
/// before a mutation or after it.
pub struct WorkspaceState {
    snapshot: ArcSwap<StateData>,
}

impl WorkspaceState {
    pub fn new() -> Self {
        WorkspaceState {
            snapshot: ArcSwap::from_pointee(StateData::new()),
        }
    }

    /// Adopt a loaded record. A record written under another schema version
    /// is refused.
    pub fn from_data(data: StateData) -> Result<Self, StateError> {
        data.check_version()?;
        Ok(WorkspaceState {
            snapshot: ArcSwap::from_pointee(data),
        })
    }

    pub fn snapshot(&self) -> Arc<StateData> {
        self.snapshot.load_full()
    }

    pub fn get(&self, id: &ElemID) -> Option<Element> {
        self.snapshot.load().elements.get(id).cloned()
    }

    /// All canonical elements, sorted by id.
    pub fn get_all(&self) -> Vec<Element> {
        self.snapshot.load().elements.values().cloned().collect()
    }

    pub fn list(&self) -> Vec<ElemID> {
        self.snapshot.load().elements.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.load().elements.is_empty()
    }

    pub fn set(&self, element: Element) {
        self.snapshot.rcu(|current| {
            let mut next = StateData::clone(current);
            next.elements.insert(element.elem_id().clone(), element.clone());
            next
        });
    }

    pub fn remove(&self, id: &ElemID) {
        self.snapshot.rcu(|current| {
            let mut next = StateData::clone(current);
            next.elements.remove(id);
            next.path_index.remove(id);
            next
        });
    }

    /// Replace the canonical elements of `sources` (all elements when `None`)
    /// with `elements`, stamping the replaced sources with the current time.
    pub fn override_elements(&self, elements: Vec<Element>, sources: Option<&[String]>) {
        self.override_at(elements, sources, Utc::now());
    }

    /// [`WorkspaceState::override_elements`] with an explicit timestamp.
    ///
    /// With `Some(sources)`, elements and dates of every other source are left
    /// exactly as they were, and incoming elements owned by another source are
    /// skipped. With `None`, the snapshot is replaced wholesale and dates of
    /// sources that no longer own anything are dropped.
    pub fn override_at(&self, elements: Vec<Element>, sources: Option<&[String]>, now: DateTime<Utc>) {
        let incoming = owned_elements(elements, sources);
        self.snapshot.rcu(|current| {
            let mut next = StateData::clone(current);
            next.apply_override(&incoming, sources, now);
            next
        });
        debug!(count = incoming.len(), partial = sources.is_some(), "State overridden");
    }

    /// Commit a partial refresh of `sources`: their elements, dates and path
    /// index entries are replaced in one swap, so no reader sees new elements
    /// next to the old index. Elements and fragments of other sources are
    /// ignored.
    pub fn refresh_sources(&self, elements: Vec<Element>, unmerged: &[Fragment], sources: &[String]) {
        self.refresh_sources_at(elements, unmerged, sources, Utc::now());
    }

    /// [`WorkspaceState::refresh_sources`] with an explicit timestamp.
    pub fn refresh_sources_at(
        &self,
        elements: Vec<Element>,
        unmerged: &[Fragment],
        sources: &[String],
        now: DateTime<Utc>,
    ) {
        let incoming = owned_elements(elements, Some(sources));
        let fragments = owned_fragments(unmerged, |source| sources.iter().any(|s| s == source));
        self.snapshot.rcu(|current| {
            let mut next = StateData::clone(current);
            next.apply_override(&incoming, Some(sources), now);
            next.path_index.update(&fragments, sources);
            next
        });
        debug!(count = incoming.len(), sources = sources.len(), "Sources refreshed");
    }

    /// Last successful update per source.
    pub fn sources_update_dates(&self) -> BTreeMap<String, DateTime<Utc>> {
        self.snapshot.load().sources_update_dates.clone()
    }

    pub fn existing_sources(&self) -> BTreeSet<String> {
        self.snapshot.load().existing_sources()
    }

    /// Sources last updated more than `max_age` before `now`, plus sources
    /// that own elements but were never stamped.
    pub fn stale_sources(&self, max_age: Duration, now: DateTime<Utc>) -> Vec<String> {
        let snapshot = self.snapshot.load();
        let mut known: BTreeSet<String> = snapshot.existing_sources();
        known.extend(snapshot.sources_update_dates.keys().cloned());
        known
            .into_iter()
            .filter(|source| match snapshot.sources_update_dates.get(source) {
                Some(updated) => now - *updated > max_age,
                None => true,
            })
            .collect()
    }

    /// Incremental path index refresh. Entries of `preserve` sources are kept
    /// as they are; fragments owned by them are ignored.
    pub fn update_path_index(&self, unmerged: &[Fragment], preserve: &[String]) {
        let fragments = owned_fragments(unmerged, |source| !preserve.iter().any(|s| s == source));
        self.snapshot.rcu(|current| {
            let mut next = StateData::clone(current);
            let mut refreshed: BTreeSet<String> = next.path_index.sources();
            refreshed.extend(fragments.iter().map(|f| f.source().to_string()));
            let refreshed: Vec<String> = refreshed
                .into_iter()
                .filter(|s| !preserve.contains(s))
                .collect();
            next.path_index.update(&fragments, &refreshed);
            next
        });
    }

    /// Rebuild the path index from `unmerged` alone.
    pub fn override_path_index(&self, unmerged: &[Fragment]) {
        self.snapshot.rcu(|current| {
            let mut next = StateData::clone(current);
            next.path_index.overwrite(unmerged);
            next
        });
    }

    pub fn path_index(&self) -> PathIndex {
        self.snapshot.load().path_index.clone()
    }

    /// Content hash of the current snapshot.
    pub fn hash(&self) -> Result<String, StateError> {
        self.snapshot.load().compute_hash()
    }

    pub fn state_version(&self) -> Option<String> {
        self.snapshot.load().version.clone()
    }
}

/// Incoming elements owned by `sources`; everything when `None`.
fn owned_elements(elements: Vec<Element>, sources: Option<&[String]>) -> Vec<Element> {
    let Some(sources) = sources else {
        return elements;
    };
    elements
        .into_iter()
        .filter(|element| {
            let owned = sources.iter().any(|s| s == element.source());
            if !owned {
                warn!(
                    elem_id = %element.elem_id(),
                    "Skipping element outside the overridden sources"
                );
            }
            owned
        })
        .collect()
}

fn owned_fragments(unmerged: &[Fragment], keep: impl Fn(&str) -> bool) -> Vec<Fragment> {
    unmerged
        .iter()
        .filter(|fragment| {
            let owned = keep(fragment.source());
            if !owned {
                warn!(
                    elem_id = %fragment.element.elem_id(),
                    origin = %fragment.origin,
                    "Skipping path of a fragment outside the refreshed sources"
                );
            }
            owned
        })
        .cloned()
        .collect()
}

impl Default for WorkspaceState {
    fn default() -> Self {
        Self::new()
    }
}
