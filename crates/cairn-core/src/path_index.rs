//! Element id → source path mapping

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::id::ElemID;
use crate::model::{Element, Fragment, SourcePath};

/// For every canonical id, the source paths it is serialized under.
///
/// A top-level id maps to every path any of its fragments carried. When an
/// element spans more than one path, each of its field ids maps to the path of
/// the fragment that defined it, so a printer can put every field back where it
/// came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathIndex {
    entries: BTreeMap<ElemID, Vec<SourcePath>>,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from unmerged fragments.
    pub fn from_fragments(fragments: &[Fragment]) -> Self {
        let mut top: BTreeMap<ElemID, BTreeSet<SourcePath>> = BTreeMap::new();
        let mut nested: BTreeMap<ElemID, BTreeSet<SourcePath>> = BTreeMap::new();

        for fragment in fragments {
            let paths = fragment.element.paths();
            if paths.is_empty() {
                continue;
            }
            top.entry(fragment.merge_key())
                .or_default()
                .extend(paths.iter().cloned());
            if let Element::Object(object) = &fragment.element {
                for field in object.fields.values() {
                    nested
                        .entry(field.elem_id.clone())
                        .or_default()
                        .extend(paths.iter().cloned());
                }
            }
        }

        let mut entries = BTreeMap::new();
        for (id, paths) in top {
            if paths.len() > 1 {
                for (field_id, field_paths) in nested.range(id.clone()..) {
                    if field_id.top_level_parent() != id {
                        break;
                    }
                    entries.insert(field_id.clone(), field_paths.iter().cloned().collect());
                }
            }
            entries.insert(id, paths.into_iter().collect());
        }
        PathIndex { entries }
    }

    /// Incremental refresh: drop the entries owned by the refreshed sources and
    /// those of every element the new fragments touch, then add the fresh
    /// entries. Entries of all other elements stay as they are.
    pub fn update(&mut self, fragments: &[Fragment], refreshed_sources: &[String]) {
        let fresh = PathIndex::from_fragments(fragments);
        let touched: BTreeSet<ElemID> = fresh
            .entries
            .keys()
            .map(ElemID::top_level_parent)
            .collect();
        self.entries.retain(|id, _| {
            !refreshed_sources.iter().any(|s| s == id.adapter())
                && !touched.contains(&id.top_level_parent())
        });
        self.entries.extend(fresh.entries);
    }

    /// Full refresh: the index afterwards reflects only `fragments`.
    pub fn overwrite(&mut self, fragments: &[Fragment]) {
        *self = PathIndex::from_fragments(fragments);
    }

    pub fn insert(&mut self, id: ElemID, mut paths: Vec<SourcePath>) {
        paths.sort();
        paths.dedup();
        self.entries.insert(id, paths);
    }

    /// Remove an element's entry and the entries nested under it.
    pub fn remove(&mut self, id: &ElemID) {
        self.entries
            .retain(|entry, _| entry != id && &entry.top_level_parent() != id);
    }

    /// Paths recorded for exactly this id.
    pub fn paths(&self, id: &ElemID) -> Option<&[SourcePath]> {
        self.entries.get(id).map(Vec::as_slice)
    }

    /// Paths for an id, falling back to the closest recorded ancestor.
    pub fn paths_for(&self, id: &ElemID) -> &[SourcePath] {
        let mut current = id.clone();
        loop {
            if let Some(paths) = self.entries.get(&current) {
                return paths;
            }
            if current.is_top_level() {
                return &[];
            }
            current = current.parent();
        }
    }

    /// Sources owning at least one entry.
    pub fn sources(&self) -> BTreeSet<String> {
        self.entries
            .keys()
            .map(|id| id.adapter().to_string())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ElemID, &[SourcePath])> {
        self.entries.iter().map(|(id, paths)| (id, paths.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
