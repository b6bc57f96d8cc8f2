//! Snapshot diff between two canonical element sets

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::ElemID;
use crate::model::Element;

/// What changed between two snapshots. Id lists are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDiff {
    /// Monotonically increasing diff sequence number.
    pub sequence: u64,
    pub added: Vec<ElemID>,
    pub removed: Vec<ElemID>,
    pub modified: Vec<ElemID>,
}

impl ElementDiff {
    pub fn new(sequence: u64) -> Self {
        ElementDiff {
            sequence,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

/// Compare two element maps keyed by id.
pub fn diff_elements(old: &BTreeMap<ElemID, Element>, new: &BTreeMap<ElemID, Element>) -> ElementDiff {
    let mut diff = ElementDiff::default();
    for (id, element) in new {
        match old.get(id) {
            None => diff.added.push(id.clone()),
            Some(previous) if previous != element => diff.modified.push(id.clone()),
            Some(_) => {}
        }
    }
    diff.removed = old.keys().filter(|id| !new.contains_key(id)).cloned().collect();
    diff
}

/// Numbers successive diffs of one workspace.
pub struct DiffEngine {
    sequence: u64,
}

impl DiffEngine {
    pub fn new() -> Self {
        DiffEngine { sequence: 0 }
    }

    /// Diff two snapshots and stamp the result with the next sequence number.
    pub fn compute_diff(
        &mut self,
        old: &BTreeMap<ElemID, Element>,
        new: &BTreeMap<ElemID, Element>,
    ) -> ElementDiff {
        let mut diff = diff_elements(old, new);
        self.sequence += 1;
        diff.sequence = self.sequence;
        diff
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new()
    }
}
