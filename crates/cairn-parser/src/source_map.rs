//! Element id → source location mapping for parsed units

use std::collections::BTreeMap;

use cairn_core::ElemID;
use serde::{Deserialize, Serialize};

/// Where a construct starts in a source unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceLocation {
    pub origin: String,
    pub line: u32,
    pub col: u32,
}

/// Every location an element (or one of its fields) was declared at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceMap {
    entries: BTreeMap<ElemID, Vec<SourceLocation>>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: ElemID, location: SourceLocation) {
        self.entries.entry(id).or_default().push(location);
    }

    /// Fold another map into this one, keeping locations sorted.
    pub fn merge(&mut self, other: SourceMap) {
        for (id, locations) in other.entries {
            let entry = self.entries.entry(id).or_default();
            entry.extend(locations);
            entry.sort();
            entry.dedup();
        }
    }

    pub fn get(&self, id: &ElemID) -> &[SourceLocation] {
        self.entries.get(id).map_or(&[], Vec::as_slice)
    }

    /// Source units an element was declared in.
    pub fn origins(&self, id: &ElemID) -> Vec<&str> {
        let mut origins: Vec<&str> = self.get(id).iter().map(|l| l.origin.as_str()).collect();
        origins.dedup();
        origins
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ElemID, &[SourceLocation])> {
        self.entries.iter().map(|(id, locations)| (id, locations.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
