use std::ops::AddAssign;

use serde::Serialize;

use crate::scanner::{DefinitionRecord, ScanResult};

/// Partition of the union of both key sets. Every list is sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
    pub unchanged: Vec<String>,
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub unchanged: usize,
}

impl AddAssign for Counts {
    fn add_assign(&mut self, rhs: Self) {
        self.added += rhs.added;
        self.removed += rhs.removed;
        self.changed += rhs.changed;
        self.unchanged += rhs.unchanged;
    }
}

impl DiffResult {
    pub fn counts(&self) -> Counts {
        Counts {
            added: self.added.len(),
            removed: self.removed.len(),
            changed: self.changed.len(),
            unchanged: self.unchanged.len(),
        }
    }
}

/// Classifies every key of `old` and `new` by presence and content hash.
pub fn diff_definitions(old: &ScanResult, new: &ScanResult) -> DiffResult {
    let mut result = DiffResult::default();

    for (key, old_rec) in old.iter() {
        match new.get(key) {
            None => result.removed.push(key.to_string()),
            Some(new_rec) if new_rec.hash == old_rec.hash => {
                result.unchanged.push(key.to_string())
            }
            Some(_) => result.changed.push(key.to_string()),
        }
    }
    result.added = new
        .keys()
        .filter(|k| !old.contains_key(k))
        .map(str::to_string)
        .collect();

    result.added.sort();
    result.removed.sort();
    result.changed.sort();
    result.unchanged.sort();
    result
}

/// Both scans of one file pair together with their diff.
#[derive(Debug, Clone)]
pub struct PairDiff {
    pub old: ScanResult,
    pub new: ScanResult,
    pub diff: DiffResult,
}

impl PairDiff {
    pub fn new(old: ScanResult, new: ScanResult) -> Self {
        let diff = diff_definitions(&old, &new);
        PairDiff { old, new, diff }
    }

    pub fn counts(&self) -> Counts {
        self.diff.counts()
    }

    pub fn added(&self) -> impl Iterator<Item = (&str, &DefinitionRecord)> {
        self.diff
            .added
            .iter()
            .filter_map(move |k| self.new.get(k).map(|rec| (k.as_str(), rec)))
    }

    pub fn removed(&self) -> impl Iterator<Item = (&str, &DefinitionRecord)> {
        self.diff
            .removed
            .iter()
            .filter_map(move |k| self.old.get(k).map(|rec| (k.as_str(), rec)))
    }

    /// Yields `(key, old record, new record)`.
    pub fn changed(&self) -> impl Iterator<Item = (&str, &DefinitionRecord, &DefinitionRecord)> {
        self.diff.changed.iter().filter_map(move |k| {
            let old = self.old.get(k)?;
            let new = self.new.get(k)?;
            Some((k.as_str(), old, new))
        })
    }
}
