use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};

use crate::record::Record;

/// Sparse record cache keyed by record index.
///
/// A missing key means "not loaded yet", never "absent from the recording".
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: BTreeMap<usize, Record>,
}

impl RecordStore {
    pub fn new() -> Self {
        RecordStore::default()
    }

    pub fn contains(&self, r: usize) -> bool {
        self.records.contains_key(&r)
    }

    pub fn get(&self, r: usize) -> Option<&Record> {
        self.records.get(&r)
    }

    pub fn get_mut(&mut self, r: usize) -> Option<&mut Record> {
        self.records.get_mut(&r)
    }

    pub fn insert(&mut self, r: usize, record: Record) {
        self.records.insert(r, record);
    }

    pub fn remove(&mut self, r: usize) -> Option<Record> {
        self.records.remove(&r)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = usize> + '_ {
        self.records.keys().copied()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, usize, Record> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> btree_map::IterMut<'_, usize, Record> {
        self.records.iter_mut()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Keeps only the records whose index is in `keep`, preserving indices.
    pub fn retain_indices(&mut self, keep: &BTreeSet<usize>) {
        self.records.retain(|r, _| keep.contains(r));
    }

    /// Applies `f` to every cached record.
    pub fn for_each_mut<F: FnMut(&mut Record)>(&mut self, mut f: F) {
        for record in self.records.values_mut() {
            f(record);
        }
    }
}

impl FromIterator<(usize, Record)> for RecordStore {
    fn from_iter<I: IntoIterator<Item = (usize, Record)>>(iter: I) -> Self {
        RecordStore {
            records: iter.into_iter().collect(),
        }
    }
}
