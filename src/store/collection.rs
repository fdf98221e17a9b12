//! One ordered collection of records.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// A stored record: field name to JSON value, always including `id`.
pub type Record = Map<String, Value>;

/// Records keyed by an insertion sequence number, so iteration order is
/// insertion order no matter how many records were removed in between.
#[derive(Clone, Debug, Default)]
pub struct Collection {
    records: BTreeMap<u64, Record>,
    seq_by_id: HashMap<String, u64>,
    next_seq: u64,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seq_by_id.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.seq_by_id.get(id).and_then(|seq| self.records.get(seq))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub(crate) fn seq_of(&self, id: &str) -> Option<u64> {
        self.seq_by_id.get(id).copied()
    }

    /// Appends a record; caller guarantees `id` is not present.
    pub(crate) fn push(&mut self, id: String, record: Record) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.seq_by_id.insert(id, seq);
        self.records.insert(seq, record);
        seq
    }

    /// Swaps the record in place, keeping its position. Returns the previous record.
    pub(crate) fn replace(&mut self, id: &str, record: Record) -> Option<Record> {
        let seq = self.seq_by_id.get(id)?;
        self.records.insert(*seq, record)
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Record> {
        let seq = self.seq_by_id.remove(id)?;
        self.records.remove(&seq)
    }
}
