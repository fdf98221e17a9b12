//! Secondary indexes kept in step with every mutation.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Reverse index for one relationship: parent id -> child ids, ordered by the
/// child's insertion sequence.
#[derive(Clone, Debug, Default)]
pub struct RelationIndex {
    children: HashMap<String, BTreeMap<u64, String>>,
}

impl RelationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, parent_id: &str, child_seq: u64, child_id: &str) {
        self.children
            .entry(parent_id.to_string())
            .or_default()
            .insert(child_seq, child_id.to_string());
    }

    pub fn remove(&mut self, parent_id: &str, child_seq: u64) {
        if let Some(set) = self.children.get_mut(parent_id) {
            set.remove(&child_seq);
            if set.is_empty() {
                self.children.remove(parent_id);
            }
        }
    }

    pub fn remove_parent(&mut self, parent_id: &str) {
        self.children.remove(parent_id);
    }

    pub fn children(&self, parent_id: &str) -> impl Iterator<Item = &str> {
        self.children
            .get(parent_id)
            .into_iter()
            .flat_map(|set| set.values().map(String::as_str))
    }

    pub fn has_children(&self, parent_id: &str) -> bool {
        self.children.contains_key(parent_id)
    }
}

/// Unique index for one field: value -> owning record id. Nulls are not indexed.
#[derive(Clone, Debug, Default)]
pub struct UniqueIndex {
    owners: HashMap<String, String>,
}

impl UniqueIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(value: &Value) -> Option<String> {
        match value {
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn owner(&self, value: &Value) -> Option<&str> {
        Self::key(value).and_then(|k| self.owners.get(&k).map(String::as_str))
    }

    pub fn insert(&mut self, value: &Value, id: &str) {
        if let Some(k) = Self::key(value) {
            self.owners.insert(k, id.to_string());
        }
    }

    pub fn remove(&mut self, value: &Value, id: &str) {
        if let Some(k) = Self::key(value) {
            if self.owners.get(&k).map(String::as_str) == Some(id) {
                self.owners.remove(&k);
            }
        }
    }
}
