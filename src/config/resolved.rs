//! Resolved entity model: config validated and flattened for runtime use.

use crate::config::{FieldType, OnDelete, ValidationRule};
use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashMap;

pub const ID_FIELD: &str = "id";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Fields every entity carries and the store maintains.
pub const MANAGED_FIELDS: [&str; 3] = [ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD];

/// Keys with meaning inside a filter clause; never usable as field or relation names.
pub const FILTER_KEYWORDS: [&str; 4] = ["equals", "some", "every", "none"];

/// Direction of a relation: to_one (we hold the FK) or to_many (they hold an FK to us).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationDirection {
    ToOne,
    ToMany,
}

/// A relation field usable in filters and includes (e.g. `note.owner`, `user.notes`).
#[derive(Clone, Debug)]
pub struct RelationSpec {
    pub name: String,
    pub direction: RelationDirection,
    /// Relationship id; keys the store's reverse index.
    pub relationship_id: String,
    pub related_entity: String,
    /// Our field used in the join (our FK for to_one; our id for to_many).
    pub our_key: String,
    /// Their field used in the join (their id for to_one; their FK for to_many).
    pub their_key: String,
    pub on_delete: OnDelete,
}

#[derive(Clone, Debug)]
pub struct FieldInfo {
    pub name: String,
    pub type_: FieldType,
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<serde_json::Value>,
    /// Set when the store maintains the value (id, timestamps).
    pub managed: bool,
}

impl FieldInfo {
    pub fn is_required(&self) -> bool {
        !self.nullable && self.default.is_none() && !self.managed
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub name: String,
    pub fields: Vec<FieldInfo>,
    pub relations: Vec<RelationSpec>,
    pub validation: HashMap<String, ValidationRule>,
    /// Compiled `pattern` rules, keyed by field.
    pub patterns: HashMap<String, Regex>,
}

impl ResolvedEntity {
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn to_one_relations(&self) -> impl Iterator<Item = &RelationSpec> {
        self.relations
            .iter()
            .filter(|r| r.direction == RelationDirection::ToOne)
    }

    pub fn to_many_relations(&self) -> impl Iterator<Item = &RelationSpec> {
        self.relations
            .iter()
            .filter(|r| r.direction == RelationDirection::ToMany)
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter().filter(|f| f.unique)
    }
}

pub(crate) fn compile_patterns(
    entity: &str,
    rules: &HashMap<String, ValidationRule>,
) -> Result<HashMap<String, Regex>, ConfigError> {
    let mut patterns = HashMap::new();
    for (col, rule) in rules {
        if let Some(pattern) = &rule.pattern {
            let re = Regex::new(pattern).map_err(|err| {
                ConfigError::Validation(format!("{}.{}: invalid pattern: {}", entity, col, err))
            })?;
            patterns.insert(col.clone(), re);
        }
    }
    Ok(patterns)
}

#[derive(Clone, Debug)]
pub struct ResolvedModel {
    pub entities: Vec<ResolvedEntity>,
    pub entity_by_name: HashMap<String, ResolvedEntity>,
}

impl ResolvedModel {
    pub fn entity(&self, name: &str) -> Option<&ResolvedEntity> {
        self.entity_by_name.get(name)
    }
}
