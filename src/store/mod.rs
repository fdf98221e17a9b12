//! Entity store: ordered collections plus the indexes that keep relation
//! lookups and uniqueness checks proportional to the number of matches.
//!
//! The store checks referential integrity and uniqueness before touching any
//! collection, so a failed call leaves it exactly as it was.

mod collection;
mod index;

pub use collection::{Collection, Record};
pub use index::{RelationIndex, UniqueIndex};

use crate::config::{
    dependents_of, FieldInfo, OnDelete, ResolvedEntity, ResolvedModel, CREATED_AT_FIELD, ID_FIELD,
    UPDATED_AT_FIELD,
};
use crate::error::StoreError;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Clone, Debug, Default)]
pub struct Store {
    collections: HashMap<String, Collection>,
    /// Keyed by relationship id.
    relations: HashMap<String, RelationIndex>,
    /// Keyed by (entity, field).
    unique: HashMap<(String, String), UniqueIndex>,
    /// Ids of removed records, per entity. Never handed out again.
    retired: HashMap<String, HashSet<String>>,
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn indexed_unique_fields(entity: &ResolvedEntity) -> impl Iterator<Item = &FieldInfo> {
    entity.unique_fields().filter(|f| f.name != ID_FIELD)
}

impl Store {
    pub fn new(model: &ResolvedModel) -> Self {
        let mut store = Store::default();
        for entity in &model.entities {
            store.collections.insert(entity.name.clone(), Collection::new());
            for f in indexed_unique_fields(entity) {
                store
                    .unique
                    .insert((entity.name.clone(), f.name.clone()), UniqueIndex::new());
            }
            for rel in entity.to_one_relations() {
                store
                    .relations
                    .insert(rel.relationship_id.clone(), RelationIndex::new());
            }
        }
        store
    }

    pub fn collection(&self, entity: &str) -> Option<&Collection> {
        self.collections.get(entity)
    }

    fn collection_for(&self, entity: &str) -> Result<&Collection, StoreError> {
        self.collections
            .get(entity)
            .ok_or_else(|| StoreError::Schema(format!("unknown entity: {}", entity)))
    }

    fn collection_mut(&mut self, entity: &str) -> Result<&mut Collection, StoreError> {
        self.collections
            .get_mut(entity)
            .ok_or_else(|| StoreError::Schema(format!("unknown entity: {}", entity)))
    }

    pub fn get_by_id(&self, entity: &str, id: &str) -> Option<&Record> {
        self.collections.get(entity)?.get(id)
    }

    /// All records of an entity in insertion order.
    pub fn iter<'a>(&'a self, entity: &str) -> impl Iterator<Item = &'a Record> + 'a {
        self.collections.get(entity).into_iter().flat_map(Collection::iter)
    }

    pub fn len(&self, entity: &str) -> usize {
        self.collections.get(entity).map(Collection::len).unwrap_or(0)
    }

    /// Ids of the records pointing at `parent_id` through a relationship, in insertion order.
    pub fn children<'a>(
        &'a self,
        relationship_id: &str,
        parent_id: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.relations
            .get(relationship_id)
            .into_iter()
            .flat_map(move |idx| idx.children(parent_id))
    }

    pub fn is_retired(&self, entity: &str, id: &str) -> bool {
        self.retired
            .get(entity)
            .map(|ids| ids.contains(id))
            .unwrap_or(false)
    }

    /// Appends a record, assigning an id when it has none. Stamps `createdAt` / `updatedAt`
    /// unless provided.
    pub fn insert(&mut self, entity: &ResolvedEntity, mut record: Record) -> Result<Record, StoreError> {
        let id = match record.get(ID_FIELD) {
            None | Some(Value::Null) => uuid::Uuid::new_v4().to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(StoreError::Validation(format!(
                    "{}.id must be a string, got {}",
                    entity.name, other
                )))
            }
        };
        let collection = self.collection_for(&entity.name)?;
        if collection.contains(&id) || self.is_retired(&entity.name, &id) {
            return Err(StoreError::Conflict(format!(
                "{} id '{}' is already in use",
                entity.name, id
            )));
        }

        let now = timestamp();
        record.insert(ID_FIELD.into(), Value::String(id.clone()));
        for field in [CREATED_AT_FIELD, UPDATED_AT_FIELD] {
            if record.get(field).map_or(true, Value::is_null) {
                record.insert(field.into(), Value::String(now.clone()));
            }
        }

        self.check_references(entity, &record)?;
        self.check_unique(entity, &record, None)?;

        let seq = self.collection_mut(&entity.name)?.push(id.clone(), record.clone());
        self.index_record(entity, &id, seq, &record);
        tracing::debug!(entity = %entity.name, id = %id, "insert");
        Ok(record)
    }

    /// Swaps the stored record for `record`, keeping id, position and `createdAt`.
    pub fn replace(
        &mut self,
        entity: &ResolvedEntity,
        id: &str,
        mut record: Record,
    ) -> Result<Record, StoreError> {
        let collection = self.collection_for(&entity.name)?;
        let (seq, previous) = match (collection.seq_of(id), collection.get(id)) {
            (Some(seq), Some(prev)) => (seq, prev.clone()),
            _ => return Err(StoreError::not_found(&entity.name, id)),
        };

        record.insert(ID_FIELD.into(), Value::String(id.to_string()));
        if let Some(created) = previous.get(CREATED_AT_FIELD) {
            record.insert(CREATED_AT_FIELD.into(), created.clone());
        }
        record.insert(UPDATED_AT_FIELD.into(), Value::String(timestamp()));

        self.check_references(entity, &record)?;
        self.check_unique(entity, &record, Some(id))?;

        self.collection_mut(&entity.name)?.replace(id, record.clone());
        self.unindex_record(entity, id, seq, &previous);
        self.index_record(entity, id, seq, &record);
        tracing::debug!(entity = %entity.name, id = %id, "replace");
        Ok(record)
    }

    /// Removes a record and, following each relationship's `on_delete`, its dependents.
    /// Returns every removed record (entity name, record), the requested one first.
    pub fn remove_by_id(
        &mut self,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        id: &str,
    ) -> Result<Vec<(String, Record)>, StoreError> {
        self.collection_for(&entity.name)?;
        if self.get_by_id(&entity.name, id).is_none() {
            return Err(StoreError::not_found(&entity.name, id));
        }
        let plan = self.plan_removal(model, entity, id)?;
        let mut removed = Vec::with_capacity(plan.len());
        for (target, target_id) in plan {
            if let Some(record) = self.detach(model, target, &target_id) {
                removed.push((target.name.clone(), record));
            }
        }
        Ok(removed)
    }

    /// Walks dependents breadth-first. Fails before anything is removed when a
    /// `restrict` relationship still has children.
    fn plan_removal<'m>(
        &self,
        model: &'m ResolvedModel,
        entity: &'m ResolvedEntity,
        id: &str,
    ) -> Result<Vec<(&'m ResolvedEntity, String)>, StoreError> {
        let mut planned = Vec::new();
        let mut seen: HashSet<(&str, String)> = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back((entity, id.to_string()));

        while let Some((target, target_id)) = queue.pop_front() {
            if !seen.insert((target.name.as_str(), target_id.clone())) {
                continue;
            }
            for (child, rel) in dependents_of(model, &target.name) {
                let children: Vec<String> = self
                    .children(&rel.relationship_id, &target_id)
                    .map(str::to_string)
                    .collect();
                if children.is_empty() {
                    continue;
                }
                match rel.on_delete {
                    OnDelete::Restrict => {
                        return Err(StoreError::Conflict(format!(
                            "cannot delete {} '{}': {} {} record(s) still reference it through {}",
                            target.name,
                            target_id,
                            children.len(),
                            child.name,
                            rel.our_key
                        )));
                    }
                    OnDelete::Cascade => {
                        tracing::debug!(
                            entity = %target.name,
                            id = %target_id,
                            dependents = children.len(),
                            related = %child.name,
                            "cascade"
                        );
                        queue.extend(children.into_iter().map(|child_id| (child, child_id)));
                    }
                }
            }
            planned.push((target, target_id));
        }
        Ok(planned)
    }

    fn detach(&mut self, model: &ResolvedModel, entity: &ResolvedEntity, id: &str) -> Option<Record> {
        let collection = self.collections.get_mut(&entity.name)?;
        let seq = collection.seq_of(id)?;
        let record = collection.remove(id)?;
        self.unindex_record(entity, id, seq, &record);
        for (_, rel) in dependents_of(model, &entity.name) {
            if let Some(idx) = self.relations.get_mut(&rel.relationship_id) {
                idx.remove_parent(id);
            }
        }
        self.retired
            .entry(entity.name.clone())
            .or_default()
            .insert(id.to_string());
        tracing::debug!(entity = %entity.name, id = %id, "remove");
        Some(record)
    }

    fn check_references(&self, entity: &ResolvedEntity, record: &Record) -> Result<(), StoreError> {
        for rel in entity.to_one_relations() {
            match record.get(&rel.our_key) {
                None | Some(Value::Null) => {}
                Some(Value::String(target)) => {
                    if self.get_by_id(&rel.related_entity, target).is_none() {
                        return Err(StoreError::Reference {
                            entity: entity.name.clone(),
                            field: rel.our_key.clone(),
                            id: target.clone(),
                        });
                    }
                }
                Some(other) => {
                    return Err(StoreError::Validation(format!(
                        "{}.{} must be a string id, got {}",
                        entity.name, rel.our_key, other
                    )))
                }
            }
        }
        Ok(())
    }

    fn check_unique(
        &self,
        entity: &ResolvedEntity,
        record: &Record,
        except_id: Option<&str>,
    ) -> Result<(), StoreError> {
        for f in indexed_unique_fields(entity) {
            let Some(value) = record.get(&f.name) else { continue };
            let Some(idx) = self.unique.get(&(entity.name.clone(), f.name.clone())) else { continue };
            if let Some(owner) = idx.owner(value) {
                if Some(owner) != except_id {
                    return Err(StoreError::Conflict(format!(
                        "{}.{} {} is already taken",
                        entity.name, f.name, value
                    )));
                }
            }
        }
        Ok(())
    }

    fn index_record(&mut self, entity: &ResolvedEntity, id: &str, seq: u64, record: &Record) {
        for rel in entity.to_one_relations() {
            if let Some(parent) = record.get(&rel.our_key).and_then(Value::as_str) {
                self.relations
                    .entry(rel.relationship_id.clone())
                    .or_default()
                    .insert(parent, seq, id);
            }
        }
        for f in indexed_unique_fields(entity) {
            if let Some(value) = record.get(&f.name) {
                self.unique
                    .entry((entity.name.clone(), f.name.clone()))
                    .or_default()
                    .insert(value, id);
            }
        }
    }

    fn unindex_record(&mut self, entity: &ResolvedEntity, id: &str, seq: u64, record: &Record) {
        for rel in entity.to_one_relations() {
            if let Some(parent) = record.get(&rel.our_key).and_then(Value::as_str) {
                if let Some(idx) = self.relations.get_mut(&rel.relationship_id) {
                    idx.remove(parent, seq);
                }
            }
        }
        for f in indexed_unique_fields(entity) {
            if let Some(value) = record.get(&f.name) {
                if let Some(idx) = self.unique.get_mut(&(entity.name.clone(), f.name.clone())) {
                    idx.remove(value, id);
                }
            }
        }
    }
}
