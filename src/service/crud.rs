//! Generic CRUD over the in-memory store: the only sanctioned way to read and change records.

use crate::config::{RelationDirection, ResolvedEntity, ID_FIELD};
use crate::database::{entity_of, Database, MAX_LIST_LIMIT};
use crate::error::StoreError;
use crate::filter::{Filter, Plan};
use crate::service::RequestValidator;
use crate::store::{Record, Store};
use serde_json::Value;
use std::collections::HashMap;

const BULK_LIMIT: usize = 100;

pub struct CrudService;

fn to_value(record: &Record) -> Value {
    Value::Object(record.clone())
}

impl CrudService {
    fn plan<'d>(db: &'d Database, entity: &str, filter: &'d Filter) -> Result<Plan<'d>, StoreError> {
        let entity = entity_of(&db.model, entity)?;
        Plan::bind(&db.model, entity, filter, db.options.to_many_match)
    }

    /// First matching record in insertion order, or None.
    pub fn find_first(db: &Database, entity: &str, filter: &Filter) -> Result<Option<Value>, StoreError> {
        let plan = Self::plan(db, entity, filter)?;
        let row = plan.scan(&db.store).next().map(to_value);
        tracing::debug!(entity = %entity, filter = %filter, found = row.is_some(), "find_first");
        Ok(row)
    }

    /// All matching records in insertion order.
    pub fn find_many(db: &Database, entity: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        let plan = Self::plan(db, entity, filter)?;
        let rows: Vec<Value> = plan.scan(&db.store).map(to_value).collect();
        tracing::debug!(entity = %entity, filter = %filter, count = rows.len(), "find_many");
        Ok(rows)
    }

    pub fn count(db: &Database, entity: &str, filter: &Filter) -> Result<usize, StoreError> {
        let plan = Self::plan(db, entity, filter)?;
        Ok(plan.scan(&db.store).count())
    }

    /// Fetch one record by id. Returns None when absent.
    pub fn read(db: &Database, entity: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let entity = entity_of(&db.model, entity)?;
        Ok(db.store.get_by_id(&entity.name, id).map(to_value))
    }

    /// List matches with limit (default from options, max 1000) and offset (default 0).
    pub fn list(
        db: &Database,
        entity: &str,
        filter: &Filter,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<Value>, StoreError> {
        let limit = limit.unwrap_or(db.options.list_limit).min(MAX_LIST_LIMIT) as usize;
        let offset = offset.unwrap_or(0) as usize;
        let plan = Self::plan(db, entity, filter)?;
        let rows: Vec<Value> = plan
            .scan(&db.store)
            .skip(offset)
            .take(limit)
            .map(to_value)
            .collect();
        tracing::debug!(entity = %entity, filter = %filter, limit, offset, count = rows.len(), "list");
        Ok(rows)
    }

    /// Like `list`, with each named relation embedded under its name: to-one as an
    /// object (or null), to-many as an array in insertion order.
    pub fn list_with_includes(
        db: &Database,
        entity: &str,
        filter: &Filter,
        limit: Option<u32>,
        offset: Option<u32>,
        includes: &[&str],
    ) -> Result<Vec<Value>, StoreError> {
        let resolved = entity_of(&db.model, entity)?;
        let relations = includes
            .iter()
            .map(|name| {
                resolved.relation(name).ok_or_else(|| {
                    StoreError::Schema(format!("unknown include '{}' on {}", name, resolved.name))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows = Self::list(db, entity, filter, limit, offset)?;
        for row in rows.iter_mut() {
            let Value::Object(map) = row else { continue };
            let mut embedded = Vec::with_capacity(relations.len());
            for rel in &relations {
                let value = match rel.direction {
                    RelationDirection::ToOne => map
                        .get(&rel.our_key)
                        .and_then(Value::as_str)
                        .and_then(|id| db.store.get_by_id(&rel.related_entity, id))
                        .map(to_value)
                        .unwrap_or(Value::Null),
                    RelationDirection::ToMany => {
                        let id = map.get(ID_FIELD).and_then(Value::as_str).unwrap_or_default();
                        Value::Array(
                            db.store
                                .children(&rel.relationship_id, id)
                                .filter_map(|child| db.store.get_by_id(&rel.related_entity, child))
                                .map(to_value)
                                .collect(),
                        )
                    }
                };
                embedded.push((rel.name.clone(), value));
            }
            map.extend(embedded);
        }
        Ok(rows)
    }

    /// Insert one record; `id` is generated unless the body carries one. Returns the stored record.
    pub fn create(
        db: &mut Database,
        entity: &str,
        body: &HashMap<String, Value>,
    ) -> Result<Value, StoreError> {
        let entity = entity_of(&db.model, entity)?;
        let row = Self::create_in(&mut db.store, entity, body)?;
        Ok(to_value(&row))
    }

    fn create_in(
        store: &mut Store,
        entity: &ResolvedEntity,
        body: &HashMap<String, Value>,
    ) -> Result<Record, StoreError> {
        let record = RequestValidator::validate_create(entity, body)?;
        store.insert(entity, record)
    }

    /// Merge `patch` into the record with `id`. Returns the updated record.
    pub fn update(
        db: &mut Database,
        entity: &str,
        id: &str,
        patch: &HashMap<String, Value>,
    ) -> Result<Value, StoreError> {
        let entity = entity_of(&db.model, entity)?;
        let row = Self::update_in(&mut db.store, entity, id, patch)?;
        Ok(to_value(&row))
    }

    fn update_in(
        store: &mut Store,
        entity: &ResolvedEntity,
        id: &str,
        patch: &HashMap<String, Value>,
    ) -> Result<Record, StoreError> {
        let current = store
            .get_by_id(&entity.name, id)
            .ok_or_else(|| StoreError::not_found(&entity.name, id))?;
        let merged = RequestValidator::validate_patch(entity, current, patch)?;
        store.replace(entity, id, merged)
    }

    /// Update the first record matching `filter`. Ok(None) when nothing matches.
    pub fn update_first(
        db: &mut Database,
        entity: &str,
        filter: &Filter,
        patch: &HashMap<String, Value>,
    ) -> Result<Option<Value>, StoreError> {
        match Self::first_id(db, entity, filter)? {
            Some(id) => Self::update(db, entity, &id, patch).map(Some),
            None => Ok(None),
        }
    }

    /// Delete one record (and its cascade). Returns the deleted record.
    pub fn delete(db: &mut Database, entity: &str, id: &str) -> Result<Value, StoreError> {
        let resolved = entity_of(&db.model, entity)?;
        let removed = db.store.remove_by_id(&db.model, resolved, id)?;
        tracing::debug!(entity = %entity, id = %id, cascaded = removed.len().saturating_sub(1), "delete");
        removed
            .into_iter()
            .next()
            .map(|(_, record)| Value::Object(record))
            .ok_or_else(|| StoreError::not_found(entity, id))
    }

    /// Delete the first record matching `filter`. Ok(None) when nothing matches.
    pub fn delete_first(db: &mut Database, entity: &str, filter: &Filter) -> Result<Option<Value>, StoreError> {
        match Self::first_id(db, entity, filter)? {
            Some(id) => Self::delete(db, entity, &id).map(Some),
            None => Ok(None),
        }
    }

    fn first_id(db: &Database, entity: &str, filter: &Filter) -> Result<Option<String>, StoreError> {
        let plan = Self::plan(db, entity, filter)?;
        let id = plan
            .scan(&db.store)
            .next()
            .and_then(|r| r.get(ID_FIELD))
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(id)
    }

    /// Bulk create, all or nothing. Returns created records in input order.
    pub fn bulk_create(
        db: &mut Database,
        entity: &str,
        items: &[HashMap<String, Value>],
    ) -> Result<Vec<Value>, StoreError> {
        if items.len() > BULK_LIMIT {
            return Err(StoreError::BadRequest(format!(
                "bulk create limited to {} items",
                BULK_LIMIT
            )));
        }
        let entity = entity_of(&db.model, entity)?;
        let mut working = db.store.clone();
        let mut out = Vec::with_capacity(items.len());
        for body in items {
            out.push(to_value(&Self::create_in(&mut working, entity, body)?));
        }
        db.store = working;
        tracing::debug!(entity = %entity.name, count = out.len(), "bulk_create");
        Ok(out)
    }

    /// Bulk update, all or nothing. Each item must carry `id`. Returns updated records.
    pub fn bulk_update(
        db: &mut Database,
        entity: &str,
        items: &[HashMap<String, Value>],
    ) -> Result<Vec<Value>, StoreError> {
        if items.len() > BULK_LIMIT {
            return Err(StoreError::BadRequest(format!(
                "bulk update limited to {} items",
                BULK_LIMIT
            )));
        }
        let entity = entity_of(&db.model, entity)?;
        let mut working = db.store.clone();
        let mut out = Vec::with_capacity(items.len());
        for body in items {
            let id = body
                .get(ID_FIELD)
                .and_then(Value::as_str)
                .ok_or_else(|| StoreError::Validation(format!("each item must have '{}'", ID_FIELD)))?
                .to_string();
            let mut patch = body.clone();
            patch.remove(ID_FIELD);
            out.push(to_value(&Self::update_in(&mut working, entity, &id, &patch)?));
        }
        db.store = working;
        tracing::debug!(entity = %entity.name, count = out.len(), "bulk_update");
        Ok(out)
    }
}
