//! Config validation: referential integrity and naming consistency.

use crate::config::{compile_patterns, FieldType, FullConfig, FILTER_KEYWORDS, MANAGED_FIELDS};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    if config.entities.is_empty() {
        return Err(ConfigError::Validation("at least one entity required".into()));
    }

    let mut fields_by_entity: HashMap<&str, HashMap<&str, FieldType>> = HashMap::new();
    for e in &config.entities {
        if fields_by_entity.contains_key(e.name.as_str()) {
            return Err(ConfigError::DuplicateEntity(e.name.clone()));
        }
        let mut fields = HashMap::new();
        for f in &e.fields {
            if is_reserved(&f.name) {
                return Err(ConfigError::ReservedField {
                    entity: e.name.clone(),
                    field: f.name.clone(),
                });
            }
            if fields.insert(f.name.as_str(), f.type_).is_some() {
                return Err(ConfigError::DuplicateField {
                    entity: e.name.clone(),
                    field: f.name.clone(),
                });
            }
        }
        for col in e.validation.keys() {
            if !fields.contains_key(col.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "field",
                    id: format!("{}.{}", e.name, col),
                });
            }
        }
        compile_patterns(&e.name, &e.validation)?;
        fields_by_entity.insert(e.name.as_str(), fields);
    }

    let mut relation_ids = HashSet::new();
    // Relation names share a namespace with field names on the entity that owns them.
    let mut relation_names: HashSet<(&str, &str)> = HashSet::new();
    for r in &config.relationships {
        if !relation_ids.insert(r.id.as_str()) {
            return Err(ConfigError::Validation(format!("duplicate relationship id: {}", r.id)));
        }
        let from_fields = fields_by_entity
            .get(r.from_entity.as_str())
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "entity",
                id: r.from_entity.clone(),
            })?;
        let to_fields = fields_by_entity
            .get(r.to_entity.as_str())
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "entity",
                id: r.to_entity.clone(),
            })?;
        match from_fields.get(r.from_field.as_str()) {
            Some(FieldType::Id) => {}
            Some(_) => {
                return Err(ConfigError::Validation(format!(
                    "relationship {}: {}.{} must have type \"id\"",
                    r.id, r.from_entity, r.from_field
                )))
            }
            None => {
                return Err(ConfigError::MissingReference {
                    kind: "field",
                    id: format!("{}.{}", r.from_entity, r.from_field),
                })
            }
        }

        let mut named = vec![(r.from_entity.as_str(), r.name.as_str(), from_fields)];
        if let Some(inverse) = r.inverse_name.as_deref() {
            named.push((r.to_entity.as_str(), inverse, to_fields));
        }
        for (entity, name, fields) in named {
            if is_reserved(name) {
                return Err(ConfigError::ReservedField {
                    entity: entity.to_string(),
                    field: name.to_string(),
                });
            }
            if fields.contains_key(name) {
                return Err(ConfigError::DuplicateField {
                    entity: entity.to_string(),
                    field: name.to_string(),
                });
            }
            if !relation_names.insert((entity, name)) {
                return Err(ConfigError::DuplicateField {
                    entity: entity.to_string(),
                    field: name.to_string(),
                });
            }
        }
    }

    Ok(())
}

/// Store-managed fields and filter keywords.
fn is_reserved(name: &str) -> bool {
    MANAGED_FIELDS.contains(&name) || FILTER_KEYWORDS.contains(&name)
}
