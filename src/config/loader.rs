//! Load config from JSON (string, file or the bundled notes schema) and resolve it.

use crate::config::resolved::{
    compile_patterns, FieldInfo, RelationDirection, RelationSpec, ResolvedEntity, ResolvedModel, CREATED_AT_FIELD,
    ID_FIELD, UPDATED_AT_FIELD,
};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;

const NOTES_SCHEMA: &str = include_str!("../../schema/notes.json");

/// Build resolved model from full config (validates first).
pub fn resolve(config: &FullConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;

    let mut entities = Vec::new();
    let mut entity_by_name = HashMap::new();

    for e in &config.entities {
        let mut fields = vec![managed_field(ID_FIELD)];
        fields.extend(e.fields.iter().map(|f| FieldInfo {
            name: f.name.clone(),
            type_: f.type_,
            nullable: f.nullable,
            unique: f.unique,
            default: f.default.clone(),
            managed: false,
        }));
        fields.push(managed_field(CREATED_AT_FIELD));
        fields.push(managed_field(UPDATED_AT_FIELD));

        let entity = ResolvedEntity {
            name: e.name.clone(),
            fields,
            relations: build_relations_for_entity(&e.name, &config.relationships),
            validation: e.validation.clone(),
            patterns: compile_patterns(&e.name, &e.validation)?,
        };
        entity_by_name.insert(e.name.clone(), entity.clone());
        entities.push(entity);
    }

    tracing::debug!(entities = entities.len(), relationships = config.relationships.len(), "resolved model");
    Ok(ResolvedModel {
        entities,
        entity_by_name,
    })
}

fn managed_field(name: &str) -> FieldInfo {
    FieldInfo {
        name: name.to_string(),
        type_: FieldType::Text,
        nullable: false,
        unique: name == ID_FIELD,
        default: None,
        managed: true,
    }
}

fn build_relations_for_entity(entity: &str, relationships: &[RelationshipConfig]) -> Vec<RelationSpec> {
    let mut relations = Vec::new();
    for rel in relationships {
        if rel.from_entity == entity {
            relations.push(RelationSpec {
                name: rel.name.clone(),
                direction: RelationDirection::ToOne,
                relationship_id: rel.id.clone(),
                related_entity: rel.to_entity.clone(),
                our_key: rel.from_field.clone(),
                their_key: ID_FIELD.to_string(),
                on_delete: rel.on_delete,
            });
        }
        if rel.to_entity == entity {
            if let Some(inverse) = &rel.inverse_name {
                relations.push(RelationSpec {
                    name: inverse.clone(),
                    direction: RelationDirection::ToMany,
                    relationship_id: rel.id.clone(),
                    related_entity: rel.from_entity.clone(),
                    our_key: ID_FIELD.to_string(),
                    their_key: rel.from_field.clone(),
                    on_delete: rel.on_delete,
                });
            }
        }
    }
    relations
}

/// Relationships where `entity` is the parent, including ones without a named inverse.
/// Cascade planning needs these even when no to-many relation is exposed to filters.
pub(crate) fn dependents_of<'a>(
    model: &'a ResolvedModel,
    entity: &'a str,
) -> impl Iterator<Item = (&'a ResolvedEntity, &'a RelationSpec)> + 'a {
    model.entities.iter().flat_map(move |child| {
        child
            .to_one_relations()
            .filter(move |r| r.related_entity == entity)
            .map(move |r| (child, r))
    })
}

pub fn load_from_str(json: &str) -> Result<FullConfig, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    load_from_str(&text)
}

/// The bundled user / note / image schema.
pub fn notes_schema() -> Result<FullConfig, ConfigError> {
    load_from_str(NOTES_SCHEMA)
}
