//! Raw config types matching the JSON schema files (entities + relationships).

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Bytes,
    /// Identifier of another record (foreign keys).
    Id,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: FieldType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub validation: HashMap<String, ValidationRule>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// What happens to dependents when the record they point at is deleted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OnDelete {
    Cascade,
    #[default]
    Restrict,
}

impl<'de> Deserialize<'de> for OnDelete {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_lowercase().as_str() {
            "cascade" => Ok(OnDelete::Cascade),
            "restrict" | "no action" | "no_action" => Ok(OnDelete::Restrict),
            other => Err(serde::de::Error::custom(format!(
                "on_delete must be \"cascade\" or \"restrict\"; got \"{}\"",
                other
            ))),
        }
    }
}

/// A many-to-one link: `from_entity.from_field` holds the id of a `to_entity` record.
/// `name` is the to-one relation on the child, `inverse_name` the to-many relation on the parent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationshipConfig {
    pub id: String,
    pub from_entity: String,
    pub from_field: String,
    pub to_entity: String,
    pub name: String,
    #[serde(default)]
    pub inverse_name: Option<String>,
    #[serde(default)]
    pub on_delete: OnDelete,
}

/// All config types in one struct for in-memory loading.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    pub entities: Vec<EntityConfig>,
    #[serde(default)]
    pub relationships: Vec<RelationshipConfig>,
}
