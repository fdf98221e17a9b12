//! Typed views over the bundled schema's records.

use crate::database::Database;
use crate::error::StoreError;
use crate::filter::Filter;
use crate::service::CrudService;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Collection selector for the bundled schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Note,
    Image,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::User, EntityKind::Note, EntityKind::Image];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Note => "note",
            EntityKind::Image => "image",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub owner_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: String,
    pub alt_text: Option<String>,
    pub content_type: String,
    pub content: Vec<u8>,
    pub note_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNote {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub content: String,
    pub owner_id: String,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewImage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    pub content_type: String,
    pub content: Vec<u8>,
    pub note_id: String,
}

/// Turn a serializable input into the field map `CrudService` takes.
pub fn body_of<T: Serialize>(input: &T) -> Result<HashMap<String, Value>, StoreError> {
    match serde_json::to_value(input) {
        Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
        Ok(other) => Err(StoreError::Validation(format!("body must be an object, got {}", other))),
        Err(e) => Err(StoreError::Validation(e.to_string())),
    }
}

/// A record type stored in one collection of the bundled schema.
pub trait Model: DeserializeOwned {
    const KIND: EntityKind;
    type Input: Serialize;

    fn from_row(row: Value) -> Result<Self, StoreError> {
        serde_json::from_value(row)
            .map_err(|e| StoreError::Schema(format!("cannot read {} record: {}", Self::KIND, e)))
    }

    fn find_first(db: &Database, filter: &Filter) -> Result<Option<Self>, StoreError> {
        CrudService::find_first(db, Self::KIND.as_str(), filter)?
            .map(Self::from_row)
            .transpose()
    }

    fn find_many(db: &Database, filter: &Filter) -> Result<Vec<Self>, StoreError> {
        CrudService::find_many(db, Self::KIND.as_str(), filter)?
            .into_iter()
            .map(Self::from_row)
            .collect()
    }

    fn create(db: &mut Database, input: &Self::Input) -> Result<Self, StoreError> {
        Self::from_row(CrudService::create(db, Self::KIND.as_str(), &body_of(input)?)?)
    }
}

impl Model for User {
    const KIND: EntityKind = EntityKind::User;
    type Input = NewUser;
}

impl Model for Note {
    const KIND: EntityKind = EntityKind::Note;
    type Input = NewNote;
}

impl Model for Image {
    const KIND: EntityKind = EntityKind::Image;
    type Input = NewImage;
}
