//! Typed errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("duplicate entity: {0}")]
    DuplicateEntity(String),
    #[error("duplicate field: {entity}.{field}")]
    DuplicateField { entity: String, field: String },
    #[error("reserved name: {entity}.{field}")]
    ReservedField { entity: String, field: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {entity} '{id}'")]
    NotFound { entity: String, id: String },
    #[error("reference: {entity}.{field} points at missing record '{id}'")]
    Reference { entity: String, field: String, id: String },
    #[error("schema: {0}")]
    Schema(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl StoreError {
    /// Stable code for callers that translate errors into responses.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Config(_) => "config_error",
            StoreError::NotFound { .. } => "not_found",
            StoreError::Reference { .. } => "reference_error",
            StoreError::Schema(_) => "schema_error",
            StoreError::Validation(_) => "validation_error",
            StoreError::Conflict(_) => "conflict",
            StoreError::BadRequest(_) => "bad_request",
        }
    }

    pub fn not_found(entity: &str, id: &str) -> Self {
        StoreError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}
