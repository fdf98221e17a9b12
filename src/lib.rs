//! notes-db: configuration-driven in-memory entity store with relation-aware filters.

pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod models;
pub mod service;
pub mod store;

pub use config::{load_from_path, load_from_str, notes_schema, resolve, FullConfig, ResolvedEntity, ResolvedModel};
pub use database::{Database, DatabaseOptions};
pub use error::{ConfigError, StoreError};
pub use filter::{Clause, Filter, Quantifier};
pub use models::{EntityKind, Image, Model, Note, User};
pub use service::{CrudService, RequestValidator};
pub use store::{Record, Store};
