//! The store handle. Hosts construct one `Database` and pass it to every query and
//! mutation; there is no global instance and no internal locking.

use crate::config::{notes_schema, resolve, FullConfig, ResolvedEntity, ResolvedModel};
use crate::error::{ConfigError, StoreError};
use crate::filter::Quantifier;
use crate::store::Store;

pub const DEFAULT_LIST_LIMIT: u32 = 100;
pub const MAX_LIST_LIMIT: u32 = 1000;

const TO_MANY_MATCH_ENV: &str = "NOTES_DB_TO_MANY_MATCH";
const LIST_LIMIT_ENV: &str = "NOTES_DB_LIST_LIMIT";

#[derive(Clone, Debug)]
pub struct DatabaseOptions {
    /// Quantifier for nested filters on to-many relations that do not name one.
    pub to_many_match: Quantifier,
    /// Page size for `CrudService::list` when the caller passes none (capped at `MAX_LIST_LIMIT`).
    pub list_limit: u32,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        DatabaseOptions {
            to_many_match: Quantifier::Some,
            list_limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl DatabaseOptions {
    /// Defaults overridden by `NOTES_DB_TO_MANY_MATCH` (`some` | `every`) and `NOTES_DB_LIST_LIMIT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut options = DatabaseOptions::default();
        if let Some(v) = lookup(TO_MANY_MATCH_ENV) {
            options.to_many_match = match v.trim().to_lowercase().as_str() {
                "some" => Quantifier::Some,
                "every" => Quantifier::Every,
                other => {
                    return Err(ConfigError::Validation(format!(
                        "{} must be \"some\" or \"every\"; got \"{}\"",
                        TO_MANY_MATCH_ENV, other
                    )))
                }
            };
        }
        if let Some(v) = lookup(LIST_LIMIT_ENV) {
            let limit: u32 = v.trim().parse().map_err(|_| {
                ConfigError::Validation(format!("{} must be a positive integer; got \"{}\"", LIST_LIMIT_ENV, v))
            })?;
            options.list_limit = limit.clamp(1, MAX_LIST_LIMIT);
        }
        Ok(options)
    }
}

#[derive(Clone, Debug)]
pub struct Database {
    pub(crate) model: ResolvedModel,
    pub(crate) store: Store,
    pub(crate) options: DatabaseOptions,
}

impl Database {
    pub fn new(model: ResolvedModel) -> Self {
        Self::with_options(model, DatabaseOptions::default())
    }

    pub fn with_options(model: ResolvedModel, options: DatabaseOptions) -> Self {
        let store = Store::new(&model);
        Database {
            model,
            store,
            options,
        }
    }

    pub fn from_config(config: &FullConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(resolve(config)?))
    }

    /// Empty database over the bundled user / note / image schema.
    pub fn notes() -> Result<Self, ConfigError> {
        Self::from_config(&notes_schema()?)
    }

    pub fn model(&self) -> &ResolvedModel {
        &self.model
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: DatabaseOptions) {
        self.options = options;
    }
}

pub(crate) fn entity_of<'m>(model: &'m ResolvedModel, name: &str) -> Result<&'m ResolvedEntity, StoreError> {
    model
        .entity(name)
        .ok_or_else(|| StoreError::Schema(format!("unknown entity: {}", name)))
}
