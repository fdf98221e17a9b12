//! Example consumer: a separate Rust project that uses notes-db as a dependency.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Set `NOTES_DB_SEED` to a JSON file keyed by entity name to load other fixtures.

use notes_db::{CrudService, Database, DatabaseOptions, EntityKind, Filter, StoreError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

const BUNDLED_SEED: &str = include_str!("../../demos/seed.json");

type Shared = Arc<RwLock<Database>>;

fn lock_err<T>(_: T) -> StoreError {
    StoreError::BadRequest("state lock".into())
}

fn body(value: &Value) -> Result<HashMap<String, Value>, StoreError> {
    match value {
        Value::Object(map) => Ok(map.clone().into_iter().collect()),
        other => Err(StoreError::Validation(format!("seed rows must be objects, got {}", other))),
    }
}

/// Seed parents before children so foreign keys resolve.
fn seed(db: &mut Database, raw: &str) -> Result<(), Box<dyn std::error::Error>> {
    let fixtures: HashMap<String, Vec<Value>> = serde_json::from_str(raw)?;
    for kind in EntityKind::ALL {
        let Some(rows) = fixtures.get(kind.as_str()) else { continue };
        let bodies = rows.iter().map(body).collect::<Result<Vec<_>, _>>()?;
        let created = CrudService::bulk_create(db, kind.as_str(), &bodies)?;
        tracing::info!(entity = %kind, count = created.len(), "seeded");
    }
    Ok(())
}

/// What the notes list page loads: the owner, then the owner's notes.
fn notes_page(db: &Shared, username: &str) -> Result<Value, StoreError> {
    let db = db.read().map_err(lock_err)?;
    let owner = CrudService::find_first(&db, "user", &Filter::new().equals("username", username))?
        .ok_or_else(|| StoreError::not_found("user", username))?;
    let notes = CrudService::find_many(
        &db,
        "note",
        &Filter::new().relation("owner", Filter::new().equals("username", username)),
    )?;
    let titles: Vec<&Value> = notes.iter().map(|n| &n["title"]).collect();
    Ok(json!({ "owner": owner["name"], "notes": titles }))
}

/// Edit then delete the first of a user's notes.
fn edit_and_remove(db: &Shared, username: &str) -> Result<(), StoreError> {
    let mut db = db.write().map_err(lock_err)?;
    let mine = Filter::new().relation("owner", Filter::new().equals("username", username));
    let patch: HashMap<String, Value> = [("title".to_string(), json!("Koala facts (edited)"))].into();
    let Some(updated) = CrudService::update_first(&mut db, "note", &mine, &patch)? else {
        tracing::info!(username, "no notes to edit");
        return Ok(());
    };
    tracing::info!(id = %updated["id"], title = %updated["title"], "note updated");

    let id = updated["id"].as_str().unwrap_or_default().to_string();
    CrudService::delete(&mut db, "note", &id)?;
    let images = CrudService::count(&db, "image", &Filter::new().equals("noteId", id.as_str()))?;
    tracing::info!(id = %id, remaining_images = images, "note deleted");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("notes_db=info,example_consumer=info")),
        )
        .init();

    let options = DatabaseOptions::from_env()?;
    let mut db = Database::notes()?;
    db.set_options(options);
    match std::env::var("NOTES_DB_SEED") {
        Ok(path) => seed(&mut db, &std::fs::read_to_string(&path)?)?,
        Err(_) => seed(&mut db, BUNDLED_SEED)?,
    }
    let db: Shared = Arc::new(RwLock::new(db));

    let mut handles = Vec::new();
    for username in ["kody", "hannah", "nobody"] {
        let db = db.clone();
        handles.push(tokio::spawn(async move { (username, notes_page(&db, username)) }));
    }
    for handle in handles {
        match handle.await? {
            (username, Ok(page)) => tracing::info!(username, page = %page, "notes page"),
            (username, Err(e)) => tracing::warn!(username, code = e.code(), error = %e, "notes page failed"),
        }
    }

    let writer = db.clone();
    tokio::task::spawn_blocking(move || edit_and_remove(&writer, "kody")).await??;
    let page = notes_page(&db, "kody")?;
    tracing::info!(page = %page, "after edit");
    Ok(())
}
