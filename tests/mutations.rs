//! Mutations through CrudService: identity, integrity and cascades.

use notes_db::{load_from_str, CrudService, Database, Filter, Model, StoreError, User};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashMap;

fn body(v: Value) -> HashMap<String, Value> {
    match v {
        Value::Object(m) => m.into_iter().collect(),
        other => panic!("not an object: {}", other),
    }
}

/// kody (u1) with note n1 carrying two images, and hannah (u2) with note n2.
fn seeded() -> Database {
    let mut db = Database::notes().unwrap();
    CrudService::bulk_create(
        &mut db,
        "user",
        &[
            body(json!({ "id": "u1", "username": "kody", "name": "Kody" })),
            body(json!({ "id": "u2", "username": "hannah" })),
        ],
    )
    .unwrap();
    CrudService::bulk_create(
        &mut db,
        "note",
        &[
            body(json!({ "id": "n1", "title": "koalas", "content": "are not bears", "ownerId": "u1" })),
            body(json!({ "id": "n2", "title": "tigers", "content": "", "ownerId": "u2" })),
        ],
    )
    .unwrap();
    for (id, note) in [("i1", "n1"), ("i2", "n1"), ("i3", "n2")] {
        CrudService::create(
            &mut db,
            "image",
            &body(json!({ "id": id, "altText": null, "contentType": "image/jpeg", "content": [255, 216], "noteId": note })),
        )
        .unwrap();
    }
    db
}

#[test]
fn deleting_a_note_removes_its_images() {
    let mut db = seeded();
    let deleted = CrudService::delete(&mut db, "note", "n1").unwrap();
    assert_eq!(deleted["id"], "n1");

    let images = CrudService::find_many(&db, "image", &Filter::new().equals("noteId", "n1")).unwrap();
    assert!(images.is_empty());
    let others = CrudService::find_many(&db, "image", &Filter::new()).unwrap();
    assert_eq!(others.len(), 1);
    assert_eq!(others[0]["id"], "i3");
}

#[test]
fn update_changes_only_the_patched_field() {
    let mut db = seeded();
    let before = CrudService::read(&db, "note", "n1").unwrap().unwrap();
    let updated = CrudService::update(&mut db, "note", "n1", &body(json!({ "title": "X" }))).unwrap();

    assert_eq!(updated["title"], "X");
    assert_eq!(updated["id"], before["id"]);
    assert_eq!(updated["content"], before["content"]);
    assert_eq!(updated["ownerId"], before["ownerId"]);
    assert_eq!(updated["createdAt"], before["createdAt"]);

    let found = CrudService::find_first(&db, "note", &Filter::by_id("n1")).unwrap().unwrap();
    assert_eq!(found["title"], "X");
}

#[test]
fn create_with_dangling_owner_is_a_reference_error() {
    let mut db = seeded();
    let before = CrudService::count(&db, "note", &Filter::new()).unwrap();
    let err = CrudService::create(
        &mut db,
        "note",
        &body(json!({ "title": "orphan", "content": "", "ownerId": "nonexistent" })),
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::Reference { ref id, .. } if id == "nonexistent"));
    assert_eq!(CrudService::count(&db, "note", &Filter::new()).unwrap(), before);
}

#[test]
fn update_revalidates_foreign_keys() {
    let mut db = seeded();
    let err = CrudService::update(&mut db, "note", "n1", &body(json!({ "ownerId": "ghost" }))).unwrap_err();
    assert!(matches!(err, StoreError::Reference { .. }));
    assert_eq!(CrudService::read(&db, "note", "n1").unwrap().unwrap()["ownerId"], "u1");

    CrudService::update(&mut db, "note", "n1", &body(json!({ "ownerId": "u2" }))).unwrap();
    let hannahs = CrudService::find_many(
        &db,
        "note",
        &Filter::new().relation("owner", Filter::new().equals("username", "hannah")),
    )
    .unwrap();
    let ids: Vec<&str> = hannahs.iter().map(|n| n["id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["n1", "n2"]);
}

#[test]
fn patch_with_unknown_or_relation_field_is_a_schema_error() {
    let mut db = seeded();
    let before = CrudService::read(&db, "note", "n1").unwrap().unwrap();

    let err = CrudService::update(&mut db, "note", "n1", &body(json!({ "colour": "red" }))).unwrap_err();
    assert!(matches!(err, StoreError::Schema(ref m) if m.contains("colour")));
    let err = CrudService::update(
        &mut db,
        "note",
        "n1",
        &body(json!({ "title": "renamed", "owner": { "id": "u2" } })),
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::Schema(ref m) if m.contains("ownerId")));
    let err = CrudService::update(&mut db, "user", "u1", &body(json!({ "notes": [] }))).unwrap_err();
    assert!(matches!(err, StoreError::Schema(_)));

    assert_eq!(CrudService::read(&db, "note", "n1").unwrap().unwrap(), before);
    let filtered = CrudService::update_first(
        &mut db,
        "note",
        &Filter::by_id("n1"),
        &body(json!({ "colour": "red" })),
    )
    .unwrap_err();
    assert!(matches!(filtered, StoreError::Schema(_)));
    assert_eq!(CrudService::read(&db, "note", "n1").unwrap().unwrap(), before);
}

#[test]
fn seeded_timestamps_must_be_rfc3339() {
    let mut db = seeded();
    let err = CrudService::create(
        &mut db,
        "user",
        &body(json!({ "username": "marty", "createdAt": 5, "updatedAt": { "x": 1 } })),
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert_eq!(CrudService::count(&db, "user", &Filter::new()).unwrap(), 2);

    CrudService::create(
        &mut db,
        "user",
        &body(json!({
            "username": "marty",
            "createdAt": "2023-05-01T12:00:00.000Z",
            "updatedAt": "2023-05-02T12:00:00.000Z"
        })),
    )
    .unwrap();
    let marty = User::find_first(&db, &Filter::new().equals("username", "marty")).unwrap().unwrap();
    assert_eq!(marty.created_at, "2023-05-01T12:00:00.000Z");
    assert_eq!(marty.updated_at, "2023-05-02T12:00:00.000Z");
}

#[test]
fn missing_targets_are_not_found() {
    let mut db = seeded();
    let err = CrudService::update(&mut db, "note", "nope", &body(json!({ "title": "x" }))).unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
    let err = CrudService::delete(&mut db, "note", "nope").unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
    assert_eq!(CrudService::read(&db, "note", "nope").unwrap(), None);
}

#[test]
fn usernames_stay_unique() {
    let mut db = seeded();
    let err = CrudService::create(&mut db, "user", &body(json!({ "username": "kody" }))).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
    let err = CrudService::update(&mut db, "user", "u2", &body(json!({ "username": "kody" }))).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    // Renaming frees the old username.
    CrudService::update(&mut db, "user", "u1", &body(json!({ "username": "kentcdodds" }))).unwrap();
    CrudService::create(&mut db, "user", &body(json!({ "username": "kody" }))).unwrap();
}

#[test]
fn deleted_ids_are_never_reused() {
    let mut db = seeded();
    CrudService::delete(&mut db, "note", "n2").unwrap();
    let err = CrudService::create(
        &mut db,
        "note",
        &body(json!({ "id": "n2", "title": "again", "content": "", "ownerId": "u1" })),
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[test]
fn deleting_a_user_cascades_to_notes_and_images() {
    let mut db = seeded();
    CrudService::delete(&mut db, "user", "u1").unwrap();
    assert_eq!(CrudService::count(&db, "note", &Filter::new()).unwrap(), 1);
    let images = CrudService::find_many(&db, "image", &Filter::new()).unwrap();
    let ids: Vec<&str> = images.iter().map(|i| i["id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["i3"]);
}

#[test]
fn restrict_policy_rejects_user_with_notes() {
    let mut config = notes_db::notes_schema().unwrap();
    for rel in config.relationships.iter_mut().filter(|r| r.id == "note_owner") {
        rel.on_delete = notes_db::config::OnDelete::Restrict;
    }
    let mut db = Database::from_config(&config).unwrap();
    CrudService::create(&mut db, "user", &body(json!({ "id": "u1", "username": "kody" }))).unwrap();
    CrudService::create(&mut db, "note", &body(json!({ "id": "n1", "title": "t", "ownerId": "u1" }))).unwrap();

    let err = CrudService::delete(&mut db, "user", "u1").unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
    assert_eq!(CrudService::count(&db, "user", &Filter::new()).unwrap(), 1);

    CrudService::delete(&mut db, "note", "n1").unwrap();
    CrudService::delete(&mut db, "user", "u1").unwrap();
}

#[test]
fn filter_addressed_update_and_delete() {
    let mut db = seeded();
    let updated = CrudService::update_first(
        &mut db,
        "note",
        &Filter::new().equals("title", "tigers"),
        &body(json!({ "content": "stripes" })),
    )
    .unwrap()
    .unwrap();
    assert_eq!(updated["id"], "n2");
    assert_eq!(updated["content"], "stripes");

    let none = CrudService::update_first(&mut db, "note", &Filter::new().equals("title", "lions"), &body(json!({ "content": "x" }))).unwrap();
    assert_eq!(none, None);

    let deleted = CrudService::delete_first(
        &mut db,
        "note",
        &Filter::new().relation("owner", Filter::new().equals("username", "kody")),
    )
    .unwrap()
    .unwrap();
    assert_eq!(deleted["id"], "n1");
    assert_eq!(CrudService::delete_first(&mut db, "note", &Filter::by_id("n1")).unwrap(), None);
}

#[test]
fn bulk_create_is_all_or_nothing() {
    let mut db = seeded();
    let err = CrudService::bulk_create(
        &mut db,
        "note",
        &[
            body(json!({ "title": "ok", "ownerId": "u1" })),
            body(json!({ "title": "broken", "ownerId": "ghost" })),
        ],
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::Reference { .. }));
    assert_eq!(CrudService::count(&db, "note", &Filter::new()).unwrap(), 2);

    let too_many: Vec<_> = (0..101).map(|i| body(json!({ "username": format!("user{}", i) }))).collect();
    let err = CrudService::bulk_create(&mut db, "user", &too_many).unwrap_err();
    assert!(matches!(err, StoreError::BadRequest(_)));
}

#[test]
fn bulk_update_is_all_or_nothing() {
    let mut db = seeded();
    let err = CrudService::bulk_update(
        &mut db,
        "note",
        &[
            body(json!({ "id": "n1", "title": "first" })),
            body(json!({ "id": "missing", "title": "second" })),
        ],
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
    assert_eq!(CrudService::read(&db, "note", "n1").unwrap().unwrap()["title"], "koalas");

    let rows = CrudService::bulk_update(
        &mut db,
        "note",
        &[
            body(json!({ "id": "n1", "title": "first" })),
            body(json!({ "id": "n2", "title": "second" })),
        ],
    )
    .unwrap();
    assert_eq!(rows.len(), 2);
    let err = CrudService::bulk_update(&mut db, "note", &[body(json!({ "title": "no id" }))]).unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[test]
fn custom_schema_from_json() {
    let config = load_from_str(
        r#"{
            "entities": [
                { "name": "board", "fields": [{ "name": "slug", "type": "text", "unique": true }] },
                { "name": "card", "fields": [
                    { "name": "label", "type": "text" },
                    { "name": "boardId", "type": "id" }
                ] }
            ],
            "relationships": [{
                "id": "card_board", "from_entity": "card", "from_field": "boardId",
                "to_entity": "board", "name": "board", "inverse_name": "cards", "on_delete": "cascade"
            }]
        }"#,
    )
    .unwrap();
    let mut db = Database::from_config(&config).unwrap();
    let board = CrudService::create(&mut db, "board", &body(json!({ "slug": "todo" }))).unwrap();
    let board_id = board["id"].as_str().unwrap();
    CrudService::create(&mut db, "card", &body(json!({ "label": "write tests", "boardId": board_id }))).unwrap();

    let boards = CrudService::find_many(
        &db,
        "board",
        &Filter::new().some("cards", Filter::new().equals("label", "write tests")),
    )
    .unwrap();
    assert_eq!(boards, vec![board]);
}
