use morphite::changelog::CHANGELOG_COLLECTION;
use morphite::engine::MigrationEngine;
use morphite::store::{Document, MemoryStoreProvider, StoreHandle, StoreProvider};
use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

#[ctor::ctor]
fn init() {
    colog::init();
}

fn write_json(dir: &TempDir, name: &str, content: &Value) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = fs::File::create(&path).expect("Failed to create fixture file");
    write!(file, "{}", content).expect("Failed to write fixture file");
    path
}

fn doc(value: Value) -> Document {
    value.as_object().cloned().expect("fixture must be an object")
}

fn ledger(handle: &dyn StoreHandle) -> Vec<Document> {
    handle
        .find(CHANGELOG_COLLECTION, &Document::new())
        .expect("Failed to read ledger")
}

/// Full lifecycle against two databases: create, seed, update with a bare
/// field map, rename, drop, with one failing unit in the middle. Re-running
/// must change nothing.
#[test]
fn test_full_migration_lifecycle_is_idempotent() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    write_json(
        &dir,
        "001_create.json",
        &json!({"create": ["users", "orders"]}),
    );
    write_json(
        &dir,
        "002_seed.json",
        &json!({"collectionName": "users", "insert": [
            {"_id": 1, "name": "Alice", "role": "guest"},
            {"_id": 2, "name": "Bob", "role": "guest"},
        ]}),
    );
    // Bare field map: must behave as {"$set": {...}}.
    write_json(
        &dir,
        "003_promote.json",
        &json!({"collectionName": "users", "update": {"queries": [
            {"query": {"name": "Alice"}, "update": {"role": "admin"}},
        ]}}),
    );
    // Fails: source collection never existed.
    write_json(
        &dir,
        "004_rename.json",
        &json!({"rename": [{"oldCollection": "legacy", "newCollection": "archive"}]}),
    );
    write_json(&dir, "005_drop.json", &json!({"drop": ["orders"]}));
    write_json(
        &dir,
        "001_inventory.json",
        &json!({"collectionName": "stock", "insert": [{"_id": 1, "sku": "widget", "count": 3}]}),
    );
    write_json(
        &dir,
        "002_inventory.json",
        &json!({"collectionName": "stock", "update": {"queries": [
            {"query": {"sku": "widget"}, "update": {"$inc": {"count": 2}}},
        ]}}),
    );

    let manifest = write_json(
        &dir,
        "manifest.json",
        &json!({
            "app": [
                {"changeUnitId": "005", "fileName": "005_drop.json"},
                {"changeUnitId": "001", "fileName": "001_create.json"},
                {"changeUnitId": "003", "fileName": "003_promote.json"},
                {"changeUnitId": "004", "fileName": "004_rename.json"},
                {"changeUnitId": "002", "fileName": "002_seed.json"},
            ],
            "inventory": [
                {"changeUnitId": "002", "fileName": "002_inventory.json"},
                {"changeUnitId": "001", "fileName": "001_inventory.json"},
            ],
        }),
    );

    let provider = Arc::new(MemoryStoreProvider::new());
    let engine = MigrationEngine::new(provider.clone());
    engine.run(&manifest).expect("Run should not abort");

    let app = provider.resolve("app").expect("Failed to resolve app");
    assert!(app.collection_exists("users").unwrap());
    // 005 dropped what 001 created.
    assert!(!app.collection_exists("orders").unwrap());

    let admins = app.find("users", &doc(json!({"role": "admin"}))).unwrap();
    assert_eq!(admins.len(), 1);
    assert_eq!(admins[0]["name"], json!("Alice"));
    // The bare field map was wrapped, not substituted for the document.
    assert_eq!(admins[0]["_id"], json!(1));

    let app_ledger = ledger(app.as_ref());
    assert_eq!(app_ledger.len(), 5);
    let failed: Vec<&Document> = app_ledger
        .iter()
        .filter(|e| e["success"] == json!(false))
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["changeUnitId"], json!("004"));
    assert_eq!(failed[0]["operation"], json!("rename"));

    let inventory = provider
        .resolve("inventory")
        .expect("Failed to resolve inventory");
    let stock = inventory
        .find("stock", &doc(json!({"sku": "widget"})))
        .unwrap();
    assert_eq!(stock.len(), 1);
    // 001 ran before 002 despite manifest order: 3 + 2.
    assert_eq!(stock[0]["count"], json!(5));
    assert_eq!(ledger(inventory.as_ref()).len(), 2);

    // Second run: every successful unit skips, the failed one retries and
    // fails again, adding exactly one more ledger entry.
    engine.run(&manifest).expect("Second run should not abort");

    assert_eq!(app.find("users", &Document::new()).unwrap().len(), 2);
    assert_eq!(ledger(app.as_ref()).len(), 6);
    assert_eq!(
        inventory
            .find("stock", &doc(json!({"sku": "widget"})))
            .unwrap()[0]["count"],
        json!(5)
    );
    assert_eq!(ledger(inventory.as_ref()).len(), 2);
}

/// A fresh engine instance sees the same ledger: idempotency is a property
/// of the database, not of engine state.
#[test]
fn test_idempotency_survives_engine_instances() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    write_json(&dir, "001_create.json", &json!({"create": ["events"]}));
    let manifest = write_json(
        &dir,
        "manifest.json",
        &json!({"db": [{"changeUnitId": "001", "fileName": "001_create.json"}]}),
    );

    let provider = Arc::new(MemoryStoreProvider::new());
    MigrationEngine::new(provider.clone())
        .run(&manifest)
        .expect("First run should not abort");
    MigrationEngine::new(provider.clone())
        .run(&manifest)
        .expect("Second run should not abort");

    let handle = provider.resolve("db").expect("Failed to resolve db");
    assert_eq!(ledger(handle.as_ref()).len(), 1);
}

/// The ledger keeps growing monotonically across runs for a unit that
/// keeps failing; nothing is ever updated or deleted.
#[test]
fn test_ledger_is_append_only_across_failing_runs() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    write_json(
        &dir,
        "001_rename.json",
        &json!({"rename": [{"oldCollection": "never", "newCollection": "ever"}]}),
    );
    let manifest = write_json(
        &dir,
        "manifest.json",
        &json!({"db": [{"changeUnitId": "001", "fileName": "001_rename.json"}]}),
    );

    let provider = Arc::new(MemoryStoreProvider::new());
    let engine = MigrationEngine::new(provider.clone());
    for _ in 0..3 {
        engine.run(&manifest).expect("Run should not abort");
    }

    let handle = provider.resolve("db").expect("Failed to resolve db");
    let entries = ledger(handle.as_ref());
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e["success"] == json!(false)));
}
