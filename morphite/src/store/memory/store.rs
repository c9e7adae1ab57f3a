use super::{apply_update, matches_filter};
use crate::errors::{ErrorKind, MorphiteError, MorphiteResult};
use crate::store::{Document, StoreHandle, StoreProvider};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

const DOC_ID: &str = "_id";

/// In-memory implementation of a [`StoreProvider`].
///
/// # Purpose
/// `MemoryStoreProvider` hosts a set of in-memory databases, created lazily
/// on first resolution. It is the backend used by the test suite and is
/// suitable for embedding wherever persistence is not required.
///
/// # Characteristics
/// - **Thread-Safe**: databases live in a concurrent map, each database's
///   state behind its own mutex
/// - **Lazy**: a database exists from the moment it is first resolved
/// - **Unique Ids**: inserting a duplicate `_id` into a collection is a
///   unique constraint violation
/// - **No Persistence**: all data is lost when the provider is dropped
///
/// # Usage
/// ```ignore
/// let provider = MemoryStoreProvider::new();
/// let handle = provider.resolve("inventory")?;
/// handle.create_collection("orders")?;
/// ```
#[derive(Clone, Default)]
pub struct MemoryStoreProvider {
    inner: Arc<MemoryStoreProviderInner>,
}

impl MemoryStoreProvider {
    /// Creates a new provider with no databases.
    pub fn new() -> Self {
        MemoryStoreProvider::default()
    }

    /// Marks a database name as unreachable.
    ///
    /// Subsequent resolutions of that name fail with a
    /// `StoreConnectionError`, mimicking a store that is down or rejects
    /// authentication.
    pub fn refuse(&self, database: &str) {
        self.inner.refused.insert(database.to_string(), ());
    }
}

impl StoreProvider for MemoryStoreProvider {
    fn resolve(&self, database: &str) -> MorphiteResult<Arc<dyn StoreHandle>> {
        if self.inner.refused.contains_key(database) {
            return Err(MorphiteError::new(
                &format!("database '{}' is unreachable", database),
                ErrorKind::StoreConnectionError,
            ));
        }
        let entry = self
            .inner
            .databases
            .entry(database.to_string())
            .or_insert_with(|| Arc::new(MemoryDatabase::new(database)));
        Ok(Arc::new(MemoryStoreHandle {
            database: entry.clone(),
        }))
    }
}

#[derive(Default)]
struct MemoryStoreProviderInner {
    databases: DashMap<String, Arc<MemoryDatabase>>,
    refused: DashMap<String, ()>,
}

/// One in-memory database: named collections of documents plus an optional
/// transaction snapshot.
struct MemoryDatabase {
    name: String,
    state: Mutex<DatabaseState>,
}

#[derive(Default)]
struct DatabaseState {
    collections: BTreeMap<String, MemoryCollection>,
    // Clone of `collections` taken at transaction begin; abort restores it.
    snapshot: Option<BTreeMap<String, MemoryCollection>>,
}

#[derive(Clone, Default)]
struct MemoryCollection {
    documents: Vec<Document>,
}

impl MemoryDatabase {
    fn new(name: &str) -> Self {
        MemoryDatabase {
            name: name.to_string(),
            state: Mutex::new(DatabaseState::default()),
        }
    }
}

/// Store handle bound to one in-memory database.
pub struct MemoryStoreHandle {
    database: Arc<MemoryDatabase>,
}

impl MemoryStoreHandle {
    fn id_key(document: &Document) -> Option<String> {
        document.get(DOC_ID).map(value_key)
    }
}

/// Canonical string form of an `_id` value, used for uniqueness checks.
fn value_key(value: &Value) -> String {
    value.to_string()
}

impl StoreHandle for MemoryStoreHandle {
    fn database_name(&self) -> &str {
        &self.database.name
    }

    fn collection_exists(&self, collection: &str) -> MorphiteResult<bool> {
        let state = self.database.state.lock();
        Ok(state.collections.contains_key(collection))
    }

    fn create_collection(&self, collection: &str) -> MorphiteResult<()> {
        let mut state = self.database.state.lock();
        if state.collections.contains_key(collection) {
            return Err(MorphiteError::new(
                &format!("collection '{}' already exists", collection),
                ErrorKind::OperationError,
            ));
        }
        state
            .collections
            .insert(collection.to_string(), MemoryCollection::default());
        Ok(())
    }

    fn drop_collection(&self, collection: &str) -> MorphiteResult<()> {
        let mut state = self.database.state.lock();
        match state.collections.remove(collection) {
            Some(_) => Ok(()),
            None => Err(MorphiteError::new(
                &format!("collection '{}' does not exist", collection),
                ErrorKind::CollectionNotFound,
            )),
        }
    }

    fn rename_collection(&self, old_name: &str, new_name: &str) -> MorphiteResult<()> {
        let mut state = self.database.state.lock();
        if state.collections.contains_key(new_name) {
            return Err(MorphiteError::new(
                &format!("collection '{}' already exists", new_name),
                ErrorKind::OperationError,
            ));
        }
        match state.collections.remove(old_name) {
            Some(existing) => {
                state.collections.insert(new_name.to_string(), existing);
                Ok(())
            }
            None => Err(MorphiteError::new(
                &format!("collection '{}' does not exist", old_name),
                ErrorKind::CollectionNotFound,
            )),
        }
    }

    fn insert_many(&self, collection: &str, documents: &[Document]) -> MorphiteResult<u64> {
        let mut state = self.database.state.lock();
        // Document stores create the target collection on first insert.
        let target = state.collections.entry(collection.to_string()).or_default();

        let mut inserted = 0;
        for document in documents {
            let mut document = document.clone();
            let id = match Self::id_key(&document) {
                Some(id) => id,
                None => {
                    let id = Value::String(Uuid::new_v4().to_string());
                    let key = value_key(&id);
                    document.insert(DOC_ID.to_string(), id);
                    key
                }
            };
            let duplicate = target
                .documents
                .iter()
                .any(|existing| Self::id_key(existing).as_deref() == Some(id.as_str()));
            if duplicate {
                return Err(MorphiteError::new(
                    &format!(
                        "duplicate id {} in collection '{}' after {} inserts",
                        id, collection, inserted
                    ),
                    ErrorKind::UniqueConstraintViolation,
                ));
            }
            target.documents.push(document);
            inserted += 1;
        }
        Ok(inserted)
    }

    fn update_many(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
    ) -> MorphiteResult<u64> {
        let mut state = self.database.state.lock();
        let target = match state.collections.get_mut(collection) {
            Some(target) => target,
            None => return Ok(0),
        };
        let mut modified = 0;
        for document in target.documents.iter_mut() {
            if matches_filter(document, filter) && apply_update(document, update)? {
                modified += 1;
            }
        }
        Ok(modified)
    }

    fn delete_many(&self, collection: &str, filter: &Document) -> MorphiteResult<u64> {
        let mut state = self.database.state.lock();
        let target = match state.collections.get_mut(collection) {
            Some(target) => target,
            None => return Ok(0),
        };
        let before = target.documents.len();
        target
            .documents
            .retain(|document| !matches_filter(document, filter));
        Ok((before - target.documents.len()) as u64)
    }

    fn find(&self, collection: &str, filter: &Document) -> MorphiteResult<Vec<Document>> {
        let state = self.database.state.lock();
        let target = match state.collections.get(collection) {
            Some(target) => target,
            None => return Ok(Vec::new()),
        };
        Ok(target
            .documents
            .iter()
            .filter(|document| matches_filter(document, filter))
            .cloned()
            .collect())
    }

    fn begin_transaction(&self) -> MorphiteResult<()> {
        let mut state = self.database.state.lock();
        if state.snapshot.is_some() {
            return Err(MorphiteError::new(
                &format!("transaction already open on '{}'", self.database.name),
                ErrorKind::TransactionError,
            ));
        }
        state.snapshot = Some(state.collections.clone());
        Ok(())
    }

    fn commit_transaction(&self) -> MorphiteResult<()> {
        let mut state = self.database.state.lock();
        match state.snapshot.take() {
            Some(_) => Ok(()),
            None => Err(MorphiteError::new(
                &format!("no open transaction on '{}'", self.database.name),
                ErrorKind::TransactionError,
            )),
        }
    }

    fn abort_transaction(&self) -> MorphiteResult<()> {
        let mut state = self.database.state.lock();
        match state.snapshot.take() {
            Some(snapshot) => {
                state.collections = snapshot;
                Ok(())
            }
            None => Err(MorphiteError::new(
                &format!("no open transaction on '{}'", self.database.name),
                ErrorKind::TransactionError,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn handle() -> Arc<dyn StoreHandle> {
        MemoryStoreProvider::new().resolve("testdb").unwrap()
    }

    #[test]
    fn resolve_creates_database_lazily() {
        let provider = MemoryStoreProvider::new();
        let handle = provider.resolve("inventory").unwrap();
        assert_eq!(handle.database_name(), "inventory");
        assert!(!handle.collection_exists("orders").unwrap());
    }

    #[test]
    fn resolve_refused_database_fails() {
        let provider = MemoryStoreProvider::new();
        provider.refuse("broken");
        let err = provider.resolve("broken").err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::StoreConnectionError);
    }

    #[test]
    fn handles_for_same_database_share_state() {
        let provider = MemoryStoreProvider::new();
        let first = provider.resolve("shared").unwrap();
        let second = provider.resolve("shared").unwrap();
        first.create_collection("orders").unwrap();
        assert!(second.collection_exists("orders").unwrap());
    }

    #[test]
    fn create_existing_collection_fails() {
        let handle = handle();
        handle.create_collection("orders").unwrap();
        let err = handle.create_collection("orders").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::OperationError);
    }

    #[test]
    fn drop_missing_collection_fails() {
        let handle = handle();
        let err = handle.drop_collection("missing").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::CollectionNotFound);
    }

    #[test]
    fn rename_moves_documents() {
        let handle = handle();
        handle
            .insert_many("old", &[doc(json!({"_id": 1, "x": 1}))])
            .unwrap();
        handle.rename_collection("old", "new").unwrap();
        assert!(!handle.collection_exists("old").unwrap());
        assert_eq!(handle.find("new", &Document::new()).unwrap().len(), 1);
    }

    #[test]
    fn rename_onto_existing_collection_fails() {
        let handle = handle();
        handle.create_collection("a").unwrap();
        handle.create_collection("b").unwrap();
        let err = handle.rename_collection("a", "b").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::OperationError);
    }

    #[test]
    fn insert_creates_collection_and_generates_ids() {
        let handle = handle();
        let count = handle
            .insert_many("orders", &[doc(json!({"sku": "a"})), doc(json!({"sku": "b"}))])
            .unwrap();
        assert_eq!(count, 2);
        let found = handle.find("orders", &Document::new()).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|d| d.contains_key("_id")));
    }

    #[test]
    fn insert_duplicate_id_is_constraint_violation() {
        let handle = handle();
        let batch = vec![
            doc(json!({"_id": 1})),
            doc(json!({"_id": 2})),
            doc(json!({"_id": 1})),
            doc(json!({"_id": 3})),
        ];
        let err = handle.insert_many("orders", &batch).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UniqueConstraintViolation);
        // Partial insertion is visible outside a transaction scope.
        assert_eq!(handle.find("orders", &Document::new()).unwrap().len(), 2);
    }

    #[test]
    fn update_many_touches_all_matches() {
        let handle = handle();
        handle
            .insert_many(
                "users",
                &[
                    doc(json!({"_id": 1, "role": "admin"})),
                    doc(json!({"_id": 2, "role": "admin"})),
                    doc(json!({"_id": 3, "role": "guest"})),
                ],
            )
            .unwrap();
        let modified = handle
            .update_many(
                "users",
                &doc(json!({"role": "admin"})),
                &doc(json!({"$set": {"active": true}})),
            )
            .unwrap();
        assert_eq!(modified, 2);
        let active = handle.find("users", &doc(json!({"active": true}))).unwrap();
        assert_eq!(active.len(), 2);
    }

    #[test]
    fn update_and_delete_on_missing_collection_match_nothing() {
        let handle = handle();
        let modified = handle
            .update_many("none", &Document::new(), &doc(json!({"$set": {"x": 1}})))
            .unwrap();
        assert_eq!(modified, 0);
        let deleted = handle.delete_many("none", &Document::new()).unwrap();
        assert_eq!(deleted, 0);
    }

    #[test]
    fn delete_many_removes_all_matches() {
        let handle = handle();
        handle
            .insert_many(
                "users",
                &[
                    doc(json!({"_id": 1, "role": "guest"})),
                    doc(json!({"_id": 2, "role": "guest"})),
                    doc(json!({"_id": 3, "role": "admin"})),
                ],
            )
            .unwrap();
        let deleted = handle
            .delete_many("users", &doc(json!({"role": "guest"})))
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(handle.find("users", &Document::new()).unwrap().len(), 1);
    }

    #[test]
    fn abort_restores_pre_transaction_state() {
        let handle = handle();
        handle
            .insert_many("orders", &[doc(json!({"_id": 1}))])
            .unwrap();

        handle.begin_transaction().unwrap();
        handle
            .insert_many("orders", &[doc(json!({"_id": 2}))])
            .unwrap();
        handle.create_collection("extra").unwrap();
        handle.abort_transaction().unwrap();

        assert_eq!(handle.find("orders", &Document::new()).unwrap().len(), 1);
        assert!(!handle.collection_exists("extra").unwrap());
    }

    #[test]
    fn commit_keeps_transaction_mutations() {
        let handle = handle();
        handle.begin_transaction().unwrap();
        handle
            .insert_many("orders", &[doc(json!({"_id": 1}))])
            .unwrap();
        handle.commit_transaction().unwrap();
        assert_eq!(handle.find("orders", &Document::new()).unwrap().len(), 1);
    }

    #[test]
    fn nested_transaction_is_rejected() {
        let handle = handle();
        handle.begin_transaction().unwrap();
        let err = handle.begin_transaction().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::TransactionError);
        handle.abort_transaction().unwrap();
    }

    #[test]
    fn commit_without_transaction_is_rejected() {
        let handle = handle();
        let err = handle.commit_transaction().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::TransactionError);
    }
}
