use crate::errors::{ErrorKind, MorphiteError, MorphiteResult};
use crate::store::{StoreHandle, StoreProvider};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use std::sync::Arc;

/// Resolves logical database names to cached store handles.
///
/// # Purpose
/// A router memoizes handle resolution per database name for the duration of
/// one engine run: the first resolution opens the connection, every later
/// one returns the cached handle. The table is owned by the engine instance
/// that created it, never process-wide, so its lifetime is the run.
///
/// # Thread Safety
/// The table is a concurrent map; it is populated at most once per name and
/// safe to read from multiple threads after population.
pub struct DatabaseRouter {
    provider: Arc<dyn StoreProvider>,
    handles: DashMap<String, Arc<dyn StoreHandle>>,
}

impl DatabaseRouter {
    pub fn new(provider: Arc<dyn StoreProvider>) -> Self {
        DatabaseRouter {
            provider,
            handles: DashMap::new(),
        }
    }

    /// Returns the handle for a database, resolving it on first use.
    ///
    /// # Errors
    /// `StoreConnectionError` when the provider cannot reach the database.
    /// The failure is fatal for that database's plan only; other databases
    /// resolve independently.
    pub fn resolve(&self, database: &str) -> MorphiteResult<Arc<dyn StoreHandle>> {
        match self.handles.entry(database.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                debug!("opening store handle for database '{}'", database);
                let handle = self.provider.resolve(database).map_err(|err| {
                    MorphiteError::new_with_cause(
                        &format!("cannot resolve database '{}'", database),
                        ErrorKind::StoreConnectionError,
                        err,
                    )
                })?;
                entry.insert(handle.clone());
                Ok(handle)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Document, MemoryStoreProvider};
    use parking_lot::Mutex;

    /// Counts resolutions before delegating to a memory provider.
    struct CountingProvider {
        delegate: MemoryStoreProvider,
        resolutions: Mutex<Vec<String>>,
    }

    impl StoreProvider for CountingProvider {
        fn resolve(&self, database: &str) -> MorphiteResult<Arc<dyn StoreHandle>> {
            self.resolutions.lock().push(database.to_string());
            self.delegate.resolve(database)
        }
    }

    #[test]
    fn resolve_memoizes_per_database_name() {
        let provider = Arc::new(CountingProvider {
            delegate: MemoryStoreProvider::new(),
            resolutions: Mutex::new(Vec::new()),
        });
        let router = DatabaseRouter::new(provider.clone());

        let first = router.resolve("db1").unwrap();
        let second = router.resolve("db1").unwrap();
        router.resolve("db2").unwrap();

        assert_eq!(
            *provider.resolutions.lock(),
            vec!["db1".to_string(), "db2".to_string()]
        );
        // Cached handles address the same database state.
        first.create_collection("orders").unwrap();
        assert!(second.collection_exists("orders").unwrap());
    }

    #[test]
    fn resolution_failure_is_store_connection_error() {
        let delegate = MemoryStoreProvider::new();
        delegate.refuse("down");
        let router = DatabaseRouter::new(Arc::new(delegate));

        let err = router.resolve("down").err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::StoreConnectionError);
        assert!(err.cause().is_some());
    }

    #[test]
    fn failed_resolution_is_not_cached_as_success() {
        let delegate = MemoryStoreProvider::new();
        delegate.refuse("down");
        let router = DatabaseRouter::new(Arc::new(delegate));

        assert!(router.resolve("down").is_err());
        // Other databases still resolve through the same router.
        let handle = router.resolve("up").unwrap();
        assert_eq!(
            handle.find("anything", &Document::new()).unwrap().len(),
            0
        );
    }
}
