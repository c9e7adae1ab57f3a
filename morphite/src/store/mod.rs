mod memory;

pub use memory::*;

use crate::errors::MorphiteResult;
use std::sync::Arc;

/// A JSON document, the unit of storage in a target document store.
///
/// Filters, update documents, and stored records are all plain JSON objects;
/// the engine never interprets them beyond what the store backend requires.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Factory for store handles, one per logical database.
///
/// # Purpose
/// Abstracts how a database name turns into an open connection. The engine
/// and the [`crate::router::DatabaseRouter`] depend on this capability, not
/// on any particular store's client API.
///
/// # Implementations
/// - [`MemoryStoreProvider`]: in-memory databases for testing and embedding
///
/// # Thread Safety
/// Implementers must be `Send + Sync`; a provider is shared across all
/// databases of one engine run.
pub trait StoreProvider: Send + Sync {
    /// Opens (or creates) a handle to the named database.
    ///
    /// # Returns
    /// * `Ok(Arc<dyn StoreHandle>)` if the database is reachable
    /// * `Err(MorphiteError)` with kind `StoreConnectionError` otherwise
    fn resolve(&self, database: &str) -> MorphiteResult<Arc<dyn StoreHandle>>;
}

/// An open, addressable session to one target database.
///
/// # Purpose
/// Defines the contract every store backend must follow: collection
/// lifecycle, bulk document mutation, filtered reads, and a transaction
/// scope. This is the complete set of capabilities the migration engine
/// relies on.
///
/// # Key Responsibilities
/// - **Collection Lifecycle**: existence check, create, drop, rename
/// - **Bulk Mutation**: insert-many, update-many-by-filter, delete-many-by-filter
/// - **Reads**: filtered find, used by the changelog ledger
/// - **Transactions**: begin, commit, abort, scoped to one change unit
///
/// # Thread Safety
/// Implementers must be `Send + Sync`. Change units against one handle are
/// executed strictly sequentially; handles for different databases may be
/// driven concurrently.
pub trait StoreHandle: Send + Sync {
    /// Returns the logical database name this handle is bound to.
    fn database_name(&self) -> &str;

    /// Checks whether the named collection exists.
    fn collection_exists(&self, collection: &str) -> MorphiteResult<bool>;

    /// Creates the named collection.
    ///
    /// Backends may treat creation of an existing collection as an error;
    /// the executor checks existence first and never relies on tolerance
    /// here.
    fn create_collection(&self, collection: &str) -> MorphiteResult<()>;

    /// Drops the named collection.
    fn drop_collection(&self, collection: &str) -> MorphiteResult<()>;

    /// Renames a collection, keeping its contents.
    fn rename_collection(&self, old_name: &str, new_name: &str) -> MorphiteResult<()>;

    /// Inserts the documents in the given order.
    ///
    /// # Returns
    /// The number of documents inserted. A mid-batch failure is reported as
    /// an error; documents inserted before the failure remain pending inside
    /// the surrounding transaction scope and are reverted by its abort.
    fn insert_many(&self, collection: &str, documents: &[Document]) -> MorphiteResult<u64>;

    /// Applies `update` to every document matching `filter`.
    ///
    /// # Returns
    /// The number of documents modified.
    fn update_many(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
    ) -> MorphiteResult<u64>;

    /// Deletes every document matching `filter`.
    ///
    /// # Returns
    /// The number of documents deleted.
    fn delete_many(&self, collection: &str, filter: &Document) -> MorphiteResult<u64>;

    /// Returns all documents matching `filter`.
    ///
    /// A missing collection yields an empty result, not an error; the
    /// changelog ledger relies on this before its collection first exists.
    fn find(&self, collection: &str, filter: &Document) -> MorphiteResult<Vec<Document>>;

    /// Opens a transaction scope on this database.
    ///
    /// At most one scope is open per handle at a time; change units execute
    /// sequentially.
    fn begin_transaction(&self) -> MorphiteResult<()>;

    /// Commits the open transaction scope.
    fn commit_transaction(&self) -> MorphiteResult<()>;

    /// Aborts the open transaction scope, discarding its mutations.
    fn abort_transaction(&self) -> MorphiteResult<()>;
}
