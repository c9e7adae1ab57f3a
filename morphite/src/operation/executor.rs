use crate::errors::{ErrorKind, MorphiteError, MorphiteResult};
use crate::operation::OperationSpec;
use crate::store::StoreHandle;
use log::{debug, info};

/// Applies one [`OperationSpec`] against a store handle.
///
/// # Purpose
/// The executor is the only component that turns typed operations into store
/// calls. Every variant is deterministic given its inputs and the store's
/// prior state.
///
/// # Tolerance policy
/// - **Create**: a collection that already exists is a no-op, not an error
/// - **Drop**: a collection that does not exist is a no-op, not an error
/// - **Rename**: a missing source collection is an `OperationError`; a
///   rename implies the source was expected to be present
/// - **Insert/Update/Delete**: any store failure fails the whole attempt
pub struct OperationExecutor;

impl OperationExecutor {
    /// Applies the operation, returning the collection names it touched.
    ///
    /// The returned names feed the changelog entry of the surrounding change
    /// unit. The caller owns the transaction scope; the executor itself
    /// never begins or ends one.
    pub fn apply(handle: &dyn StoreHandle, spec: &OperationSpec) -> MorphiteResult<Vec<String>> {
        match spec {
            OperationSpec::Create { collections } => Self::apply_create(handle, collections),
            OperationSpec::Drop { collection } => Self::apply_drop(handle, collection),
            OperationSpec::Rename {
                old_collection,
                new_collection,
            } => Self::apply_rename(handle, old_collection, new_collection),
            OperationSpec::Insert {
                collection,
                documents,
            } => {
                let inserted = handle.insert_many(collection, documents)?;
                info!(
                    "inserted {} documents into '{}' in database '{}'",
                    inserted,
                    collection,
                    handle.database_name()
                );
                Ok(vec![collection.clone()])
            }
            OperationSpec::Update {
                collection,
                queries,
            } => {
                let mut modified = 0;
                for query in queries {
                    modified += handle.update_many(collection, &query.filter, &query.update)?;
                }
                info!(
                    "updated {} documents in '{}' in database '{}'",
                    modified,
                    collection,
                    handle.database_name()
                );
                Ok(vec![collection.clone()])
            }
            OperationSpec::Delete {
                collection,
                queries,
            } => {
                let mut deleted = 0;
                for query in queries {
                    deleted += handle.delete_many(collection, &query.filter)?;
                }
                info!(
                    "deleted {} documents from '{}' in database '{}'",
                    deleted,
                    collection,
                    handle.database_name()
                );
                Ok(vec![collection.clone()])
            }
        }
    }

    fn apply_create(handle: &dyn StoreHandle, collections: &[String]) -> MorphiteResult<Vec<String>> {
        for collection in collections {
            if handle.collection_exists(collection)? {
                debug!(
                    "collection '{}' already exists in database '{}'",
                    collection,
                    handle.database_name()
                );
                continue;
            }
            handle.create_collection(collection)?;
            info!(
                "collection '{}' created in database '{}'",
                collection,
                handle.database_name()
            );
        }
        Ok(collections.to_vec())
    }

    fn apply_drop(handle: &dyn StoreHandle, collection: &str) -> MorphiteResult<Vec<String>> {
        if handle.collection_exists(collection)? {
            handle.drop_collection(collection)?;
            info!(
                "collection '{}' dropped from database '{}'",
                collection,
                handle.database_name()
            );
        } else {
            debug!(
                "collection '{}' does not exist in database '{}', nothing to drop",
                collection,
                handle.database_name()
            );
        }
        Ok(vec![collection.to_string()])
    }

    fn apply_rename(
        handle: &dyn StoreHandle,
        old_name: &str,
        new_name: &str,
    ) -> MorphiteResult<Vec<String>> {
        if !handle.collection_exists(old_name)? {
            return Err(MorphiteError::new(
                &format!(
                    "cannot rename '{}' to '{}': source collection does not exist in database '{}'",
                    old_name,
                    new_name,
                    handle.database_name()
                ),
                ErrorKind::OperationError,
            ));
        }
        handle.rename_collection(old_name, new_name)?;
        info!(
            "collection '{}' renamed to '{}' in database '{}'",
            old_name,
            new_name,
            handle.database_name()
        );
        Ok(vec![old_name.to_string(), new_name.to_string()])
    }
}
