use crate::errors::{ErrorKind, MorphiteError, MorphiteResult};
use crate::operation::OperationKind;
use crate::store::{Document, StoreHandle};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Name of the ledger collection inside every target database.
pub const CHANGELOG_COLLECTION: &str = "changelog";

/// One durable record of a change-unit application attempt.
///
/// Entries are immutable once written; the ledger is append-only and records
/// failed attempts as well as successful ones. Exactly one entry is written
/// per attempted change unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    pub id: Uuid,
    pub change_unit_id: String,
    pub operation: OperationKind,
    pub affected_collections: Vec<String>,
    pub applied_at: DateTime<Utc>,
    pub success: bool,
    pub source_file: String,
}

impl ChangeLogEntry {
    /// Creates an entry stamped with the current time and a fresh id.
    pub fn new(
        change_unit_id: &str,
        operation: OperationKind,
        affected_collections: Vec<String>,
        success: bool,
        source_file: &str,
    ) -> Self {
        ChangeLogEntry {
            id: Uuid::new_v4(),
            change_unit_id: change_unit_id.to_string(),
            operation,
            affected_collections,
            applied_at: Utc::now(),
            success,
            source_file: source_file.to_string(),
        }
    }

    fn to_document(&self) -> MorphiteResult<Document> {
        match serde_json::to_value(self)? {
            Value::Object(document) => Ok(document),
            _ => Err(MorphiteError::new(
                "changelog entry did not serialize to an object",
                ErrorKind::EncodingError,
            )),
        }
    }
}

/// Append-only audit ledger and idempotency oracle for one target database.
///
/// # Purpose
/// `ChangeLogStore` answers "has this change unit ever been applied
/// successfully here?" and appends one record per attempt. It lives in the
/// `changelog` collection of the database it audits, so the ledger travels
/// with the data it describes.
///
/// Idempotency is ever-applied, keyed by `(database, changeUnitId)` for the
/// lifetime of the database. It is never a rolling time window; a window
/// would silently re-apply change units once it elapsed.
pub struct ChangeLogStore {
    handle: Arc<dyn StoreHandle>,
}

impl ChangeLogStore {
    pub fn new(handle: Arc<dyn StoreHandle>) -> Self {
        ChangeLogStore { handle }
    }

    /// Returns true iff a successful ledger entry exists for this id.
    ///
    /// A database whose `changelog` collection does not exist yet has no
    /// history; that reads as `false`, not an error.
    pub fn is_applied(&self, change_unit_id: &str) -> MorphiteResult<bool> {
        if !self.handle.collection_exists(CHANGELOG_COLLECTION)? {
            debug!(
                "no '{}' collection in database '{}' yet",
                CHANGELOG_COLLECTION,
                self.handle.database_name()
            );
            return Ok(false);
        }

        let mut filter = Document::new();
        filter.insert(
            "changeUnitId".to_string(),
            Value::String(change_unit_id.to_string()),
        );
        filter.insert("success".to_string(), Value::Bool(true));
        let matches = self.handle.find(CHANGELOG_COLLECTION, &filter)?;
        Ok(!matches.is_empty())
    }

    /// Appends one entry to the ledger.
    ///
    /// An append failure is reported at warn level and swallowed: the
    /// outcome the entry describes was already decided, and a ledger write
    /// must never reverse it.
    pub fn record(&self, entry: &ChangeLogEntry) {
        match self.try_record(entry) {
            Ok(()) => debug!(
                "changelog entry recorded for change unit '{}' in database '{}' (success: {})",
                entry.change_unit_id,
                self.handle.database_name(),
                entry.success
            ),
            Err(err) => {
                let err = MorphiteError::new_with_cause(
                    &format!(
                        "failed to record changelog entry for change unit '{}' in database '{}'",
                        entry.change_unit_id,
                        self.handle.database_name()
                    ),
                    ErrorKind::LogWriteError,
                    err,
                );
                warn!("{}", err);
            }
        }
    }

    fn try_record(&self, entry: &ChangeLogEntry) -> MorphiteResult<()> {
        let document = entry.to_document()?;
        self.handle.insert_many(CHANGELOG_COLLECTION, &[document])?;
        Ok(())
    }
}
