use crate::store::Document;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The kind of a change-unit operation, as recorded in the changelog ledger.
///
/// `Batch` marks a change unit whose collection-operation bundle spans more
/// than one kind (an insert plus an update in the same file), or one that
/// failed before its kind could be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    #[serde(rename = "create")]
    Create,
    #[serde(rename = "insert")]
    Insert,
    #[serde(rename = "update")]
    Update,
    #[serde(rename = "delete")]
    Delete,
    #[serde(rename = "rename")]
    Rename,
    #[serde(rename = "drop")]
    Drop,
    #[serde(rename = "batchOperation")]
    Batch,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationKind::Create => "create",
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Rename => "rename",
            OperationKind::Drop => "drop",
            OperationKind::Batch => "batchOperation",
        };
        write!(f, "{}", name)
    }
}

/// One `{filter, update}` pair of an update operation.
///
/// The update document is already normalized: it consists of operator keys
/// only (a bare field map is wrapped in `$set` at parse time).
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateQuery {
    pub filter: Document,
    pub update: Document,
}

/// One `{filter}` entry of a delete operation.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteQuery {
    pub filter: Document,
}

/// A single typed operation decoded from a change-unit file.
///
/// Pure data; interpretation lives in
/// [`OperationExecutor`](crate::operation::OperationExecutor).
#[derive(Debug, Clone, PartialEq)]
pub enum OperationSpec {
    /// Create every listed collection that does not already exist.
    Create { collections: Vec<String> },
    /// Drop one collection if it exists.
    Drop { collection: String },
    /// Rename a collection; a missing source is a failure.
    Rename {
        old_collection: String,
        new_collection: String,
    },
    /// Insert documents into one collection, in order.
    Insert {
        collection: String,
        documents: Vec<Document>,
    },
    /// Apply each update to all documents matching its filter.
    Update {
        collection: String,
        queries: Vec<UpdateQuery>,
    },
    /// Delete all documents matching each filter.
    Delete {
        collection: String,
        queries: Vec<DeleteQuery>,
    },
}

impl OperationSpec {
    /// Returns the kind of this operation.
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationSpec::Create { .. } => OperationKind::Create,
            OperationSpec::Drop { .. } => OperationKind::Drop,
            OperationSpec::Rename { .. } => OperationKind::Rename,
            OperationSpec::Insert { .. } => OperationKind::Insert,
            OperationSpec::Update { .. } => OperationKind::Update,
            OperationSpec::Delete { .. } => OperationKind::Delete,
        }
    }
}
