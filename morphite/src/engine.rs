use crate::changelog::{ChangeLogEntry, ChangeLogStore};
use crate::errors::{ErrorKind, MorphiteError, MorphiteResult};
use crate::manifest::{ChangeUnitRef, Manifest};
use crate::operation::{parse_change_unit, OperationExecutor, OperationKind, OperationSpec};
use crate::router::DatabaseRouter;
use crate::store::{StoreHandle, StoreProvider};
use itertools::Itertools;
use log::{error, info, warn};
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Terminal state of one change unit within a run.
///
/// A change unit starts pending; an already-applied one ends `Skipped`
/// without touching anything, otherwise it is applied inside a transaction
/// scope and ends `Committed` or `RolledBack`. A `RolledBack` outcome is
/// terminal for the run; re-running the engine later is the retry mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeUnitOutcome {
    /// A prior successful ledger entry exists; nothing was executed.
    Skipped,
    /// Every operation succeeded and the transaction scope committed.
    Committed,
    /// Parsing or execution failed; the transaction scope was aborted.
    RolledBack,
}

impl Display for ChangeUnitOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeUnitOutcome::Skipped => write!(f, "skipped"),
            ChangeUnitOutcome::Committed => write!(f, "committed"),
            ChangeUnitOutcome::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// The migration-execution engine.
///
/// # Purpose
/// `MigrationEngine` orchestrates a full run: load the manifest, resolve
/// each database, and for each change unit in ascending id order decide
/// skip-or-apply, wrap the application in a transaction scope, and record
/// exactly one ledger entry per attempt.
///
/// # Failure containment
/// Errors local to one change unit never cross the per-change-unit boundary
/// (fail-forward: later change units still run); errors local to one
/// database never cross the per-database boundary. Only a malformed
/// manifest aborts the run, and it does so before any mutation. The ledger
/// is the source of truth for what succeeded; there is no separate run
/// report.
///
/// # Usage
/// ```rust,ignore
/// let provider = Arc::new(MemoryStoreProvider::new());
/// let engine = MigrationEngine::new(provider);
/// engine.run(Path::new("migrations/manifest.json"))?;
/// ```
#[derive(Clone)]
pub struct MigrationEngine {
    inner: Arc<MigrationEngineInner>,
}

impl MigrationEngine {
    /// Creates an engine over a store provider.
    ///
    /// The engine owns its router and handle cache; their lifetime is this
    /// engine instance, not the process.
    pub fn new(provider: Arc<dyn StoreProvider>) -> Self {
        MigrationEngine {
            inner: Arc::new(MigrationEngineInner {
                router: DatabaseRouter::new(provider),
            }),
        }
    }

    /// Executes every change unit the manifest plans, database by database.
    ///
    /// # Errors
    /// `ManifestError` only. Per-database and per-change-unit failures are
    /// logged, recorded in the ledger where applicable, and contained.
    pub fn run(&self, manifest_path: &Path) -> MorphiteResult<()> {
        let manifest = Manifest::load(manifest_path)?;
        if manifest.is_empty() {
            warn!("manifest '{}' plans no databases", manifest_path.display());
            return Ok(());
        }

        for (database, change_units) in manifest.databases() {
            info!(
                "processing database '{}' ({} change units)",
                database,
                change_units.len()
            );
            if let Err(err) = self.inner.run_database(database, change_units) {
                error!("database '{}' skipped: {}", database, err);
            }
        }
        Ok(())
    }
}

struct MigrationEngineInner {
    router: DatabaseRouter,
}

impl MigrationEngineInner {
    /// Runs one database's plan sequentially in change-unit id order.
    ///
    /// Fails only when the database itself cannot be resolved; individual
    /// change-unit failures are contained inside [`Self::execute_change_unit`].
    fn run_database(&self, database: &str, change_units: &[ChangeUnitRef]) -> MorphiteResult<()> {
        let handle = self.router.resolve(database)?;
        let ledger = ChangeLogStore::new(handle.clone());

        for change_unit in change_units {
            let outcome = self.execute_change_unit(handle.as_ref(), &ledger, change_unit);
            info!(
                "change unit '{}' on database '{}': {}",
                change_unit.change_unit_id, database, outcome
            );
        }
        Ok(())
    }

    /// Drives one change unit through its state machine.
    ///
    /// `Pending → Skipped` when a successful ledger entry already exists,
    /// otherwise `Pending → Applying → Committed | RolledBack`. Exactly one
    /// ledger entry is written for an applied attempt, none for a skip. The
    /// entry is written after the transaction scope has ended, so a failure
    /// entry survives the abort it describes.
    fn execute_change_unit(
        &self,
        handle: &dyn StoreHandle,
        ledger: &ChangeLogStore,
        change_unit: &ChangeUnitRef,
    ) -> ChangeUnitOutcome {
        let id = change_unit.change_unit_id.as_str();
        let source_file = change_unit.source_path.display().to_string();

        match ledger.is_applied(id) {
            Ok(true) => {
                info!("change unit '{}' already applied, skipping", id);
                return ChangeUnitOutcome::Skipped;
            }
            Ok(false) => {}
            Err(err) => {
                // Cannot prove the unit was never applied; do not risk a
                // second application.
                error!("cannot check ledger for change unit '{}': {:?}", id, err);
                ledger.record(&ChangeLogEntry::new(
                    id,
                    OperationKind::Batch,
                    Vec::new(),
                    false,
                    &source_file,
                ));
                return ChangeUnitOutcome::RolledBack;
            }
        }

        let (outcome, entry) = match self.apply_change_unit(handle, change_unit) {
            Ok((kind, affected)) => (
                ChangeUnitOutcome::Committed,
                ChangeLogEntry::new(id, kind, affected, true, &source_file),
            ),
            Err((kind, err)) => {
                error!("change unit '{}' failed: {:?}", id, err);
                (
                    ChangeUnitOutcome::RolledBack,
                    ChangeLogEntry::new(id, kind, Vec::new(), false, &source_file),
                )
            }
        };
        ledger.record(&entry);
        outcome
    }

    /// Applies every operation of one change unit inside a transaction
    /// scope.
    ///
    /// # Returns
    /// On success, the recorded operation kind and the deduplicated list of
    /// collections touched across all sub-operations. On failure, the best
    /// known kind for the failure entry (`Batch` when the file never
    /// parsed).
    #[allow(clippy::result_large_err)]
    fn apply_change_unit(
        &self,
        handle: &dyn StoreHandle,
        change_unit: &ChangeUnitRef,
    ) -> Result<(OperationKind, Vec<String>), (OperationKind, MorphiteError)> {
        let specs = self
            .load_specs(change_unit)
            .map_err(|err| (OperationKind::Batch, err))?;
        let kind = recorded_kind(&specs);

        handle.begin_transaction().map_err(|err| (kind, err))?;

        let mut affected = Vec::new();
        for spec in &specs {
            match OperationExecutor::apply(handle, spec) {
                Ok(collections) => affected.extend(collections),
                Err(err) => {
                    if let Err(abort_err) = handle.abort_transaction() {
                        warn!(
                            "abort failed for change unit '{}': {:?}",
                            change_unit.change_unit_id, abort_err
                        );
                    }
                    return Err((kind, err));
                }
            }
        }

        if let Err(err) = handle.commit_transaction() {
            if let Err(abort_err) = handle.abort_transaction() {
                warn!(
                    "abort failed for change unit '{}': {:?}",
                    change_unit.change_unit_id, abort_err
                );
            }
            return Err((kind, err));
        }

        Ok((kind, affected.into_iter().unique().collect()))
    }

    /// Reads and decodes one change-unit file.
    fn load_specs(&self, change_unit: &ChangeUnitRef) -> MorphiteResult<Vec<OperationSpec>> {
        let text = fs::read_to_string(&change_unit.source_path).map_err(|err| {
            MorphiteError::new_with_cause(
                &format!(
                    "cannot read change unit file '{}'",
                    change_unit.source_path.display()
                ),
                ErrorKind::ParseError,
                err.into(),
            )
        })?;
        let body: Value = serde_json::from_str(&text).map_err(|err| {
            MorphiteError::new_with_cause(
                &format!(
                    "change unit file '{}' is not valid JSON",
                    change_unit.source_path.display()
                ),
                ErrorKind::ParseError,
                err.into(),
            )
        })?;
        parse_change_unit(&body)
    }
}

/// The operation kind recorded in the ledger for a change unit.
///
/// A change unit holding several sub-operations of one kind records that
/// kind; a bundle spanning kinds records `batchOperation`, as does an empty
/// unit.
fn recorded_kind(specs: &[OperationSpec]) -> OperationKind {
    let mut kinds = specs.iter().map(OperationSpec::kind);
    match kinds.next() {
        Some(first) if kinds.all(|kind| kind == first) => first,
        Some(_) => OperationKind::Batch,
        None => OperationKind::Batch,
    }
}
