//! # Morphite - Document Store Migration Engine
//!
//! Morphite applies a declaratively-described, ordered set of data and
//! schema changes ("change units") to one or more document-store databases,
//! exactly once per change unit, with an auditable record of what was
//! applied and whether it succeeded. It is the document-store analogue of a
//! relational schema-migration runner: "schema changes" are collection
//! lifecycle operations (create/drop/rename) and "data changes" are bulk
//! document mutations (insert/update/delete) expressed as JSON.
//!
//! ## Key Guarantees
//!
//! - **Exactly-once application**: a change unit with a prior successful
//!   ledger entry is never re-executed against that database
//! - **Deterministic ordering**: change units run in ascending id order,
//!   regardless of manifest file order
//! - **Atomicity per change unit**: each change unit's mutations are scoped
//!   to one transaction, committed or aborted as a whole
//! - **Full audit trail**: every attempt, failed or not, leaves exactly one
//!   append-only ledger entry
//! - **Fail-forward**: a failed change unit never blocks later ones; a
//!   failed database never blocks other databases
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use morphite::engine::MigrationEngine;
//! use morphite::store::MemoryStoreProvider;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = Arc::new(MemoryStoreProvider::new());
//! let engine = MigrationEngine::new(provider);
//! engine.run(Path::new("migrations/manifest.json"))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## File Formats
//!
//! The manifest is a JSON object keyed by database name, each section an
//! array of `{"changeUnitId": "...", "fileName": "..."}` entries. A change
//! unit file holds exactly one of `create`, `drop`, `rename`, or a
//! collection-operation bundle (`collectionName` plus any of `insert`,
//! `update`, `delete`).
//!
//! ## Module Organization
//!
//! - [`changelog`] - The append-only audit ledger and idempotency oracle
//! - [`engine`] - The migration-execution engine and change-unit state machine
//! - [`errors`] - Error types and result definitions
//! - [`manifest`] - Manifest loading and the deterministic execution plan
//! - [`operation`] - Typed operation specs, parsing, and execution
//! - [`router`] - Per-run database handle resolution and caching
//! - [`store`] - Store capability traits and the in-memory backend

pub mod changelog;
pub mod engine;
pub mod errors;
pub mod manifest;
pub mod operation;
pub mod router;
pub mod store;
