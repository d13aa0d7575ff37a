//! Offline-first replication for polystore.
//!
//! The sync manager coordinates a primary adapter and a remote adapter:
//! it probes connectivity, enforces storage budgets, pulls and pushes
//! table rows keyed by `id` and ordered by `updated_at`, resolves
//! conflicts under a configurable policy, and runs under manual, debounced,
//! periodic, realtime, or reconnect-driven schedules.
//!
//! The manager is a single cooperative task driven by a command channel;
//! at most one sync cycle runs at a time and `close()` aborts an in-flight
//! cycle at the next table boundary.
//!
//! The crate also carries the export/import helpers the manager and the
//! [`backup`] layer are built on: catalog discovery, JSON dump documents,
//! and SQL dump scripts.

/// Sync policy, modes, strategies, and per-table overrides.
pub mod config;

/// Callback hooks.
pub mod hooks;

/// Synchronized records and their timestamp normalization.
pub mod record;

/// Conflicts and their resolution.
pub mod conflict;

/// Cycle results.
pub mod result;

/// Identifier quoting and statement generation shared by sync and export.
mod sql;

/// Storage budget enforcement.
mod budget;

/// The sync cycle.
mod cycle;

/// The manager task and its tracking wrapper adapter.
pub mod manager;

/// Database export and import.
pub mod export;

/// Object-store backups.
pub mod backup;

pub use backup::{BackupFormat, BackupManager, BackupOptions, ObjectStore};
pub use config::{
    ConflictStrategy, MergeFn, StorageLimitAction, SyncDirection, SyncMode, SyncPolicy,
    TablePriority, TableSync,
};
pub use conflict::{ConflictResolution, SyncConflict};
pub use export::{export_json, export_sql, import_json, list_tables, DumpDocument, DumpTable};
pub use hooks::{SyncHooks, SyncProgress};
pub use manager::SyncManager;
pub use record::SyncRecord;
pub use result::SyncResult;

pub use polystore_common::{Result, StorageError};
