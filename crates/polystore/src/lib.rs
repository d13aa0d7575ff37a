//! Cross-runtime SQL storage abstraction.
//!
//! One operational contract over heterogeneous SQL backends: applications
//! write against [`StorageAdapter`] and let the [`resolver`] decide at
//! runtime which backend to bind, walking a priority list with ordered
//! fallback. Uniform transactions, batching, parameter binding, migration,
//! and replication sit on top.
//!
//! # Picking a backend
//!
//! ```rust,no_run
//! use polystore::resolver::{resolve, ResolveOptions};
//!
//! # async fn example() -> polystore::Result<()> {
//! // No configuration: the native file engine, falling back to the
//! // serializable in-memory engine.
//! let db = resolve(ResolveOptions::default()).await?;
//! db.exec("CREATE TABLE IF NOT EXISTS t(k TEXT PRIMARY KEY, v INTEGER)").await?;
//! # Ok(())
//! # }
//! ```
//!
//! The `STORAGE_ADAPTER` environment variable moves a named kind to the
//! front of the priority list.
//!
//! # Replication
//!
//! [`SyncManager`] pairs the resolved primary with a remote adapter and
//! keeps both sides converged under the configured conflict policy; see
//! [`sync_setup`] for the remote-first-with-fallback opening pattern.

/// Priority-driven backend resolution.
pub mod resolver;

/// Versioned schema migrations.
pub mod migrate;

/// Composed opening of a sync manager over resolved adapters.
pub mod sync_setup;

pub use migrate::{Migration, MigrationRunner};
pub use resolver::{priority_list, resolve, ResolveOptions};
pub use sync_setup::{open_sync_manager, SyncSetup};

pub use polystore_common::{Result, StorageError};
pub use polystore_core::{
    all_as, batch_or_fallback, get_as, prepare, prepare_or_direct, transaction, AdapterContext,
    AdapterKind, AdapterState, BatchOp, BatchResult, Capabilities, Capability, MobileAdapter,
    MobileConfig, MobilePlugin, Params, PreparedStatement, Row, RowId, RunResult, SqlValue,
    StorageAdapter,
};
pub use polystore_postgres::{PgConfig, PostgresAdapter};
pub use polystore_sqlite::{
    BlobAdapter, BlobConfig, EmbeddedAdapter, EmbeddedConfig, FileSnapshotStore, MemoryAdapter,
    MemorySnapshotStore, SnapshotStore, SqliteAdapter, SqliteConfig,
};
pub use polystore_sync::{
    BackupFormat, BackupManager, BackupOptions, ConflictResolution, ConflictStrategy, DumpDocument,
    MergeFn, ObjectStore, StorageLimitAction, SyncConflict, SyncDirection, SyncHooks, SyncManager,
    SyncMode, SyncPolicy, SyncRecord, SyncResult, TablePriority, TableSync,
};
