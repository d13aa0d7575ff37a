//! Embedded SQLite-family adapters for polystore.
//!
//! Four adapters share one engine layer:
//!
//! - [`SqliteAdapter`] — the native file-backed engine (`sync` execution
//!   behind the async façade, WAL, statement cache, batch).
//! - [`MemoryAdapter`] — the same engine fixed at `:memory:`; the
//!   zero-configuration fallback and test fixture.
//! - [`EmbeddedAdapter`] — a fully in-memory engine whose whole database
//!   serializes to bytes, optionally persisted to a file.
//! - [`BlobAdapter`] — the embedded engine composed with an asynchronous
//!   [`SnapshotStore`], persisting the serialized database as a single
//!   blob with dirty tracking and a periodic saver task.

mod engine;

/// Native file-backed adapter.
pub mod native;

/// In-memory adapter.
pub mod memory;

/// Serializable in-memory adapter.
pub mod embedded;

/// Asynchronous snapshot stores for the blob-persisted adapter.
pub mod store;

/// Blob-persisted adapter.
pub mod blob;

pub use blob::{BlobAdapter, BlobConfig};
pub use embedded::{EmbeddedAdapter, EmbeddedConfig};
pub use memory::MemoryAdapter;
pub use native::{SqliteAdapter, SqliteConfig};
pub use store::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore, SNAPSHOT_KEY};

pub use polystore_common::{Result, StorageError};
