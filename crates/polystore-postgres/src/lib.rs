//! Network-relational adapter for polystore.
//!
//! A pooled PostgreSQL backend: portable `?` and `@name` markers are
//! rewritten to `$N`, transactions pin a pooled connection to the handle's
//! executor slot, and scripts split on top-level `;`. Opening retries pool
//! establishment with a doubling backoff and verifies with `SELECT 1`; the
//! adapter never retries statements, and statement-level failures surface
//! to the caller tagged with the adapter kind.

/// Row materialization from driver rows.
mod extract;

/// The adapter.
pub mod adapter;

pub use adapter::{PgConfig, PostgresAdapter};

pub use polystore_common::{Result, StorageError};
