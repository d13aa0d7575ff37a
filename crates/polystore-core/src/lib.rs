//! Backend-agnostic storage contract for polystore.
//!
//! This crate defines everything a backend adapter implements and everything
//! a caller programs against: the scalar value model, parameter bundles,
//! placeholder translation, the capability vocabulary, the adapter lifecycle
//! state machine, and the [`StorageAdapter`] trait itself. Engine crates
//! (`polystore-sqlite`, `polystore-postgres`) implement the contract; the
//! `polystore` facade resolves one at runtime.
//!
//! # Architecture
//!
//! ```text
//! caller code
//!      |
//! StorageAdapter (trait object)        <- this crate
//!      |
//! backend adapter (sqlite / postgres / blob-store / mobile)
//!      |
//! engine / driver / host plugin
//! ```
//!
//! Callers that need optional features either gate on
//! [`Capabilities::has`] or go through the degradation helpers in [`ext`],
//! which emulate the feature with the primitives every backend has.

/// Scalar value model shared by every backend.
pub mod value;

/// Materialized result rows.
pub mod row;

/// Parameter bundles: empty, positional, or named.
pub mod params;

/// Placeholder scanning and `$N` translation for numbered-placeholder drivers.
pub mod placeholder;

/// Top-level script splitting for `exec`.
pub mod script;

/// Closed capability vocabulary and the per-adapter bitmask.
pub mod capability;

/// Adapter lifecycle state machine.
pub mod state;

/// The adapter contract and batch types.
pub mod adapter;

/// Generic helpers over the contract: transactions, typed reads, fallbacks.
pub mod ext;

/// Adapter kind identifiers.
pub mod kind;

/// Host-provided mobile SQL plugin seam and its adapter.
pub mod mobile;

pub use adapter::{AdapterContext, BatchOp, BatchResult, StorageAdapter};
pub use capability::{Capabilities, Capability};
pub use ext::{
    all_as, batch_or_fallback, get_as, prepare, prepare_or_direct, transaction, PreparedStatement,
};
pub use kind::AdapterKind;
pub use mobile::{MobileAdapter, MobileConfig, MobilePlugin};
pub use params::Params;
pub use placeholder::{scan_markers, translate, Marker, Translated};
pub use row::Row;
pub use script::split_script;
pub use state::{AdapterState, LifecycleCell};
pub use value::{RowId, RunResult, SqlValue};

pub use polystore_common::{Result, StorageError};
