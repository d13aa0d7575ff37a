//! The adapter contract.
//!
//! [`StorageAdapter`] is the polymorphic operation surface every backend
//! implements. It is object-safe: the resolver hands out
//! `Box<dyn StorageAdapter>` and the sync manager coordinates two
//! `Arc<dyn StorageAdapter>` instances without knowing their kinds.
//!
//! Transactions are flat and pinned to the handle: `begin` routes subsequent
//! statements through the handle's transactional executor until `commit` or
//! `rollback`. The ergonomic closure wrapper lives in [`crate::ext`].

use async_trait::async_trait;

use polystore_common::{Result, StorageError};

use crate::capability::{Capabilities, Capability};
use crate::kind::AdapterKind;
use crate::params::Params;
use crate::row::Row;
use crate::state::AdapterState;
use crate::value::RunResult;

/// Immutable descriptor attached to an adapter handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterContext {
    pub kind: AdapterKind,
    pub capabilities: Capabilities,
    /// Human-readable connection descriptor: a file path, a redacted
    /// connection string, or a store name.
    pub descriptor: String,
    /// Declared, permanent limitations of the backend.
    pub limitations: &'static [&'static str],
}

impl AdapterContext {
    pub fn new(
        kind: AdapterKind,
        capabilities: Capabilities,
        descriptor: impl Into<String>,
        limitations: &'static [&'static str],
    ) -> Self {
        Self {
            kind,
            capabilities,
            descriptor: descriptor.into(),
            limitations,
        }
    }

    /// The on-disk location, when the descriptor names a file.
    pub fn file_path(&self) -> Option<&str> {
        let path = self.descriptor.as_str();
        if path.is_empty() || path == ":memory:" || path.contains("://") {
            None
        } else {
            Some(path)
        }
    }
}

/// One operation of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOp {
    pub sql: String,
    pub params: Params,
}

impl BatchOp {
    pub fn new(sql: impl Into<String>, params: impl Into<Params>) -> Self {
        Self {
            sql: sql.into(),
            params: params.into(),
        }
    }
}

/// Per-operation outcome of a batch execution.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub successful: usize,
    pub failed: usize,
    /// One entry per submitted operation; `None` where the operation failed.
    pub results: Vec<Option<RunResult>>,
    /// `(operation index, cause)` for every failed operation.
    pub errors: Vec<(usize, String)>,
}

impl BatchResult {
    /// Marks every operation failed with the same cause. Used when the
    /// enclosing transaction could not commit.
    pub fn all_failed(op_count: usize, cause: &str) -> Self {
        Self {
            successful: 0,
            failed: op_count,
            results: vec![None; op_count],
            errors: (0..op_count).map(|i| (i, cause.to_string())).collect(),
        }
    }

    pub fn record_success(&mut self, result: RunResult) {
        self.successful += 1;
        self.results.push(Some(result));
    }

    pub fn record_failure(&mut self, index: usize, cause: String) {
        self.failed += 1;
        self.results.push(None);
        self.errors.push((index, cause));
    }
}

/// The polymorphic storage contract.
///
/// Every method other than `open` requires the handle to be in the `Open`
/// state and fails with [`StorageError::NotOpen`] otherwise. Within one
/// handle, operations complete in submission order; callers wanting
/// overlapping operations must use multiple handles.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Stable identifier of the adapter variant.
    fn kind(&self) -> AdapterKind;

    /// Capabilities fixed at compile time for this variant.
    fn capabilities(&self) -> Capabilities;

    /// Current lifecycle state.
    fn state(&self) -> AdapterState;

    /// Immutable snapshot of kind, capabilities, descriptor, limitations.
    fn context(&self) -> AdapterContext;

    /// Establishes the backend connection. Idempotent when already open;
    /// concurrent opens fail fast.
    async fn open(&self) -> Result<()>;

    /// Flushes pending persistence and releases resources. Idempotent when
    /// already closed.
    async fn close(&self) -> Result<()>;

    /// Executes a single mutating statement.
    async fn run(&self, sql: &str, params: Params) -> Result<RunResult>;

    /// Returns the first result row, or `None`.
    async fn get(&self, sql: &str, params: Params) -> Result<Option<Row>>;

    /// Returns every result row.
    async fn all(&self, sql: &str, params: Params) -> Result<Vec<Row>>;

    /// Executes a multi-statement script with no result sets.
    async fn exec(&self, script: &str) -> Result<()>;

    /// Starts a flat transaction pinned to this handle. Fails while another
    /// transaction is pinned.
    async fn begin(&self) -> Result<()>;

    /// Commits the pinned transaction.
    async fn commit(&self) -> Result<()>;

    /// Rolls back the pinned transaction.
    async fn rollback(&self) -> Result<()>;

    /// Executes the operations within one implicit transaction.
    ///
    /// Backends without the `batch` capability keep this default body;
    /// callers wanting emulation use
    /// [`batch_or_fallback`](crate::ext::batch_or_fallback).
    async fn batch(&self, ops: Vec<BatchOp>) -> Result<BatchResult> {
        let _ = ops;
        Err(StorageError::CapabilityMissing {
            kind: self.kind().as_str(),
            capability: Capability::Batch.as_str(),
        })
    }
}

impl std::fmt::Debug for dyn StorageAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAdapter")
            .field("kind", &self.kind())
            .field("state", &self.state())
            .finish()
    }
}
