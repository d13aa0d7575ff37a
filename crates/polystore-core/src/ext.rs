//! Generic helpers over the adapter contract.
//!
//! These are the degradation and convenience layers: a closure-style
//! transaction wrapper, serde-typed reads, batch emulation for backends
//! without native batching, and the prepared-statement surface.

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use tracing::warn;

use polystore_common::{Result, StorageError};

use crate::adapter::{BatchOp, BatchResult, StorageAdapter};
use crate::capability::Capability;
use crate::params::Params;
use crate::row::Row;
use crate::value::RunResult;

/// Runs `body` inside a flat transaction on `adapter`.
///
/// The body receives the same adapter reference; while the transaction is
/// pinned, statements route through the transactional executor. On error the
/// transaction is rolled back and the original error re-raised.
pub async fn transaction<'a, A, R, F>(adapter: &'a A, body: F) -> Result<R>
where
    A: StorageAdapter + ?Sized,
    F: FnOnce(&'a A) -> BoxFuture<'a, Result<R>>,
{
    adapter.begin().await?;
    match body(adapter).await {
        Ok(value) => {
            adapter.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = adapter.rollback().await {
                warn!(
                    kind = adapter.kind().as_str(),
                    error = %rollback_err,
                    "rollback failed after transaction error"
                );
            }
            Err(err)
        }
    }
}

/// `get` decoded into a serde type via the JSON bridge.
pub async fn get_as<T, A>(adapter: &A, sql: &str, params: Params) -> Result<Option<T>>
where
    T: DeserializeOwned,
    A: StorageAdapter + ?Sized,
{
    match adapter.get(sql, params).await? {
        Some(row) => {
            let value = serde_json::from_value(row.to_json())
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// `all` decoded into serde types via the JSON bridge.
pub async fn all_as<T, A>(adapter: &A, sql: &str, params: Params) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    A: StorageAdapter + ?Sized,
{
    let rows = adapter.all(sql, params).await?;
    let mut decoded = Vec::with_capacity(rows.len());
    for row in rows {
        decoded.push(
            serde_json::from_value(row.to_json())
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
        );
    }
    Ok(decoded)
}

/// Native batch where available, sequential emulation inside one
/// transaction otherwise.
///
/// Emulation semantics match the native contract: per-operation failures
/// are recorded and execution continues; when the enclosing transaction
/// cannot commit, every operation is reported failed.
pub async fn batch_or_fallback<A>(adapter: &A, ops: Vec<BatchOp>) -> Result<BatchResult>
where
    A: StorageAdapter + ?Sized,
{
    if adapter.capabilities().has(Capability::Batch) {
        return adapter.batch(ops).await;
    }

    let op_count = ops.len();
    adapter.begin().await?;

    let mut result = BatchResult::default();
    for (index, op) in ops.into_iter().enumerate() {
        match adapter.run(&op.sql, op.params).await {
            Ok(run) => result.record_success(run),
            Err(err) => {
                warn!(
                    kind = adapter.kind().as_str(),
                    index,
                    error = %err,
                    "batch operation failed"
                );
                result.record_failure(index, err.to_string());
            }
        }
    }

    match adapter.commit().await {
        Ok(()) => Ok(result),
        Err(commit_err) => {
            if let Err(rollback_err) = adapter.rollback().await {
                warn!(
                    kind = adapter.kind().as_str(),
                    error = %rollback_err,
                    "rollback failed after batch commit error"
                );
            }
            Ok(BatchResult::all_failed(op_count, &commit_err.to_string()))
        }
    }
}

/// A reusable statement handle.
///
/// Execution routes through the owning adapter, which keeps the parsed
/// statement in its internal cache; re-running the same text skips the
/// parse. `finalize` releases the handle.
pub struct PreparedStatement<'a> {
    adapter: &'a dyn StorageAdapter,
    sql: String,
}

impl<'a> std::fmt::Debug for PreparedStatement<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("adapter_kind", &self.adapter.kind())
            .field("sql", &self.sql)
            .finish()
    }
}

impl<'a> PreparedStatement<'a> {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub async fn run(&self, params: Params) -> Result<RunResult> {
        self.adapter.run(&self.sql, params).await
    }

    pub async fn get(&self, params: Params) -> Result<Option<Row>> {
        self.adapter.get(&self.sql, params).await
    }

    pub async fn all(&self, params: Params) -> Result<Vec<Row>> {
        self.adapter.all(&self.sql, params).await
    }

    pub fn finalize(self) {}
}

/// Prepares a statement, failing when the backend lacks the capability.
pub fn prepare<'a, A>(adapter: &'a A, sql: &str) -> Result<PreparedStatement<'a>>
where
    A: StorageAdapter + Sized,
{
    if !adapter.capabilities().has(Capability::Prepared) {
        return Err(StorageError::CapabilityMissing {
            kind: adapter.kind().as_str(),
            capability: Capability::Prepared.as_str(),
        });
    }
    Ok(PreparedStatement {
        adapter,
        sql: sql.to_string(),
    })
}

/// Prepares when the backend is capable, otherwise hands back a direct
/// re-execution handle with identical surface.
pub fn prepare_or_direct<'a, A>(adapter: &'a A, sql: &str) -> PreparedStatement<'a>
where
    A: StorageAdapter + Sized,
{
    PreparedStatement {
        adapter,
        sql: sql.to_string(),
    }
}
