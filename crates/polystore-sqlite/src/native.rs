//! Native file-backed adapter.
//!
//! The engine executes synchronously on the caller's thread; the async
//! contract is a façade for uniformity with the other backends. A single
//! connection is guarded by an async mutex, which also enforces the
//! one-outstanding-operation rule per handle.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use polystore_common::{Result, StorageError};
use polystore_core::{
    AdapterContext, AdapterKind, AdapterState, BatchOp, BatchResult, Capabilities, Capability,
    LifecycleCell, Params, Row, RunResult, StorageAdapter,
};
use polystore_core::state::Ticket;

use crate::engine::{self, Engine};

/// Configuration for the native adapter.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file. Accepts `:memory:` and `file:` URIs verbatim.
    pub path: String,
    /// Open read-only.
    pub read_only: bool,
    /// Switch the journal to WAL after open, best-effort.
    pub wal: bool,
    /// Prepared statements kept in the per-connection cache.
    pub cache_capacity: usize,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "polystore.db".to_string(),
            read_only: false,
            wal: true,
            cache_capacity: 100,
        }
    }
}

impl SqliteConfig {
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

const SQLITE_CAPS: Capabilities = Capabilities::new(&[
    Capability::Sync,
    Capability::Transactions,
    Capability::Wal,
    Capability::Locks,
    Capability::Persistence,
    Capability::Prepared,
    Capability::Batch,
]);

const SQLITE_LIMITATIONS: &[&str] = &[
    "single writer per database file",
    "one outstanding operation per handle",
];

/// Native embedded adapter over a database file.
pub struct SqliteAdapter {
    config: SqliteConfig,
    kind: AdapterKind,
    capabilities: Capabilities,
    limitations: &'static [&'static str],
    lifecycle: LifecycleCell,
    engine: Mutex<Option<Engine>>,
}

impl SqliteAdapter {
    pub fn new(config: SqliteConfig) -> Self {
        Self {
            config,
            kind: AdapterKind::Sqlite,
            capabilities: SQLITE_CAPS,
            limitations: SQLITE_LIMITATIONS,
            lifecycle: LifecycleCell::new(AdapterKind::Sqlite.as_str()),
            engine: Mutex::new(None),
        }
    }

    /// Internal constructor used by the in-memory variant.
    pub(crate) fn with_kind(
        config: SqliteConfig,
        kind: AdapterKind,
        capabilities: Capabilities,
        limitations: &'static [&'static str],
    ) -> Self {
        Self {
            config,
            kind,
            capabilities,
            limitations,
            lifecycle: LifecycleCell::new(kind.as_str()),
            engine: Mutex::new(None),
        }
    }

    fn is_memory(&self) -> bool {
        self.config.path == ":memory:"
    }

    async fn with_engine<R>(
        &self,
        op: impl FnOnce(&mut Engine) -> Result<R>,
    ) -> Result<R> {
        self.lifecycle.ensure_open()?;
        let mut guard = self.engine.lock().await;
        let engine = guard
            .as_mut()
            .ok_or(StorageError::NotOpen { kind: self.kind.as_str() })?;
        op(engine)
    }
}

#[async_trait]
impl StorageAdapter for SqliteAdapter {
    fn kind(&self) -> AdapterKind {
        self.kind
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn state(&self) -> AdapterState {
        self.lifecycle.state()
    }

    fn context(&self) -> AdapterContext {
        AdapterContext::new(
            self.kind,
            self.capabilities,
            self.config.path.clone(),
            self.limitations,
        )
    }

    async fn open(&self) -> Result<()> {
        if self.lifecycle.begin_open()? == Ticket::AlreadyThere {
            return Ok(());
        }

        let conn = match engine::open_connection(&self.config.path, self.config.read_only) {
            Ok(conn) => conn,
            Err(err) => {
                self.lifecycle.fail();
                return Err(StorageError::open_failed(self.kind.as_str(), err));
            }
        };

        conn.set_prepared_statement_cache_capacity(self.config.cache_capacity);

        if self.config.wal && !self.is_memory() && !self.config.read_only {
            // journal_mode returns a result row; read and discard it.
            if let Err(err) =
                conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
            {
                warn!(path = %self.config.path, error = %err, "WAL pragma rejected");
            }
        }

        *self.engine.lock().await = Some(Engine::new(conn));
        self.lifecycle.finish_open();
        info!(kind = self.kind.as_str(), path = %self.config.path, "adapter open");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.lifecycle.begin_close()? == Ticket::AlreadyThere {
            return Ok(());
        }
        let engine = self.engine.lock().await.take();
        if let Some(engine) = engine {
            if engine.in_tx {
                warn!(kind = self.kind.as_str(), "closing with a pinned transaction; rolling back");
                let _ = engine.conn.execute_batch("ROLLBACK");
            }
            drop(engine);
        }
        self.lifecycle.finish_close();
        info!(kind = self.kind.as_str(), "adapter closed");
        Ok(())
    }

    async fn run(&self, sql: &str, params: Params) -> Result<RunResult> {
        self.with_engine(|engine| {
            let result = engine::run_statement(&engine.conn, sql, &params)?;
            debug!(changes = result.changes, "statement executed");
            Ok(result)
        })
        .await
    }

    async fn get(&self, sql: &str, params: Params) -> Result<Option<Row>> {
        self.with_engine(|engine| {
            let mut rows = engine::query_statement(&engine.conn, sql, &params)?;
            Ok(if rows.is_empty() {
                None
            } else {
                Some(rows.swap_remove(0))
            })
        })
        .await
    }

    async fn all(&self, sql: &str, params: Params) -> Result<Vec<Row>> {
        self.with_engine(|engine| engine::query_statement(&engine.conn, sql, &params))
            .await
    }

    async fn exec(&self, script: &str) -> Result<()> {
        self.with_engine(|engine| engine::exec_script(&engine.conn, script))
            .await
    }

    async fn begin(&self) -> Result<()> {
        self.with_engine(|engine| {
            if engine.in_tx {
                return Err(StorageError::backend(
                    "sqlite",
                    "nested transactions are not supported",
                ));
            }
            engine.conn.execute_batch("BEGIN")?;
            engine.in_tx = true;
            Ok(())
        })
        .await
    }

    async fn commit(&self) -> Result<()> {
        self.with_engine(|engine| {
            if !engine.in_tx {
                return Err(StorageError::backend("sqlite", "no transaction is pinned"));
            }
            engine.conn.execute_batch("COMMIT")?;
            engine.in_tx = false;
            Ok(())
        })
        .await
    }

    async fn rollback(&self) -> Result<()> {
        self.with_engine(|engine| {
            if !engine.in_tx {
                return Err(StorageError::backend("sqlite", "no transaction is pinned"));
            }
            engine.conn.execute_batch("ROLLBACK")?;
            engine.in_tx = false;
            Ok(())
        })
        .await
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> Result<BatchResult> {
        let op_count = ops.len();
        self.with_engine(|engine| {
            engine.conn.execute_batch("BEGIN")?;

            let mut result = BatchResult::default();
            for (index, op) in ops.iter().enumerate() {
                match engine::run_statement(&engine.conn, &op.sql, &op.params) {
                    Ok(run) => result.record_success(run),
                    Err(err) => {
                        warn!(index, error = %err, "batch operation failed");
                        result.record_failure(index, err.to_string());
                    }
                }
            }

            match engine.conn.execute_batch("COMMIT") {
                Ok(()) => Ok(result),
                Err(commit_err) => {
                    let _ = engine.conn.execute_batch("ROLLBACK");
                    Ok(BatchResult::all_failed(op_count, &commit_err.to_string()))
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polystore_core::SqlValue;

    async fn open_memory() -> SqliteAdapter {
        let adapter = SqliteAdapter::new(SqliteConfig {
            path: ":memory:".to_string(),
            wal: false,
            ..Default::default()
        });
        adapter.open().await.unwrap();
        adapter
            .exec("CREATE TABLE t(k TEXT PRIMARY KEY, v INTEGER)")
            .await
            .unwrap();
        adapter
    }

    #[tokio::test]
    async fn test_mutation_then_read() {
        let adapter = open_memory().await;

        let result = adapter
            .run(
                "INSERT INTO t VALUES (?, ?)",
                Params::positional(vec![SqlValue::Text("a".to_string()), SqlValue::Integer(1)]),
            )
            .await
            .unwrap();
        assert_eq!(result.changes, 1);
        assert_eq!(result.last_insert_row_id.unwrap().as_i64(), Some(1));

        let row = adapter
            .get("SELECT v FROM t WHERE k=?", Params::single("a"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.integer("v"), Some(1));
    }

    #[tokio::test]
    async fn test_not_open_errors() {
        let adapter = SqliteAdapter::new(SqliteConfig::at(":memory:"));
        let err = adapter.run("SELECT 1", Params::none()).await.unwrap_err();
        assert!(matches!(err, StorageError::NotOpen { .. }));
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let adapter = open_memory().await;
        adapter.open().await.unwrap();
        assert_eq!(adapter.state(), AdapterState::Open);
    }

    #[tokio::test]
    async fn test_double_close_is_noop() {
        let adapter = open_memory().await;
        adapter.close().await.unwrap();
        adapter.close().await.unwrap();
        assert_eq!(adapter.state(), AdapterState::Closed);
    }

    #[tokio::test]
    async fn test_transaction_commit_and_rollback() {
        let adapter = open_memory().await;

        adapter.begin().await.unwrap();
        adapter
            .run("INSERT INTO t VALUES ('a', 1)", Params::none())
            .await
            .unwrap();
        adapter.commit().await.unwrap();

        adapter.begin().await.unwrap();
        adapter
            .run("INSERT INTO t VALUES ('b', 2)", Params::none())
            .await
            .unwrap();
        adapter.rollback().await.unwrap();

        let row = adapter
            .get("SELECT count(*) AS n FROM t", Params::none())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.integer("n"), Some(1));
    }

    #[tokio::test]
    async fn test_nested_begin_rejected() {
        let adapter = open_memory().await;
        adapter.begin().await.unwrap();
        assert!(adapter.begin().await.is_err());
        adapter.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_batch_reports_per_op_outcomes() {
        let adapter = open_memory().await;

        let result = adapter
            .batch(vec![
                BatchOp::new("INSERT INTO t VALUES ('a', 1)", ()),
                BatchOp::new("INSERT INTO t VALUES ('a', 2)", ()), // duplicate key
                BatchOp::new("INSERT INTO t VALUES ('b', 3)", ()),
            ])
            .await
            .unwrap();

        assert_eq!(result.successful, 2);
        assert_eq!(result.failed, 1);
        assert_eq!(result.errors[0].0, 1);

        let row = adapter
            .get("SELECT count(*) AS n FROM t", Params::none())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.integer("n"), Some(2));
    }

    #[tokio::test]
    async fn test_file_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db").to_str().unwrap().to_string();

        let adapter = SqliteAdapter::new(SqliteConfig::at(path.clone()));
        adapter.open().await.unwrap();
        adapter
            .exec("CREATE TABLE t(v INTEGER); INSERT INTO t VALUES (5)")
            .await
            .unwrap();
        adapter.close().await.unwrap();

        let reopened = SqliteAdapter::new(SqliteConfig::at(path));
        reopened.open().await.unwrap();
        let row = reopened
            .get("SELECT v FROM t", Params::none())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.integer("v"), Some(5));
    }
}
