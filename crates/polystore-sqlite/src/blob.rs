//! Blob-persisted adapter.
//!
//! Composes the serializable in-memory engine with an asynchronous
//! [`SnapshotStore`]: the whole database is exported as one blob and written
//! under the store's fixed key. Mutations set a dirty flag; the first
//! mutation in a save window persists write-through, later ones are batched
//! onto a periodic saver task owned by the handle. `close()` stops the task
//! and performs a final persistence when dirty, so the stored blob always
//! reflects every committed write.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use polystore_common::{Result, StorageError};
use polystore_core::state::Ticket;
use polystore_core::{
    AdapterContext, AdapterKind, AdapterState, Capabilities, Capability, LifecycleCell, Params,
    Row, RunResult, StorageAdapter,
};

use crate::engine::{self, Engine};
use crate::store::SnapshotStore;

/// Configuration for the blob-persisted adapter.
#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// Name of the backing key-value database.
    pub db_name: String,
    /// Name of the collection holding the blob.
    pub store_name: String,
    /// Persist automatically on mutation and on the saver timer.
    pub auto_save: bool,
    /// Saver timer period.
    pub save_interval_ms: u64,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            db_name: "polystore".to_string(),
            store_name: "kv".to_string(),
            auto_save: true,
            save_interval_ms: 5_000,
        }
    }
}

const BLOB_CAPS: Capabilities = Capabilities::new(&[
    Capability::Transactions,
    Capability::Persistence,
    Capability::Json,
]);

const BLOB_LIMITATIONS: &[&str] = &[
    "durability lags mutations by up to one save interval",
    "whole database is held in memory",
];

/// State shared between the handle and its saver task.
struct BlobShared {
    engine: Mutex<Option<Engine>>,
    store: Arc<dyn SnapshotStore>,
    dirty: AtomicBool,
    /// Set once a write-through happened in the current save window;
    /// cleared by every timer tick.
    window_written: AtomicBool,
}

impl BlobShared {
    /// Exports the engine and writes the blob when dirty.
    ///
    /// The dirty flag clears only after a successful store write, so a
    /// failed persistence retries on the next tick.
    async fn persist(&self) -> Result<()> {
        if !self.dirty.load(Ordering::SeqCst) {
            return Ok(());
        }
        let bytes = {
            let guard = self.engine.lock().await;
            match guard.as_ref() {
                Some(engine) => engine::export_bytes(&engine.conn)?,
                None => return Ok(()),
            }
        };
        self.store.write(&bytes).await?;
        self.dirty.store(false, Ordering::SeqCst);
        debug!(bytes = bytes.len(), "database blob persisted");
        Ok(())
    }
}

/// Embedded engine persisted as a single blob in an async key-value store.
pub struct BlobAdapter {
    config: BlobConfig,
    lifecycle: LifecycleCell,
    shared: Arc<BlobShared>,
    saver: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl BlobAdapter {
    pub fn new(config: BlobConfig, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            config,
            lifecycle: LifecycleCell::new(AdapterKind::BlobStore.as_str()),
            shared: Arc::new(BlobShared {
                engine: Mutex::new(None),
                store,
                dirty: AtomicBool::new(false),
                window_written: AtomicBool::new(false),
            }),
            saver: parking_lot::Mutex::new(None),
        }
    }

    /// Marks the database dirty after a committed mutation and performs the
    /// write-through persistence for the first mutation of a save window.
    async fn mark_dirty(&self) -> Result<()> {
        self.shared.dirty.store(true, Ordering::SeqCst);
        if self.config.auto_save && !self.shared.window_written.swap(true, Ordering::SeqCst) {
            self.shared.persist().await?;
        }
        Ok(())
    }

    fn spawn_saver(&self) {
        let shared = Arc::clone(&self.shared);
        let period = Duration::from_millis(self.config.save_interval_ms.max(1));
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticks = tokio::time::interval_at(start, period);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                if let Err(err) = shared.persist().await {
                    warn!(error = %err, "periodic persistence failed");
                }
                shared.window_written.store(false, Ordering::SeqCst);
            }
        });
        *self.saver.lock() = Some(handle);
    }

    fn stop_saver(&self) {
        if let Some(handle) = self.saver.lock().take() {
            handle.abort();
        }
    }

    /// Serializes the whole open database.
    pub async fn export_database(&self) -> Result<Vec<u8>> {
        self.lifecycle.ensure_open()?;
        let guard = self.shared.engine.lock().await;
        let engine = guard.as_ref().ok_or(StorageError::NotOpen {
            kind: AdapterKind::BlobStore.as_str(),
        })?;
        engine::export_bytes(&engine.conn)
    }

    /// Replaces the engine with one restored from `bytes`, marks dirty, and
    /// persists immediately.
    pub async fn import_database(&self, bytes: &[u8]) -> Result<()> {
        self.lifecycle.ensure_open()?;
        let conn = engine::import_bytes(bytes)?;
        {
            let mut guard = self.shared.engine.lock().await;
            *guard = Some(Engine::new(conn));
        }
        self.shared.dirty.store(true, Ordering::SeqCst);
        self.shared.persist().await
    }

    async fn with_engine<R>(&self, op: impl FnOnce(&mut Engine) -> Result<R>) -> Result<R> {
        self.lifecycle.ensure_open()?;
        let mut guard = self.shared.engine.lock().await;
        let engine = guard.as_mut().ok_or(StorageError::NotOpen {
            kind: AdapterKind::BlobStore.as_str(),
        })?;
        op(engine)
    }
}

#[async_trait]
impl StorageAdapter for BlobAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::BlobStore
    }

    fn capabilities(&self) -> Capabilities {
        BLOB_CAPS
    }

    fn state(&self) -> AdapterState {
        self.lifecycle.state()
    }

    fn context(&self) -> AdapterContext {
        AdapterContext::new(
            AdapterKind::BlobStore,
            BLOB_CAPS,
            self.shared.store.descriptor(),
            BLOB_LIMITATIONS,
        )
    }

    async fn open(&self) -> Result<()> {
        if self.lifecycle.begin_open()? == Ticket::AlreadyThere {
            return Ok(());
        }

        let opened = async {
            self.shared.store.open().await?;
            let conn = match self.shared.store.read().await? {
                Some(bytes) => engine::import_bytes(&bytes)?,
                None => engine::open_connection(":memory:", false)?,
            };
            Ok::<_, StorageError>(conn)
        }
        .await;

        let conn = match opened {
            Ok(conn) => conn,
            Err(err) => {
                self.lifecycle.fail();
                return Err(StorageError::open_failed(
                    AdapterKind::BlobStore.as_str(),
                    err,
                ));
            }
        };

        *self.shared.engine.lock().await = Some(Engine::new(conn));
        self.shared.dirty.store(false, Ordering::SeqCst);
        self.shared.window_written.store(false, Ordering::SeqCst);

        if self.config.auto_save {
            self.spawn_saver();
        }

        self.lifecycle.finish_open();
        info!(
            db = %self.config.db_name,
            store = %self.config.store_name,
            auto_save = self.config.auto_save,
            "blob adapter open"
        );
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.lifecycle.begin_close()? == Ticket::AlreadyThere {
            return Ok(());
        }

        self.stop_saver();

        // Final persistence: after close the blob holds every committed
        // write and the dirty flag is clear.
        if let Err(err) = self.shared.persist().await {
            self.lifecycle.fail();
            return Err(err);
        }

        self.shared.engine.lock().await.take();
        let result = self.shared.store.close().await;
        self.lifecycle.finish_close();
        info!(db = %self.config.db_name, "blob adapter closed");
        result
    }

    async fn run(&self, sql: &str, params: Params) -> Result<RunResult> {
        let (result, in_tx) = self
            .with_engine(|engine| {
                let result = engine::run_statement(&engine.conn, sql, &params)?;
                Ok((result, engine.in_tx))
            })
            .await?;
        if !in_tx {
            self.mark_dirty().await?;
        }
        Ok(result)
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
        let in_tx = self
            .with_engine(|engine| {
                engine::exec_script(&engine.conn, script)?;
                Ok(engine.in_tx)
            })
            .await?;
        if !in_tx {
            self.mark_dirty().await?;
        }
        Ok(())
    }

    async fn begin(&self) -> Result<()> {
        self.with_engine(|engine| {
            if engine.in_tx {
                return Err(StorageError::backend(
                    "blob-store",
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
                return Err(StorageError::backend("blob-store", "no transaction is pinned"));
            }
            engine.conn.execute_batch("COMMIT")?;
            engine.in_tx = false;
            Ok(())
        })
        .await?;
        self.mark_dirty().await
    }

    async fn rollback(&self) -> Result<()> {
        self.with_engine(|engine| {
            if !engine.in_tx {
                return Err(StorageError::backend("blob-store", "no transaction is pinned"));
            }
            engine.conn.execute_batch("ROLLBACK")?;
            engine.in_tx = false;
            Ok(())
        })
        .await
    }
}

impl Drop for BlobAdapter {
    fn drop(&mut self) {
        // The saver task must not outlive the handle.
        self.stop_saver();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySnapshotStore;
    use polystore_core::SqlValue;

    fn fresh(db_name: &str) -> BlobAdapter {
        let config = BlobConfig {
            db_name: db_name.to_string(),
            // Long interval keeps timing out of the tests; write-through and
            // close-time persistence carry the durability.
            save_interval_ms: 3_600_000,
            ..Default::default()
        };
        let store = Arc::new(MemorySnapshotStore::new(
            config.db_name.clone(),
            config.store_name.clone(),
        ));
        BlobAdapter::new(config, store)
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let adapter = fresh("round-trip");
        adapter.open().await.unwrap();
        adapter
            .exec("CREATE TABLE t(k TEXT PRIMARY KEY, v INTEGER)")
            .await
            .unwrap();
        for i in 0..100 {
            adapter
                .run(
                    "INSERT INTO t VALUES (?, ?)",
                    Params::positional(vec![
                        SqlValue::Text(format!("k{i}")),
                        SqlValue::Integer(i),
                    ]),
                )
                .await
                .unwrap();
        }
        adapter.close().await.unwrap();
        assert!(!adapter.shared.dirty.load(Ordering::SeqCst));

        let reopened = fresh("round-trip");
        reopened.open().await.unwrap();
        let row = reopened
            .get("SELECT count(*) AS n FROM t", Params::none())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.integer("n"), Some(100));
        reopened.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_through_on_first_mutation() {
        let adapter = fresh("write-through");
        let store = Arc::clone(&adapter.shared.store);
        adapter.open().await.unwrap();
        assert_eq!(store.read().await.unwrap(), None);

        adapter.exec("CREATE TABLE t(v INTEGER)").await.unwrap();
        // First mutation of the window persisted immediately.
        assert!(store.read().await.unwrap().is_some());
        assert!(!adapter.shared.dirty.load(Ordering::SeqCst));

        // Second mutation within the window is batched: dirty stays set.
        adapter
            .run("INSERT INTO t VALUES (1)", Params::none())
            .await
            .unwrap();
        assert!(adapter.shared.dirty.load(Ordering::SeqCst));

        adapter.close().await.unwrap();
        assert!(!adapter.shared.dirty.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_transaction_marks_dirty_at_commit() {
        let adapter = fresh("tx-dirty");
        adapter.open().await.unwrap();
        adapter.exec("CREATE TABLE t(v INTEGER)").await.unwrap();
        adapter.close().await.unwrap();

        let adapter = fresh("tx-dirty");
        adapter.open().await.unwrap();
        adapter.begin().await.unwrap();
        adapter
            .run("INSERT INTO t VALUES (1)", Params::none())
            .await
            .unwrap();
        // Mutations inside the pinned transaction do not persist yet.
        assert!(!adapter.shared.dirty.load(Ordering::SeqCst));
        adapter.commit().await.unwrap();
        adapter.close().await.unwrap();

        let observer = fresh("tx-dirty");
        observer.open().await.unwrap();
        let row = observer
            .get("SELECT count(*) AS n FROM t", Params::none())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.integer("n"), Some(1));
    }

    #[tokio::test]
    async fn test_rollback_leaves_blob_untouched() {
        let adapter = fresh("rollback");
        adapter.open().await.unwrap();
        adapter.exec("CREATE TABLE t(v INTEGER)").await.unwrap();

        adapter.begin().await.unwrap();
        adapter
            .run("INSERT INTO t VALUES (1)", Params::none())
            .await
            .unwrap();
        adapter.rollback().await.unwrap();
        adapter.close().await.unwrap();

        let observer = fresh("rollback");
        observer.open().await.unwrap();
        let row = observer
            .get("SELECT count(*) AS n FROM t", Params::none())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.integer("n"), Some(0));
    }

    #[tokio::test]
    async fn test_export_import_same_handle() {
        let adapter = fresh("export-import");
        adapter.open().await.unwrap();
        adapter
            .exec("CREATE TABLE t(v INTEGER); INSERT INTO t VALUES (42)")
            .await
            .unwrap();

        let bytes = adapter.export_database().await.unwrap();

        adapter
            .run("INSERT INTO t VALUES (43)", Params::none())
            .await
            .unwrap();

        // Import rewinds the engine to the exported snapshot.
        adapter.import_database(&bytes).await.unwrap();
        let row = adapter
            .get("SELECT count(*) AS n FROM t", Params::none())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.integer("n"), Some(1));
        adapter.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_double_close_is_noop() {
        let adapter = fresh("double-close");
        adapter.open().await.unwrap();
        adapter.close().await.unwrap();
        adapter.close().await.unwrap();
        assert_eq!(adapter.state(), AdapterState::Closed);
    }
}
