//! Serializable in-memory adapter.
//!
//! The whole database lives in memory with the same SQL semantics as the
//! native engine, and serializes to a byte snapshot on demand. When a file
//! path is configured, the snapshot seeds the engine on open and every
//! mutation writes the exported bytes back to the file, so the adapter
//! additionally advertises persistence.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use polystore_common::{Result, StorageError};
use polystore_core::state::Ticket;
use polystore_core::{
    AdapterContext, AdapterKind, AdapterState, Capabilities, Capability, LifecycleCell, Params,
    Row, RunResult, StorageAdapter,
};

use crate::engine::{self, Engine};

/// Configuration for the serializable in-memory adapter.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedConfig {
    /// Snapshot file. When set, the engine loads from it on open and
    /// writes back after every mutation and before close.
    pub path: Option<String>,
}

impl EmbeddedConfig {
    pub fn persisted_at(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }
}

const EMBEDDED_CAPS: Capabilities = Capabilities::new(&[
    Capability::Transactions,
    Capability::Json,
    Capability::Prepared,
]);

const EMBEDDED_LIMITATIONS: &[&str] = &[
    "single-task execution, no synchronous surface",
    "whole database is held in memory",
];

/// Fully in-memory engine with optional file persistence.
pub struct EmbeddedAdapter {
    config: EmbeddedConfig,
    lifecycle: LifecycleCell,
    engine: Mutex<Option<Engine>>,
}

impl EmbeddedAdapter {
    pub fn new(config: EmbeddedConfig) -> Self {
        Self {
            config,
            lifecycle: LifecycleCell::new(AdapterKind::Embedded.as_str()),
            engine: Mutex::new(None),
        }
    }

    fn persist(&self, engine: &Engine) -> Result<()> {
        if let Some(path) = &self.config.path {
            engine::save_memory_to_file(&engine.conn, path)?;
            debug!(path = %path, "snapshot written");
        }
        Ok(())
    }

    async fn with_engine<R>(&self, op: impl FnOnce(&mut Engine) -> Result<R>) -> Result<R> {
        self.lifecycle.ensure_open()?;
        let mut guard = self.engine.lock().await;
        let engine = guard.as_mut().ok_or(StorageError::NotOpen {
            kind: AdapterKind::Embedded.as_str(),
        })?;
        op(engine)
    }
}

#[async_trait]
impl StorageAdapter for EmbeddedAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Embedded
    }

    fn capabilities(&self) -> Capabilities {
        if self.config.path.is_some() {
            EMBEDDED_CAPS.with(Capability::Persistence)
        } else {
            EMBEDDED_CAPS
        }
    }

    fn state(&self) -> AdapterState {
        self.lifecycle.state()
    }

    fn context(&self) -> AdapterContext {
        AdapterContext::new(
            AdapterKind::Embedded,
            self.capabilities(),
            self.config.path.clone().unwrap_or_else(|| ":memory:".to_string()),
            EMBEDDED_LIMITATIONS,
        )
    }

    async fn open(&self) -> Result<()> {
        if self.lifecycle.begin_open()? == Ticket::AlreadyThere {
            return Ok(());
        }

        let conn = match &self.config.path {
            Some(path) if std::path::Path::new(path).exists() => {
                engine::load_file_into_memory(path)
            }
            _ => engine::open_connection(":memory:", false),
        };
        let conn = match conn {
            Ok(conn) => conn,
            Err(err) => {
                self.lifecycle.fail();
                return Err(StorageError::open_failed(
                    AdapterKind::Embedded.as_str(),
                    err,
                ));
            }
        };

        *self.engine.lock().await = Some(Engine::new(conn));
        self.lifecycle.finish_open();
        info!(persisted = self.config.path.is_some(), "embedded adapter open");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.lifecycle.begin_close()? == Ticket::AlreadyThere {
            return Ok(());
        }
        let engine = self.engine.lock().await.take();
        if let Some(engine) = engine {
            if engine.in_tx {
                let _ = engine.conn.execute_batch("ROLLBACK");
            }
            if let Err(err) = self.persist(&engine) {
                self.lifecycle.fail();
                return Err(err);
            }
        }
        self.lifecycle.finish_close();
        Ok(())
    }

    async fn run(&self, sql: &str, params: Params) -> Result<RunResult> {
        self.with_engine(|engine| {
            let result = engine::run_statement(&engine.conn, sql, &params)?;
            // Inside a pinned transaction the snapshot is written at commit.
            if !engine.in_tx {
                self.persist(engine)?;
            }
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
        self.with_engine(|engine| {
            engine::exec_script(&engine.conn, script)?;
            if !engine.in_tx {
                self.persist(engine)?;
            }
            Ok(())
        })
        .await
    }

    async fn begin(&self) -> Result<()> {
        self.with_engine(|engine| {
            if engine.in_tx {
                return Err(StorageError::backend(
                    "embedded",
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
                return Err(StorageError::backend("embedded", "no transaction is pinned"));
            }
            engine.conn.execute_batch("COMMIT")?;
            engine.in_tx = false;
            self.persist(engine)
        })
        .await
    }

    async fn rollback(&self) -> Result<()> {
        self.with_engine(|engine| {
            if !engine.in_tx {
                return Err(StorageError::backend("embedded", "no transaction is pinned"));
            }
            engine.conn.execute_batch("ROLLBACK")?;
            engine.in_tx = false;
            Ok(())
        })
        .await
    }
}
