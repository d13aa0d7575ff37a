//! Host-provided mobile SQL plugin seam.
//!
//! On mobile hosts the SQL engine lives behind a native bridge owned by the
//! embedding application. The host implements [`MobilePlugin`]; the adapter
//! here is a thin forwarding layer that adds the storage contract's
//! lifecycle, transaction pinning, and capability declarations on top.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use polystore_common::{Result, StorageError};

use crate::adapter::{AdapterContext, StorageAdapter};
use crate::capability::{Capabilities, Capability};
use crate::kind::AdapterKind;
use crate::params::Params;
use crate::row::Row;
use crate::script::split_script;
use crate::state::{AdapterState, LifecycleCell, Ticket};
use crate::value::{RowId, RunResult, SqlValue};

/// Native SQL bridge provided by the embedding application.
#[async_trait]
pub trait MobilePlugin: Send + Sync {
    /// Opens (or creates) the named database.
    async fn open(&self, database: &str) -> Result<()>;

    /// Executes a mutating statement with positional values.
    /// Returns rows affected and the last insert rowid, if any.
    async fn execute(
        &self,
        database: &str,
        sql: &str,
        values: &[SqlValue],
    ) -> Result<(u64, Option<i64>)>;

    /// Executes a query with positional values.
    async fn query(&self, database: &str, sql: &str, values: &[SqlValue]) -> Result<Vec<Row>>;

    /// Closes the named database.
    async fn close(&self, database: &str) -> Result<()>;
}

/// Configuration for the mobile adapter.
#[derive(Clone)]
pub struct MobileConfig {
    /// Database name passed to the plugin.
    pub database: String,
    /// Issue `PRAGMA journal_mode = WAL` after open, best-effort.
    pub wal: bool,
    /// The host bridge.
    pub plugin: Arc<dyn MobilePlugin>,
}

impl std::fmt::Debug for MobileConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MobileConfig")
            .field("database", &self.database)
            .field("wal", &self.wal)
            .finish_non_exhaustive()
    }
}

impl MobileConfig {
    pub fn new(database: impl Into<String>, plugin: Arc<dyn MobilePlugin>) -> Self {
        Self {
            database: database.into(),
            wal: true,
            plugin,
        }
    }
}

const MOBILE_CAPS: Capabilities = Capabilities::new(&[
    Capability::Transactions,
    Capability::Wal,
    Capability::Locks,
    Capability::Persistence,
]);

const MOBILE_LIMITATIONS: &[&str] = &[
    "named parameters are not supported by the native bridge",
    "one outstanding operation per handle",
];

/// Thin adapter over a host-provided native SQL plugin.
pub struct MobileAdapter {
    config: MobileConfig,
    lifecycle: LifecycleCell,
    /// Serializes operations and tracks the pinned transaction.
    in_tx: Mutex<bool>,
}

impl MobileAdapter {
    pub fn new(config: MobileConfig) -> Self {
        Self {
            config,
            lifecycle: LifecycleCell::new(AdapterKind::Mobile.as_str()),
            in_tx: Mutex::new(false),
        }
    }

    fn positional_values(&self, params: &Params) -> Result<Vec<SqlValue>> {
        match params {
            Params::Empty => Ok(Vec::new()),
            Params::Positional(values) => Ok(values.clone()),
            Params::Named(_) => Err(StorageError::Bind {
                marker: "@named".to_string(),
            }),
        }
    }
}

#[async_trait]
impl StorageAdapter for MobileAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Mobile
    }

    fn capabilities(&self) -> Capabilities {
        MOBILE_CAPS
    }

    fn state(&self) -> AdapterState {
        self.lifecycle.state()
    }

    fn context(&self) -> AdapterContext {
        AdapterContext::new(
            AdapterKind::Mobile,
            MOBILE_CAPS,
            self.config.database.clone(),
            MOBILE_LIMITATIONS,
        )
    }

    async fn open(&self) -> Result<()> {
        if self.lifecycle.begin_open()? == Ticket::AlreadyThere {
            return Ok(());
        }

        match self.config.plugin.open(&self.config.database).await {
            Ok(()) => {}
            Err(err) => {
                self.lifecycle.fail();
                return Err(StorageError::open_failed(
                    AdapterKind::Mobile.as_str(),
                    err,
                ));
            }
        }

        if self.config.wal {
            // Best-effort: some plugin builds reject pragmas.
            if let Err(err) = self
                .config
                .plugin
                .execute(&self.config.database, "PRAGMA journal_mode = WAL", &[])
                .await
            {
                warn!(database = %self.config.database, error = %err, "WAL pragma rejected");
            }
        }

        self.lifecycle.finish_open();
        info!(database = %self.config.database, "mobile adapter open");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.lifecycle.begin_close()? == Ticket::AlreadyThere {
            return Ok(());
        }
        let result = self.config.plugin.close(&self.config.database).await;
        self.lifecycle.finish_close();
        result
    }

    async fn run(&self, sql: &str, params: Params) -> Result<RunResult> {
        self.lifecycle.ensure_open()?;
        let values = self.positional_values(&params)?;
        let _guard = self.in_tx.lock().await;
        let (changes, last_id) = self
            .config
            .plugin
            .execute(&self.config.database, sql, &values)
            .await?;
        debug!(database = %self.config.database, changes, "statement executed");
        Ok(RunResult::new(changes, last_id.map(RowId::Int)))
    }

    async fn get(&self, sql: &str, params: Params) -> Result<Option<Row>> {
        self.lifecycle.ensure_open()?;
        let values = self.positional_values(&params)?;
        let _guard = self.in_tx.lock().await;
        let mut rows = self
            .config
            .plugin
            .query(&self.config.database, sql, &values)
            .await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    async fn all(&self, sql: &str, params: Params) -> Result<Vec<Row>> {
        self.lifecycle.ensure_open()?;
        let values = self.positional_values(&params)?;
        let _guard = self.in_tx.lock().await;
        self.config
            .plugin
            .query(&self.config.database, sql, &values)
            .await
    }

    async fn exec(&self, script: &str) -> Result<()> {
        self.lifecycle.ensure_open()?;
        let _guard = self.in_tx.lock().await;
        for statement in split_script(script) {
            self.config
                .plugin
                .execute(&self.config.database, &statement, &[])
                .await?;
        }
        Ok(())
    }

    async fn begin(&self) -> Result<()> {
        self.lifecycle.ensure_open()?;
        let mut in_tx = self.in_tx.lock().await;
        if *in_tx {
            return Err(StorageError::backend(
                AdapterKind::Mobile.as_str(),
                "nested transactions are not supported",
            ));
        }
        self.config
            .plugin
            .execute(&self.config.database, "BEGIN", &[])
            .await?;
        *in_tx = true;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.lifecycle.ensure_open()?;
        let mut in_tx = self.in_tx.lock().await;
        if !*in_tx {
            return Err(StorageError::backend(
                AdapterKind::Mobile.as_str(),
                "no transaction is pinned",
            ));
        }
        self.config
            .plugin
            .execute(&self.config.database, "COMMIT", &[])
            .await?;
        *in_tx = false;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.lifecycle.ensure_open()?;
        let mut in_tx = self.in_tx.lock().await;
        if !*in_tx {
            return Err(StorageError::backend(
                AdapterKind::Mobile.as_str(),
                "no transaction is pinned",
            ));
        }
        self.config
            .plugin
            .execute(&self.config.database, "ROLLBACK", &[])
            .await?;
        *in_tx = false;
        Ok(())
    }
}
