//! In-memory adapter.
//!
//! The native engine fixed at `:memory:`. Declares no persistence, WAL, or
//! locking; everything else delegates to the file adapter's implementation.

use async_trait::async_trait;

use polystore_common::Result;
use polystore_core::{
    AdapterContext, AdapterKind, AdapterState, BatchOp, BatchResult, Capabilities, Capability,
    Params, Row, RunResult, StorageAdapter,
};

use crate::native::{SqliteAdapter, SqliteConfig};

const MEMORY_CAPS: Capabilities = Capabilities::new(&[
    Capability::Sync,
    Capability::Transactions,
    Capability::Prepared,
    Capability::Batch,
]);

const MEMORY_LIMITATIONS: &[&str] = &[
    "contents are lost when the handle closes",
    "one outstanding operation per handle",
];

/// Volatile adapter for fallbacks and tests.
pub struct MemoryAdapter {
    inner: SqliteAdapter,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        let config = SqliteConfig {
            path: ":memory:".to_string(),
            wal: false,
            ..Default::default()
        };
        Self {
            inner: SqliteAdapter::with_kind(
                config,
                AdapterKind::Memory,
                MEMORY_CAPS,
                MEMORY_LIMITATIONS,
            ),
        }
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Memory
    }

    fn capabilities(&self) -> Capabilities {
        MEMORY_CAPS
    }

    fn state(&self) -> AdapterState {
        self.inner.state()
    }

    fn context(&self) -> AdapterContext {
        self.inner.context()
    }

    async fn open(&self) -> Result<()> {
        self.inner.open().await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    async fn run(&self, sql: &str, params: Params) -> Result<RunResult> {
        self.inner.run(sql, params).await
    }

    async fn get(&self, sql: &str, params: Params) -> Result<Option<Row>> {
        self.inner.get(sql, params).await
    }

    async fn all(&self, sql: &str, params: Params) -> Result<Vec<Row>> {
        self.inner.all(sql, params).await
    }

    async fn exec(&self, script: &str) -> Result<()> {
        self.inner.exec(script).await
    }

    async fn begin(&self) -> Result<()> {
        self.inner.begin().await
    }

    async fn commit(&self) -> Result<()> {
        self.inner.commit().await
    }

    async fn rollback(&self) -> Result<()> {
        self.inner.rollback().await
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> Result<BatchResult> {
        self.inner.batch(ops).await
    }
}
