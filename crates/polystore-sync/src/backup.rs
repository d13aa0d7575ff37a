//! Object-store backups.
//!
//! A four-method object store is the only integration surface; the backup
//! manager periodically exports the primary adapter as a JSON dump or SQL
//! script, optionally gzip-compressed, writes it under a timestamped key,
//! and prunes keys beyond the retention count, oldest first.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use polystore_common::{Result, StorageError};
use polystore_core::StorageAdapter;

use crate::export::{export_json, export_sql};

/// Minimal object-storage client surface.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, key: &str, data: &[u8]) -> Result<()>;
    async fn download(&self, key: &str) -> Result<Vec<u8>>;
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Serialized backup format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackupFormat {
    /// JSON dump document: schema plus row lists.
    #[default]
    Json,
    /// SQL dump script.
    Sql,
}

impl BackupFormat {
    fn extension(self) -> &'static str {
        match self {
            BackupFormat::Json => "json",
            BackupFormat::Sql => "sql",
        }
    }
}

/// Backup behavior.
#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// Key prefix, e.g. `"backups/app/"`.
    pub prefix: String,
    pub format: BackupFormat,
    /// Gzip the payload and append `.gz` to the key.
    pub compress: bool,
    /// Keep at most this many backups; older keys (lexicographically
    /// smallest) are deleted after each run.
    pub retain: Option<usize>,
    /// Period for `start()`.
    pub interval: Option<Duration>,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            format: BackupFormat::Json,
            compress: false,
            retain: None,
            interval: None,
        }
    }
}

/// Periodically exports an adapter into an object store.
pub struct BackupManager {
    adapter: Arc<dyn StorageAdapter>,
    store: Arc<dyn ObjectStore>,
    options: BackupOptions,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl BackupManager {
    pub fn new(
        adapter: Arc<dyn StorageAdapter>,
        store: Arc<dyn ObjectStore>,
        options: BackupOptions,
    ) -> Self {
        Self {
            adapter,
            store,
            options,
            task: parking_lot::Mutex::new(None),
        }
    }

    fn backup_key(&self) -> String {
        let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
        let mut key = format!(
            "{}backup-{stamp}.{}",
            self.options.prefix,
            self.options.format.extension()
        );
        if self.options.compress {
            key.push_str(".gz");
        }
        key
    }

    /// Runs one backup and returns the written key.
    pub async fn run_once(&self) -> Result<String> {
        let payload = match self.options.format {
            BackupFormat::Json => {
                let dump = export_json(self.adapter.as_ref()).await?;
                serde_json::to_vec_pretty(&dump)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?
            }
            BackupFormat::Sql => export_sql(self.adapter.as_ref()).await?.into_bytes(),
        };

        let payload = if self.options.compress {
            gzip(&payload)?
        } else {
            payload
        };

        let key = self.backup_key();
        self.store.upload(&key, &payload).await?;
        info!(key = %key, bytes = payload.len(), "backup written");

        self.prune().await?;
        Ok(key)
    }

    /// Deletes backups beyond the retention count, oldest first
    /// (lexicographic on keys, which sorts the timestamped names).
    async fn prune(&self) -> Result<()> {
        let Some(retain) = self.options.retain else {
            return Ok(());
        };

        let marker = format!("{}backup", self.options.prefix);
        let mut keys: Vec<String> = self
            .store
            .list(Some(&self.options.prefix))
            .await?
            .into_iter()
            .filter(|k| k.starts_with(&marker))
            .collect();
        keys.sort();

        if keys.len() > retain {
            let excess = keys.len() - retain;
            for key in keys.into_iter().take(excess) {
                info!(key = %key, "pruning expired backup");
                self.store.delete(&key).await?;
            }
        }
        Ok(())
    }

    /// Starts the periodic task. Requires `options.interval`.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let Some(period) = self.options.interval else {
            return Err(StorageError::Config(
                "backup interval is not configured".to_string(),
            ));
        };
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticks = tokio::time::interval_at(start, period);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                if let Err(err) = manager.run_once().await {
                    warn!(error = %err, "periodic backup failed");
                }
            }
        });
        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Stops the periodic task.
    pub fn close(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for BackupManager {
    fn drop(&mut self) {
        self.close();
    }
}

fn gzip(payload: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(payload)
        .map_err(|e| StorageError::Serialization(format!("gzip: {e}")))?;
    encoder
        .finish()
        .map_err(|e| StorageError::Serialization(format!("gzip: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_extension() {
        assert_eq!(BackupFormat::Json.extension(), "json");
        assert_eq!(BackupFormat::Sql.extension(), "sql");
    }

    #[test]
    fn test_gzip_round_trip() {
        let payload = b"INSERT INTO t VALUES (1);".repeat(64);
        let compressed = gzip(&payload).unwrap();
        assert!(compressed.len() < payload.len());

        let mut decoder = flate2::read::GzDecoder::new(compressed.as_slice());
        let mut out = Vec::new();
        std::io::Read::read_to_end(&mut decoder, &mut out).unwrap();
        assert_eq!(out, payload);
    }
}
