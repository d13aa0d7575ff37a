//! Versioned schema migrations.
//!
//! Plain statement execution with version tracking: each migration runs in
//! its own transaction and is recorded in `_migrations` with a checksum.
//! Re-running is idempotent; editing an applied migration is an error.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use tracing::info;

use polystore_common::{Result, StorageError};
use polystore_core::{Params, SqlValue, StorageAdapter};

const TRACKING_TABLE_DDL: &str = "CREATE TABLE IF NOT EXISTS _migrations (\
     version INTEGER PRIMARY KEY, \
     name TEXT NOT NULL, \
     checksum TEXT NOT NULL, \
     applied_at TEXT NOT NULL)";

/// One schema migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub sql: String,
}

impl Migration {
    pub fn new(version: i64, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            sql: sql.into(),
        }
    }

    fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.sql.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Applies migrations in ascending version order.
#[derive(Debug, Clone)]
pub struct MigrationRunner {
    migrations: Vec<Migration>,
}

impl MigrationRunner {
    pub fn new(mut migrations: Vec<Migration>) -> Result<Self> {
        migrations.sort_by_key(|m| m.version);
        for pair in migrations.windows(2) {
            if pair[0].version == pair[1].version {
                return Err(StorageError::Config(format!(
                    "duplicate migration version {}",
                    pair[0].version
                )));
            }
        }
        Ok(Self { migrations })
    }

    /// Applies every pending migration; returns how many ran.
    pub async fn run(&self, adapter: &dyn StorageAdapter) -> Result<u32> {
        adapter.exec(TRACKING_TABLE_DDL).await?;

        let rows = adapter
            .all("SELECT version, checksum FROM _migrations", Params::none())
            .await?;
        let applied: HashMap<i64, String> = rows
            .iter()
            .filter_map(|row| {
                Some((row.integer("version")?, row.text("checksum")?.to_string()))
            })
            .collect();

        let mut ran = 0u32;
        for migration in &self.migrations {
            let checksum = migration.checksum();
            if let Some(existing) = applied.get(&migration.version) {
                if *existing != checksum {
                    return Err(StorageError::Config(format!(
                        "migration {} ({}) changed after being applied",
                        migration.version, migration.name
                    )));
                }
                continue;
            }

            adapter.begin().await?;
            let outcome = async {
                adapter.exec(&migration.sql).await?;
                adapter
                    .run(
                        "INSERT INTO _migrations (version, name, checksum, applied_at) \
                         VALUES (?, ?, ?, ?)",
                        Params::positional(vec![
                            SqlValue::Integer(migration.version),
                            SqlValue::Text(migration.name.clone()),
                            SqlValue::Text(checksum.clone()),
                            SqlValue::Text(chrono_now()),
                        ]),
                    )
                    .await?;
                Ok::<_, StorageError>(())
            }
            .await;

            match outcome {
                Ok(()) => {
                    adapter.commit().await?;
                    info!(
                        version = migration.version,
                        name = %migration.name,
                        "migration applied"
                    );
                    ran += 1;
                }
                Err(err) => {
                    let _ = adapter.rollback().await;
                    return Err(err);
                }
            }
        }
        Ok(ran)
    }
}

fn chrono_now() -> String {
    chrono::Utc::now().to_rfc3339()
}
