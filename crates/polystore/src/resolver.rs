//! Priority-driven backend resolution.
//!
//! The resolver walks an ordered list of adapter kinds, instantiating and
//! opening each candidate until one succeeds. Every failure cause is
//! collected; exhausting the list fails with the whole bundle. The resolver
//! is stateless beyond the single call.

use std::sync::Arc;

use tracing::{info, warn};

use polystore_common::{Result, StorageError};
use polystore_core::{AdapterKind, MobileAdapter, MobileConfig, StorageAdapter};
use polystore_postgres::{PgConfig, PostgresAdapter};
use polystore_sqlite::{
    BlobAdapter, BlobConfig, EmbeddedAdapter, EmbeddedConfig, MemoryAdapter, MemorySnapshotStore,
    SnapshotStore, SqliteAdapter, SqliteConfig,
};

/// Environment variable overriding the head of the priority list.
pub const STORAGE_ADAPTER_ENV: &str = "STORAGE_ADAPTER";

/// Typed per-backend configuration consumed by the resolver.
///
/// One field per backend; a backend with no configuration either falls back
/// to its defaults (file, memory, embedded) or is skipped with a recorded
/// cause (postgres, mobile, which cannot be conjured from nothing).
#[derive(Default)]
pub struct ResolveOptions {
    /// Explicit priority order; replaces the runtime-derived default.
    pub priority: Option<Vec<AdapterKind>>,
    /// Environment override; when `None`, `resolve` reads
    /// [`STORAGE_ADAPTER_ENV`] from the process environment.
    pub env_override: Option<String>,
    pub sqlite: Option<SqliteConfig>,
    pub embedded: Option<EmbeddedConfig>,
    pub postgres: Option<PgConfig>,
    pub blob: Option<BlobConfig>,
    /// Store behind the blob adapter; defaults to the in-process named
    /// snapshot store.
    pub blob_store: Option<Arc<dyn SnapshotStore>>,
    pub mobile: Option<MobileConfig>,
}

impl std::fmt::Debug for ResolveOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolveOptions")
            .field("priority", &self.priority)
            .field("env_override", &self.env_override)
            .field("sqlite", &self.sqlite)
            .field("embedded", &self.embedded)
            .field("postgres", &self.postgres.is_some())
            .field("blob", &self.blob)
            .field("mobile", &self.mobile.is_some())
            .finish()
    }
}

/// The ordered candidate list for a set of options.
///
/// Defaults by runtime: a configured mobile plugin leads with the mobile
/// adapter; a configured network URL leads with the pooled adapter; wasm
/// hosts lead with the blob adapter; everything else starts native. A valid
/// environment override moves its kind to the front.
pub fn priority_list(options: &ResolveOptions, env_override: Option<&str>) -> Result<Vec<AdapterKind>> {
    let mut kinds = if let Some(priority) = &options.priority {
        priority.clone()
    } else if options.mobile.is_some() {
        vec![
            AdapterKind::Mobile,
            AdapterKind::BlobStore,
            AdapterKind::Embedded,
        ]
    } else if options.postgres.is_some() {
        vec![
            AdapterKind::Postgres,
            AdapterKind::Sqlite,
            AdapterKind::Embedded,
        ]
    } else if cfg!(target_arch = "wasm32") {
        vec![AdapterKind::BlobStore, AdapterKind::Embedded]
    } else {
        vec![AdapterKind::Sqlite, AdapterKind::Embedded]
    };

    if let Some(value) = env_override {
        let kind: AdapterKind = value.parse()?;
        kinds.retain(|k| *k != kind);
        kinds.insert(0, kind);
    }
    Ok(kinds)
}

fn build(kind: AdapterKind, options: &ResolveOptions) -> Result<Box<dyn StorageAdapter>> {
    match kind {
        AdapterKind::Sqlite => Ok(Box::new(SqliteAdapter::new(
            options.sqlite.clone().unwrap_or_default(),
        ))),
        AdapterKind::Memory => Ok(Box::new(MemoryAdapter::new())),
        AdapterKind::Embedded => Ok(Box::new(EmbeddedAdapter::new(
            options.embedded.clone().unwrap_or_default(),
        ))),
        AdapterKind::Postgres => match &options.postgres {
            Some(config) => Ok(Box::new(PostgresAdapter::new(config.clone()))),
            None => Err(StorageError::Config(
                "no network configuration provided".to_string(),
            )),
        },
        AdapterKind::BlobStore => {
            let config = options.blob.clone().unwrap_or_default();
            let store = options.blob_store.clone().unwrap_or_else(|| {
                Arc::new(MemorySnapshotStore::new(
                    config.db_name.clone(),
                    config.store_name.clone(),
                )) as Arc<dyn SnapshotStore>
            });
            Ok(Box::new(BlobAdapter::new(config, store)))
        }
        AdapterKind::Mobile => match &options.mobile {
            Some(config) => Ok(Box::new(MobileAdapter::new(config.clone()))),
            None => Err(StorageError::Config(
                "no mobile plugin provided".to_string(),
            )),
        },
    }
}

/// Resolves and opens a backend.
///
/// Candidates are tried in priority order; the first successful `open`
/// wins. When every candidate fails, the bundled causes surface as
/// [`StorageError::Resolution`].
pub async fn resolve(options: ResolveOptions) -> Result<Box<dyn StorageAdapter>> {
    let env_value = options
        .env_override
        .clone()
        .or_else(|| std::env::var(STORAGE_ADAPTER_ENV).ok());
    let kinds = priority_list(&options, env_value.as_deref())?;

    let mut causes = Vec::new();
    for kind in kinds {
        let adapter = match build(kind, &options) {
            Ok(adapter) => adapter,
            Err(err) => {
                causes.push(format!("{kind}: {err}"));
                continue;
            }
        };
        match adapter.open().await {
            Ok(()) => {
                info!(kind = kind.as_str(), "storage backend resolved");
                return Ok(adapter);
            }
            Err(err) => {
                warn!(kind = kind.as_str(), error = %err, "candidate failed to open");
                causes.push(format!("{kind}: {err}"));
            }
        }
    }

    Err(StorageError::Resolution { causes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_priority_is_native_first() {
        let kinds = priority_list(&ResolveOptions::default(), None).unwrap();
        assert_eq!(kinds, vec![AdapterKind::Sqlite, AdapterKind::Embedded]);
    }

    #[test]
    fn test_network_config_leads_with_postgres() {
        let options = ResolveOptions {
            postgres: Some(PgConfig::new("postgres://localhost/app")),
            ..Default::default()
        };
        let kinds = priority_list(&options, None).unwrap();
        assert_eq!(
            kinds,
            vec![
                AdapterKind::Postgres,
                AdapterKind::Sqlite,
                AdapterKind::Embedded,
            ]
        );
    }

    #[test]
    fn test_env_override_moves_kind_to_front() {
        let kinds = priority_list(&ResolveOptions::default(), Some("embedded")).unwrap();
        assert_eq!(kinds[0], AdapterKind::Embedded);
        assert_eq!(kinds, vec![AdapterKind::Embedded, AdapterKind::Sqlite]);
    }

    #[test]
    fn test_env_override_unknown_kind_rejected() {
        let err = priority_list(&ResolveOptions::default(), Some("cloud")).unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[test]
    fn test_explicit_priority_wins() {
        let options = ResolveOptions {
            priority: Some(vec![AdapterKind::Memory]),
            ..Default::default()
        };
        let kinds = priority_list(&options, None).unwrap();
        assert_eq!(kinds, vec![AdapterKind::Memory]);
    }

    #[tokio::test]
    async fn test_resolver_falls_back_in_order() {
        // The native candidate cannot open a file inside a missing
        // read-only location; resolution falls through to the embedded
        // engine and records one cause.
        let options = ResolveOptions {
            priority: Some(vec![AdapterKind::Sqlite, AdapterKind::Embedded]),
            // Pin the override so the process environment cannot reorder
            // the candidates under test.
            env_override: Some("sqlite".to_string()),
            sqlite: Some(SqliteConfig {
                path: "/proc/polystore-denied/data.db".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let adapter = resolve(options).await.unwrap();
        assert_eq!(adapter.kind(), AdapterKind::Embedded);
        adapter.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_resolution_bundles_all_causes() {
        let options = ResolveOptions {
            priority: Some(vec![AdapterKind::Postgres, AdapterKind::Mobile]),
            // Pin the override so the process environment cannot add
            // candidates.
            env_override: Some("postgres".to_string()),
            ..Default::default()
        };
        let err = resolve(options).await.unwrap_err();
        match err {
            StorageError::Resolution { causes } => {
                assert_eq!(causes.len(), 2);
                assert!(causes[0].starts_with("postgres:"));
                assert!(causes[1].starts_with("mobile:"));
            }
            other => panic!("expected resolution error, got {other}"),
        }
    }
}
