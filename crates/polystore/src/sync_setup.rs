//! Composed opening of a sync manager.
//!
//! Handles the remote-first primary pattern: try to open the network
//! backend as the primary and fall back to a locally resolved adapter when
//! the network is unavailable, then wire the optional remote side and hand
//! everything to [`SyncManager`].

use std::sync::Arc;

use tracing::{info, warn};

use polystore_common::Result;
use polystore_core::StorageAdapter;
use polystore_postgres::{PgConfig, PostgresAdapter};
use polystore_sync::{SyncHooks, SyncManager, SyncPolicy};

use crate::resolver::{resolve, ResolveOptions};

/// Everything needed to open a replicated store.
#[derive(Default)]
pub struct SyncSetup {
    /// When set, the primary opens against this network backend first and
    /// falls back to `primary` on failure.
    pub primary_remote_first: Option<PgConfig>,
    /// Local primary resolution.
    pub primary: ResolveOptions,
    /// Optional remote side of the replication pair.
    pub remote: Option<ResolveOptions>,
    pub policy: SyncPolicy,
    pub hooks: SyncHooks,
}

/// Opens the adapters and spawns the manager.
pub async fn open_sync_manager(setup: SyncSetup) -> Result<SyncManager> {
    let SyncSetup {
        primary_remote_first,
        primary,
        remote,
        policy,
        hooks,
    } = setup;

    let primary: Arc<dyn StorageAdapter> = match primary_remote_first {
        Some(config) => {
            let candidate = PostgresAdapter::new(config);
            match candidate.open().await {
                Ok(()) => {
                    info!("primary bound to the network backend");
                    Arc::new(candidate)
                }
                Err(err) => {
                    warn!(error = %err, "network primary unavailable, falling back");
                    Arc::from(resolve(primary).await?)
                }
            }
        }
        None => Arc::from(resolve(primary).await?),
    };

    let remote: Option<Arc<dyn StorageAdapter>> = match remote {
        Some(options) => Some(Arc::from(resolve(options).await?)),
        None => None,
    };

    Ok(SyncManager::new(primary, remote, policy, hooks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use polystore_core::{AdapterKind, Params};

    #[tokio::test]
    async fn test_network_primary_falls_back_locally() {
        let mut network = PgConfig::new("postgres://127.0.0.1:1/unreachable");
        network.open_retries = 0;
        network.acquire_timeout = std::time::Duration::from_secs(1);

        let setup = SyncSetup {
            primary_remote_first: Some(network),
            primary: ResolveOptions {
                priority: Some(vec![AdapterKind::Memory]),
                env_override: Some("memory".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let manager = open_sync_manager(setup).await.unwrap();
        let db = manager.db();
        assert_eq!(db.kind(), AdapterKind::Memory);
        db.exec("CREATE TABLE t(v INTEGER)").await.unwrap();
        db.run("INSERT INTO t VALUES (1)", Params::none())
            .await
            .unwrap();
        manager.close().await;
    }
}
