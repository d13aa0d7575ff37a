//! Storage budget enforcement through the sync manager.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use polystore_core::{Params, SqlValue, StorageAdapter};
use polystore_sqlite::MemoryAdapter;
use polystore_sync::{
    StorageLimitAction, SyncHooks, SyncManager, SyncPolicy, TableSync,
};

const SCHEMA: &str = "CREATE TABLE notes(id TEXT PRIMARY KEY, updated_at INTEGER, v TEXT)";

async fn adapter_with_rows(rows: i64) -> Arc<dyn StorageAdapter> {
    let adapter = MemoryAdapter::new();
    adapter.open().await.unwrap();
    adapter.exec(SCHEMA).await.unwrap();
    for i in 0..rows {
        adapter
            .run(
                "INSERT INTO notes VALUES (?, ?, 'x')",
                Params::positional(vec![
                    SqlValue::Text(format!("n{i:05}")),
                    SqlValue::Integer(1_700_000_000_000 + i),
                ]),
            )
            .await
            .unwrap();
    }
    Arc::new(adapter)
}

fn budget_policy(limit_mb: u64, action: StorageLimitAction) -> SyncPolicy {
    SyncPolicy {
        storage_limit_mb: Some(limit_mb),
        limit_action: action,
        tables: vec![TableSync::new("notes")],
        ..Default::default()
    }
}

async fn note_count(adapter: &dyn StorageAdapter) -> i64 {
    adapter
        .get("SELECT count(*) AS n FROM notes", Params::none())
        .await
        .unwrap()
        .unwrap()
        .integer("n")
        .unwrap()
}

#[tokio::test]
async fn warn_action_reports_and_continues() {
    // Memory adapters expose no file; the limit reads as thousands of rows.
    let primary = adapter_with_rows(5).await;
    let remote = adapter_with_rows(0).await;

    let warnings = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&warnings);
    let manager = SyncManager::new(
        Arc::clone(&primary),
        Some(remote),
        budget_policy(0, StorageLimitAction::Warn),
        SyncHooks::new().on_error(move |err| {
            if err.to_string().contains("storage budget") {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        }),
    );

    let result = manager.sync().await.unwrap();
    assert!(result.success, "warn action must not fail the cycle");
    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("storage budget exceeded")));
    assert_eq!(warnings.load(Ordering::SeqCst), 1);
    // Nothing was deleted.
    assert_eq!(note_count(primary.as_ref()).await, 5);
    manager.close().await;
}

#[tokio::test]
async fn error_action_fails_cycle() {
    let primary = adapter_with_rows(5).await;
    let remote = adapter_with_rows(0).await;

    let manager = SyncManager::new(
        Arc::clone(&primary),
        Some(remote),
        budget_policy(0, StorageLimitAction::Error),
        SyncHooks::new(),
    );

    let result = manager.sync().await.unwrap();
    assert!(!result.success);
    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("storage budget exceeded")));
    assert_eq!(note_count(primary.as_ref()).await, 5);
    manager.close().await;
}

#[tokio::test]
async fn prune_action_deletes_oldest_until_within_budget() {
    // 1010 rows against a 1-unit limit (1000 rows in the surrogate
    // measure): one batch of the oldest 100 rows goes.
    let primary = adapter_with_rows(1010).await;
    let remote = adapter_with_rows(0).await;

    let manager = SyncManager::new(
        Arc::clone(&primary),
        Some(remote),
        budget_policy(1, StorageLimitAction::Prune),
        SyncHooks::new(),
    );

    let result = manager.sync().await.unwrap();
    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(note_count(primary.as_ref()).await, 910);

    // The survivors are the newest rows: the oldest 100 are gone.
    let oldest_gone = primary
        .as_ref()
        .get(
            "SELECT count(*) AS n FROM notes WHERE id < 'n00100'",
            Params::none(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(oldest_gone.integer("n"), Some(0));
    manager.close().await;
}
