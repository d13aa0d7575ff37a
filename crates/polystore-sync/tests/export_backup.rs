//! Export/import and backup flows over in-memory adapters.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use polystore_core::{Params, SqlValue, StorageAdapter};
use polystore_sqlite::MemoryAdapter;
use polystore_sync::{
    export_json, export_sql, import_json, list_tables, BackupFormat, BackupManager,
    BackupOptions, ObjectStore, Result, StorageError,
};

async fn seeded_adapter() -> Arc<dyn StorageAdapter> {
    let adapter = MemoryAdapter::new();
    adapter.open().await.unwrap();
    adapter
        .exec(
            "CREATE TABLE notes(id TEXT PRIMARY KEY, updated_at INTEGER, v TEXT);\
             CREATE TABLE tags(id TEXT PRIMARY KEY, updated_at INTEGER, label TEXT);\
             CREATE TABLE _sync_state(k TEXT PRIMARY KEY, v TEXT)",
        )
        .await
        .unwrap();
    for i in 0..4 {
        adapter
            .run(
                "INSERT INTO notes VALUES (?, ?, ?)",
                Params::positional(vec![
                    SqlValue::Text(format!("n{i}")),
                    SqlValue::Integer(i + 1),
                    SqlValue::Text(format!("note {i}")),
                ]),
            )
            .await
            .unwrap();
    }
    adapter
        .run(
            "INSERT INTO tags VALUES ('t1', 1, 'it''s quoted')",
            Params::none(),
        )
        .await
        .unwrap();
    Arc::new(adapter)
}

#[tokio::test]
async fn list_tables_skips_bookkeeping() {
    let adapter = seeded_adapter().await;
    let tables = list_tables(adapter.as_ref()).await.unwrap();
    assert_eq!(tables, vec!["notes".to_string(), "tags".to_string()]);
}

#[tokio::test]
async fn json_dump_round_trips_into_fresh_adapter() {
    let source = seeded_adapter().await;
    let dump = export_json(source.as_ref()).await.unwrap();
    assert_eq!(dump.tables.len(), 2);

    let target = MemoryAdapter::new();
    target.open().await.unwrap();
    import_json(&target, &dump).await.unwrap();

    let row = target
        .get(
            "SELECT v FROM notes WHERE id = ?",
            Params::single("n2"),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.text("v"), Some("note 2"));

    let count = target
        .get("SELECT count(*) AS n FROM notes", Params::none())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(count.integer("n"), Some(4));
}

#[tokio::test]
async fn sql_dump_replays_through_exec() {
    let source = seeded_adapter().await;
    let script = export_sql(source.as_ref()).await.unwrap();
    assert!(script.contains("CREATE TABLE notes"));
    assert!(script.contains("INSERT INTO \"tags\""));
    // Quote escaping survives.
    assert!(script.contains("'it''s quoted'"));

    let target = MemoryAdapter::new();
    target.open().await.unwrap();
    target.exec(&script).await.unwrap();

    let count = target
        .get("SELECT count(*) AS n FROM notes", Params::none())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(count.integer("n"), Some(4));
}

/// In-process object store for backup tests.
#[derive(Default)]
struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, key: &str, data: &[u8]) -> Result<()> {
        self.objects.lock().insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::Internal(format!("no such key {key}")))
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let prefix = prefix.unwrap_or_default();
        Ok(self
            .objects
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().remove(key);
        Ok(())
    }
}

#[tokio::test]
async fn backup_writes_timestamped_key() {
    let adapter = seeded_adapter().await;
    let store = Arc::new(MemoryObjectStore::default());
    let manager = BackupManager::new(
        adapter,
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        BackupOptions {
            prefix: "backups/app/".to_string(),
            ..Default::default()
        },
    );

    let key = manager.run_once().await.unwrap();
    assert!(key.starts_with("backups/app/backup-"));
    assert!(key.ends_with(".json"));

    let payload = store.download(&key).await.unwrap();
    let dump: serde_json::Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(dump["version"], 1);
}

#[tokio::test]
async fn compressed_sql_backup_round_trips() {
    let adapter = seeded_adapter().await;
    let store = Arc::new(MemoryObjectStore::default());
    let manager = BackupManager::new(
        adapter,
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        BackupOptions {
            format: BackupFormat::Sql,
            compress: true,
            ..Default::default()
        },
    );

    let key = manager.run_once().await.unwrap();
    assert!(key.ends_with(".sql.gz"));

    let payload = store.download(&key).await.unwrap();
    let mut decoder = flate2::read::GzDecoder::new(payload.as_slice());
    let mut script = String::new();
    std::io::Read::read_to_string(&mut decoder, &mut script).unwrap();
    assert!(script.contains("CREATE TABLE notes"));
}

#[tokio::test]
async fn retention_prunes_oldest_keys_first() {
    let adapter = seeded_adapter().await;
    let store = Arc::new(MemoryObjectStore::default());

    // Older backups already present, lexicographically before any new key.
    store
        .upload("backup-20200101T000000Z.json", b"old-1")
        .await
        .unwrap();
    store
        .upload("backup-20210101T000000Z.json", b"old-2")
        .await
        .unwrap();

    let manager = BackupManager::new(
        adapter,
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        BackupOptions {
            retain: Some(2),
            ..Default::default()
        },
    );
    manager.run_once().await.unwrap();

    let mut keys = store.list(None).await.unwrap();
    keys.sort();
    assert_eq!(keys.len(), 2);
    // The lexicographically smallest (oldest) key was pruned.
    assert_eq!(keys[0], "backup-20210101T000000Z.json");
}
