//! Shared rusqlite plumbing for the SQLite-family adapters.
//!
//! Everything here is synchronous; the adapters expose it through the async
//! contract while executing on the caller's task, one operation per handle
//! at a time.

use std::path::Path;
use std::time::Duration;

use rusqlite::backup::Backup;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, OpenFlags, Statement, ToSql};

use polystore_common::{Result, StorageError};
use polystore_core::{scan_markers, Marker, Params, Row, RowId, RunResult, SqlValue};

/// Pages copied per backup step when serializing a database.
const BACKUP_PAGES_PER_STEP: std::os::raw::c_int = 64;

/// Connection plus the pinned-transaction flag for one handle.
pub(crate) struct Engine {
    pub conn: Connection,
    pub in_tx: bool,
}

impl Engine {
    pub fn new(conn: Connection) -> Self {
        Self { conn, in_tx: false }
    }
}

/// Opens a database connection.
///
/// `:memory:` and `file:` URIs pass through untouched; plain paths get
/// their parent directory created on demand.
pub(crate) fn open_connection(path: &str, read_only: bool) -> Result<Connection> {
    if path != ":memory:" && !path.starts_with("file:") {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Connection(format!(
                        "cannot create database directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }
    }

    let flags = if read_only {
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX
    } else {
        OpenFlags::default()
    };
    let conn = Connection::open_with_flags(path, flags)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/// Borrowed [`ToSql`] view over a [`SqlValue`].
pub(crate) struct BindValue<'a>(pub &'a SqlValue);

impl ToSql for BindValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            SqlValue::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            SqlValue::Integer(v) => ToSqlOutput::Borrowed(ValueRef::Integer(*v)),
            SqlValue::Real(v) => ToSqlOutput::Borrowed(ValueRef::Real(*v)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

/// Rejects marker/bundle shape mismatches before touching the driver.
fn check_marker_shapes(sql: &str, params: &Params) -> Result<()> {
    for marker in scan_markers(sql) {
        match (&marker, params) {
            (Marker::Positional, Params::Named(_)) => {
                return Err(StorageError::Bind {
                    marker: "?".to_string(),
                })
            }
            (Marker::Named(name), Params::Named(map)) => {
                if !map.contains_key(name) {
                    return Err(StorageError::Bind {
                        marker: format!("@{name}"),
                    });
                }
            }
            (Marker::Named(name), Params::Positional(_) | Params::Empty) => {
                return Err(StorageError::Bind {
                    marker: format!("@{name}"),
                })
            }
            (Marker::Positional, Params::Positional(_) | Params::Empty) => {}
        }
    }
    Ok(())
}

/// Binds a parameter bundle onto a prepared statement.
fn bind_params(stmt: &mut Statement<'_>, params: &Params) -> Result<()> {
    match params {
        Params::Empty => {
            if stmt.parameter_count() > 0 {
                return Err(StorageError::Bind {
                    marker: "?1".to_string(),
                });
            }
        }
        Params::Positional(values) => {
            let expected = stmt.parameter_count();
            if expected > values.len() {
                return Err(StorageError::Bind {
                    marker: format!("?{}", values.len() + 1),
                });
            }
            for (i, value) in values.iter().take(expected).enumerate() {
                stmt.raw_bind_parameter(i + 1, BindValue(value))?;
            }
        }
        Params::Named(map) => {
            for (name, value) in map {
                // Unreferenced names are simply not passed to the driver.
                if let Some(index) = stmt.parameter_index(&format!("@{name}"))? {
                    stmt.raw_bind_parameter(index, BindValue(value))?;
                }
            }
        }
    }
    Ok(())
}

/// Executes one mutating statement through the handle's statement cache.
pub(crate) fn run_statement(conn: &Connection, sql: &str, params: &Params) -> Result<RunResult> {
    check_marker_shapes(sql, params)?;
    let mut stmt = conn.prepare_cached(sql)?;
    bind_params(&mut stmt, params)?;
    let changes = stmt.raw_execute()? as u64;
    drop(stmt);

    let rowid = conn.last_insert_rowid();
    let last_insert_row_id = if rowid == 0 {
        None
    } else {
        Some(RowId::Int(rowid))
    };
    Ok(RunResult::new(changes, last_insert_row_id))
}

/// Executes a query and materializes every row.
pub(crate) fn query_statement(conn: &Connection, sql: &str, params: &Params) -> Result<Vec<Row>> {
    check_marker_shapes(sql, params)?;
    let mut stmt = conn.prepare_cached(sql)?;
    bind_params(&mut stmt, params)?;

    let names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    let mut raw = stmt.raw_query();
    while let Some(driver_row) = raw.next()? {
        let mut row = Row::default();
        for (i, name) in names.iter().enumerate() {
            let value: Value = driver_row.get(i)?;
            row.insert(name.clone(), from_driver_value(value));
        }
        rows.push(row);
    }
    Ok(rows)
}

fn from_driver_value(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::Integer(v),
        Value::Real(v) => SqlValue::Real(v),
        Value::Text(v) => SqlValue::Text(v),
        Value::Blob(v) => SqlValue::Blob(v),
    }
}

/// Executes a multi-statement script. The engine splits on top-level `;`
/// itself, with the same quote handling as the portable splitter.
pub(crate) fn exec_script(conn: &Connection, script: &str) -> Result<()> {
    conn.execute_batch(script)?;
    Ok(())
}

/// Serializes the whole database to bytes via the online backup API.
pub(crate) fn export_bytes(conn: &Connection) -> Result<Vec<u8>> {
    let shuttle = tempfile::NamedTempFile::new()
        .map_err(|e| StorageError::Internal(format!("snapshot shuttle: {e}")))?;
    {
        let mut dst = Connection::open(shuttle.path())?;
        let backup = Backup::new(conn, &mut dst)?;
        backup.run_to_completion(BACKUP_PAGES_PER_STEP, Duration::from_millis(0), None)?;
    }
    std::fs::read(shuttle.path())
        .map_err(|e| StorageError::Internal(format!("snapshot read: {e}")))
}

/// Restores a database from serialized bytes into a fresh in-memory engine.
pub(crate) fn import_bytes(bytes: &[u8]) -> Result<Connection> {
    let shuttle = tempfile::NamedTempFile::new()
        .map_err(|e| StorageError::Internal(format!("snapshot shuttle: {e}")))?;
    std::fs::write(shuttle.path(), bytes)
        .map_err(|e| StorageError::Internal(format!("snapshot write: {e}")))?;

    let src = Connection::open_with_flags(
        shuttle.path(),
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let mut dst = Connection::open_in_memory()?;
    {
        let backup = Backup::new(&src, &mut dst)?;
        backup.run_to_completion(BACKUP_PAGES_PER_STEP, Duration::from_millis(0), None)?;
    }
    Ok(dst)
}

/// Loads a database file into a fresh in-memory engine.
pub(crate) fn load_file_into_memory(path: &str) -> Result<Connection> {
    let src = open_connection(path, true)?;
    let mut dst = Connection::open_in_memory()?;
    {
        let backup = Backup::new(&src, &mut dst)?;
        backup.run_to_completion(BACKUP_PAGES_PER_STEP, Duration::from_millis(0), None)?;
    }
    Ok(dst)
}

/// Writes an in-memory engine's content to a database file.
pub(crate) fn save_memory_to_file(conn: &Connection, path: &str) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Connection(format!(
                    "cannot create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }
    let mut dst = Connection::open(path)?;
    let backup = Backup::new(conn, &mut dst)?;
    backup.run_to_completion(BACKUP_PAGES_PER_STEP, Duration::from_millis(0), None)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t(k TEXT PRIMARY KEY, v INTEGER)")
            .unwrap();
        conn
    }

    #[test]
    fn test_run_returns_changes_and_rowid() {
        let conn = seeded();
        let result = run_statement(
            &conn,
            "INSERT INTO t VALUES (?, ?)",
            &Params::positional(vec![SqlValue::Text("a".to_string()), SqlValue::Integer(1)]),
        )
        .unwrap();
        assert_eq!(result.changes, 1);
        assert_eq!(result.last_insert_row_id, Some(RowId::Int(1)));
    }

    #[test]
    fn test_query_materializes_values() {
        let conn = seeded();
        run_statement(
            &conn,
            "INSERT INTO t VALUES ('a', 1)",
            &Params::none(),
        )
        .unwrap();

        let rows = query_statement(
            &conn,
            "SELECT v FROM t WHERE k = ?",
            &Params::single("a"),
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].integer("v"), Some(1));
    }

    #[test]
    fn test_named_parameters_bind_natively() {
        let conn = seeded();
        run_statement(
            &conn,
            "INSERT INTO t VALUES (@k, @v)",
            &Params::from([("k", SqlValue::Text("x".to_string())), ("v", SqlValue::Integer(9))]),
        )
        .unwrap();

        let rows = query_statement(
            &conn,
            "SELECT v FROM t WHERE k = @k",
            &Params::from([("k", "x")]),
        )
        .unwrap();
        assert_eq!(rows[0].integer("v"), Some(9));
    }

    #[test]
    fn test_missing_named_value_is_bind_error() {
        let conn = seeded();
        let err = run_statement(
            &conn,
            "INSERT INTO t VALUES (@k, @v)",
            &Params::from([("k", "x")]),
        )
        .unwrap_err();
        match err {
            StorageError::Bind { marker } => assert_eq!(marker, "@v"),
            other => panic!("expected bind error, got {other}"),
        }
    }

    #[test]
    fn test_missing_positional_value_is_bind_error() {
        let conn = seeded();
        let err = run_statement(
            &conn,
            "INSERT INTO t VALUES (?, ?)",
            &Params::single("only one"),
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::Bind { .. }));
    }

    #[test]
    fn test_null_round_trips() {
        let conn = seeded();
        run_statement(
            &conn,
            "INSERT INTO t VALUES (?, ?)",
            &Params::positional(vec![SqlValue::Text("n".to_string()), SqlValue::Null]),
        )
        .unwrap();
        let rows = query_statement(&conn, "SELECT v FROM t WHERE k='n'", &Params::none()).unwrap();
        assert_eq!(rows[0].get("v"), Some(&SqlValue::Null));
    }

    #[test]
    fn test_export_import_round_trip() {
        let conn = seeded();
        for i in 0..10 {
            run_statement(
                &conn,
                "INSERT INTO t VALUES (?, ?)",
                &Params::positional(vec![SqlValue::Text(format!("k{i}")), SqlValue::Integer(i)]),
            )
            .unwrap();
        }

        let bytes = export_bytes(&conn).unwrap();
        assert!(!bytes.is_empty());

        let restored = import_bytes(&bytes).unwrap();
        let rows = query_statement(&restored, "SELECT count(*) AS n FROM t", &Params::none())
            .unwrap();
        assert_eq!(rows[0].integer("n"), Some(10));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.db");
        let path = path.to_str().unwrap().to_string();

        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t(v INTEGER); INSERT INTO t VALUES (7)")
            .unwrap();
        save_memory_to_file(&conn, &path).unwrap();

        let loaded = load_file_into_memory(&path).unwrap();
        let rows = query_statement(&loaded, "SELECT v FROM t", &Params::none()).unwrap();
        assert_eq!(rows[0].integer("v"), Some(7));
    }
}
