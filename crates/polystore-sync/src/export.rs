//! Database export and import.
//!
//! Two formats over the same catalog walk: a JSON dump document (schema
//! plus row lists) and a SQL dump script. The backup layer writes either;
//! import replays a dump into any adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use polystore_common::{Result, StorageError};
use polystore_core::{AdapterKind, Params, Row, SqlValue, StorageAdapter};

use crate::sql::{quote_ident, validate_ident};

/// Dump document layout version.
pub const DUMP_VERSION: u32 = 1;

/// One exported table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpTable {
    pub name: String,
    /// Engine DDL, when the catalog exposes it.
    pub create_sql: Option<String>,
    /// Rows in JSON object form.
    pub rows: Vec<serde_json::Value>,
}

/// A whole-database dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpDocument {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub tables: Vec<DumpTable>,
}

/// Lists user tables, excluding engine catalogs and `_`-prefixed
/// bookkeeping tables.
pub async fn list_tables(adapter: &dyn StorageAdapter) -> Result<Vec<String>> {
    let sql = match adapter.kind() {
        AdapterKind::Postgres => {
            "SELECT table_name AS name FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE' ORDER BY table_name"
        }
        _ => {
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' ORDER BY name"
        }
    };

    let rows = adapter.all(sql, Params::none()).await?;
    Ok(rows
        .iter()
        .filter_map(|row| row.text("name").map(str::to_string))
        .filter(|name| !name.starts_with('_'))
        .collect())
}

/// The engine DDL for a table, when exposed.
async fn table_ddl(adapter: &dyn StorageAdapter, table: &str) -> Result<Option<String>> {
    if adapter.kind() == AdapterKind::Postgres {
        // The relational catalog has no canonical CREATE text.
        return Ok(None);
    }
    let row = adapter
        .get(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
            Params::single(table),
        )
        .await?;
    Ok(row.and_then(|r| r.text("sql").map(str::to_string)))
}

/// Exports every user table as a JSON dump document.
pub async fn export_json(adapter: &dyn StorageAdapter) -> Result<DumpDocument> {
    let mut tables = Vec::new();
    for name in list_tables(adapter).await? {
        validate_ident(&name)?;
        let rows = adapter
            .all(&format!("SELECT * FROM {}", quote_ident(&name)), Params::none())
            .await?;
        let create_sql = table_ddl(adapter, &name).await?;
        debug!(table = %name, rows = rows.len(), "table exported");
        tables.push(DumpTable {
            name,
            create_sql,
            rows: rows.iter().map(Row::to_json).collect(),
        });
    }
    Ok(DumpDocument {
        version: DUMP_VERSION,
        exported_at: Utc::now(),
        tables,
    })
}

/// Imports a dump document: recreates tables (when DDL is present) and
/// upserts every row inside one transaction per table.
pub async fn import_json(adapter: &dyn StorageAdapter, dump: &DumpDocument) -> Result<()> {
    if dump.version != DUMP_VERSION {
        return Err(StorageError::Serialization(format!(
            "unsupported dump version {}",
            dump.version
        )));
    }

    for table in &dump.tables {
        validate_ident(&table.name)?;
        if let Some(ddl) = &table.create_sql {
            adapter
                .exec(&format!("CREATE TABLE IF NOT EXISTS {}", strip_create(ddl)?))
                .await?;
        }

        adapter.begin().await?;
        let outcome = async {
            for json_row in &table.rows {
                let row = Row::from_json(json_row)?;
                let (sql, params) = insert_statement(&table.name, &row)?;
                adapter.run(&sql, params).await?;
            }
            Ok::<_, StorageError>(())
        }
        .await;

        match outcome {
            Ok(()) => adapter.commit().await?,
            Err(err) => {
                let _ = adapter.rollback().await;
                return Err(err);
            }
        }
    }
    Ok(())
}

/// Exports every user table as a SQL dump script.
pub async fn export_sql(adapter: &dyn StorageAdapter) -> Result<String> {
    let mut script = String::new();
    for name in list_tables(adapter).await? {
        validate_ident(&name)?;
        if let Some(ddl) = table_ddl(adapter, &name).await? {
            script.push_str(&ddl);
            script.push_str(";\n");
        }
        let rows = adapter
            .all(&format!("SELECT * FROM {}", quote_ident(&name)), Params::none())
            .await?;
        for row in &rows {
            script.push_str(&insert_literal(&name, row));
            script.push('\n');
        }
    }
    Ok(script)
}

/// `CREATE TABLE name (...)` with the leading keywords stripped, for
/// re-emission behind `IF NOT EXISTS`.
fn strip_create(ddl: &str) -> Result<&str> {
    let trimmed = ddl.trim_start();
    let upper = trimmed.to_ascii_uppercase();
    if let Some(rest) = upper.strip_prefix("CREATE TABLE") {
        let offset = trimmed.len() - rest.len();
        Ok(trimmed[offset..].trim_start())
    } else {
        Err(StorageError::Serialization(format!(
            "unexpected DDL shape: {ddl}"
        )))
    }
}

/// Plain parameterized INSERT, used by dump import where the target table
/// may lack a primary key on `id`.
fn insert_statement(table: &str, row: &Row) -> Result<(String, Params)> {
    let mut columns: Vec<&str> = row.column_names().collect();
    columns.sort_unstable();
    if columns.is_empty() {
        return Err(StorageError::Serialization(format!(
            "empty row in dump for {table}"
        )));
    }
    let mut values = Vec::with_capacity(columns.len());
    for column in &columns {
        validate_ident(column)?;
        values.push(row.get(column).cloned().unwrap_or(SqlValue::Null));
    }
    let column_list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let markers = vec!["?"; columns.len()].join(", ");
    Ok((
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            column_list.join(", "),
            markers
        ),
        Params::Positional(values),
    ))
}

/// INSERT with literal values, for the SQL dump format.
fn insert_literal(table: &str, row: &Row) -> String {
    let mut columns: Vec<&str> = row.column_names().collect();
    columns.sort_unstable();
    let column_list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let values: Vec<String> = columns
        .iter()
        .map(|c| literal(row.get(c).unwrap_or(&SqlValue::Null)))
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        quote_ident(table),
        column_list.join(", "),
        values.join(", ")
    )
}

fn literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Integer(v) => v.to_string(),
        SqlValue::Real(v) => v.to_string(),
        SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        SqlValue::Blob(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            format!("X'{hex}'")
        }
    }
}
