//! Identifier validation and statement generation shared by the sync cycle
//! and the export helpers.
//!
//! Table and column names come out of catalogs and configuration, never out
//! of synced data, but they still pass validation before being spliced into
//! statement text.

use polystore_common::{Result, StorageError};
use polystore_core::{Params, Row, SqlValue};

use crate::record::ID_COLUMN;

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`.
pub(crate) fn validate_ident(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(StorageError::Config(format!(
            "invalid identifier '{name}'"
        )))
    }
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{name}\"")
}

/// Builds a portable upsert keyed on the id column.
///
/// Columns are emitted in sorted order so the statement text is stable for
/// the adapters' statement caches.
pub(crate) fn upsert(table: &str, row: &Row) -> Result<(String, Params)> {
    validate_ident(table)?;

    let mut columns: Vec<&str> = row.column_names().collect();
    columns.sort_unstable();
    if columns.is_empty() {
        return Err(StorageError::Config(format!(
            "cannot upsert an empty row into {table}"
        )));
    }

    let mut values = Vec::with_capacity(columns.len());
    for column in &columns {
        validate_ident(column)?;
        values.push(row.get(column).cloned().unwrap_or(SqlValue::Null));
    }

    let column_list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let markers = vec!["?"; columns.len()].join(", ");
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| **c != ID_COLUMN)
        .map(|c| format!("{0} = excluded.{0}", quote_ident(c)))
        .collect();

    let sql = if updates.is_empty() {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO NOTHING",
            quote_ident(table),
            column_list.join(", "),
            markers,
            quote_ident(ID_COLUMN),
        )
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
            quote_ident(table),
            column_list.join(", "),
            markers,
            quote_ident(ID_COLUMN),
            updates.join(", "),
        )
    };

    Ok((sql, Params::Positional(values)))
}

pub(crate) fn select_all(table: &str, max_records: Option<u64>) -> Result<String> {
    validate_ident(table)?;
    Ok(match max_records {
        Some(limit) => format!(
            "SELECT * FROM {} ORDER BY \"updated_at\" DESC LIMIT {limit}",
            quote_ident(table)
        ),
        None => format!("SELECT * FROM {}", quote_ident(table)),
    })
}

pub(crate) fn count_rows(table: &str) -> Result<String> {
    validate_ident(table)?;
    Ok(format!("SELECT count(*) AS n FROM {}", quote_ident(table)))
}

/// Deletes the `limit` oldest rows by update instant.
pub(crate) fn delete_oldest(table: &str, limit: u64) -> Result<String> {
    validate_ident(table)?;
    let table = quote_ident(table);
    Ok(format!(
        "DELETE FROM {table} WHERE {id} IN (SELECT {id} FROM {table} ORDER BY \"updated_at\" ASC LIMIT {limit})",
        id = quote_ident(ID_COLUMN),
    ))
}
