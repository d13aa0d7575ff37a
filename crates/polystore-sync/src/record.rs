//! Synchronized records.
//!
//! Every row entering the sync layer must carry a stable `id` and an
//! `updated_at` expressible as a comparable instant. Rows missing either
//! are rejected with a diagnostic and surfaced in the cycle result, never
//! silently dropped.

use chrono::DateTime;

use polystore_common::{Result, StorageError};
use polystore_core::{Row, SqlValue};

/// Column carrying the stable record identifier.
pub const ID_COLUMN: &str = "id";

/// Column carrying the update instant.
pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// Integer instants at or above this magnitude are taken as milliseconds;
/// below it, as seconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// A row eligible for sync.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRecord {
    pub id: String,
    /// Update instant in unix-epoch milliseconds.
    pub updated_at: i64,
    pub row: Row,
}

impl SyncRecord {
    /// Extracts a record from a table row.
    pub fn from_row(table: &str, row: Row) -> Result<Self> {
        let id = match row.get(ID_COLUMN) {
            Some(SqlValue::Text(s)) if !s.is_empty() => s.clone(),
            Some(SqlValue::Integer(v)) => v.to_string(),
            Some(other) => {
                return Err(StorageError::Serialization(format!(
                    "{table}: id must be text or integer, found {}",
                    other.type_name()
                )))
            }
            None => {
                return Err(StorageError::Serialization(format!(
                    "{table}: record is missing the id column"
                )))
            }
        };

        let updated_at = match row.get(UPDATED_AT_COLUMN) {
            Some(value) => parse_instant(value).ok_or_else(|| {
                StorageError::Serialization(format!(
                    "{table}/{id}: updated_at is not a comparable instant"
                ))
            })?,
            None => {
                return Err(StorageError::Serialization(format!(
                    "{table}/{id}: record is missing the updated_at column"
                )))
            }
        };

        Ok(Self {
            id,
            updated_at,
            row,
        })
    }
}

/// Normalizes an instant to unix-epoch milliseconds.
///
/// Accepted shapes: RFC 3339 text, integer seconds, integer milliseconds,
/// fractional seconds.
pub fn parse_instant(value: &SqlValue) -> Option<i64> {
    match value {
        SqlValue::Integer(v) => {
            if v.abs() >= MILLIS_THRESHOLD {
                Some(*v)
            } else {
                v.checked_mul(1000)
            }
        }
        SqlValue::Real(v) => {
            if v.abs() >= MILLIS_THRESHOLD as f64 {
                Some(*v as i64)
            } else {
                Some((*v * 1000.0) as i64)
            }
        }
        SqlValue::Text(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}
