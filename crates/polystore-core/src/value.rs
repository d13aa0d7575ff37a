//! Scalar value model shared by every backend.
//!
//! Backends translate their native column types into [`SqlValue`] when
//! materializing rows and back again when binding parameters. The model is
//! deliberately small: null, 64-bit integer, double, text, and opaque bytes,
//! which is the intersection every supported engine can represent.

use serde_json::Value as JsonValue;

use polystore_common::{Result, StorageError};

/// Key used when round-tripping binary payloads through JSON documents.
const BLOB_TAG: &str = "__blob__";

/// A scalar database value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL
    Null,
    /// 64-bit signed integer
    Integer(i64),
    /// Double-precision float
    Real(f64),
    /// Text
    Text(String),
    /// Opaque byte sequence
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Returns a short type label, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Integer(_) => "integer",
            SqlValue::Real(_) => "real",
            SqlValue::Text(_) => "text",
            SqlValue::Blob(_) => "blob",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            SqlValue::Real(v) => Some(*v),
            SqlValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            SqlValue::Blob(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Converts into a JSON value.
    ///
    /// Non-finite floats have no JSON representation and collapse to null.
    /// Blobs are wrapped in a tagged object so [`SqlValue::from_json`] can
    /// reconstruct them.
    pub fn to_json(&self) -> JsonValue {
        match self {
            SqlValue::Null => JsonValue::Null,
            SqlValue::Integer(v) => JsonValue::from(*v),
            SqlValue::Real(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            SqlValue::Text(v) => JsonValue::String(v.clone()),
            SqlValue::Blob(bytes) => {
                let payload: Vec<JsonValue> =
                    bytes.iter().map(|b| JsonValue::from(*b as i64)).collect();
                let mut map = serde_json::Map::with_capacity(1);
                map.insert(BLOB_TAG.to_string(), JsonValue::Array(payload));
                JsonValue::Object(map)
            }
        }
    }

    /// Reconstructs a value from its JSON representation.
    pub fn from_json(value: &JsonValue) -> Result<SqlValue> {
        match value {
            JsonValue::Null => Ok(SqlValue::Null),
            JsonValue::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(SqlValue::Integer(i))
                } else if n.as_u64().is_some() {
                    // Beyond signed 64-bit precision: preserve digits as text.
                    Ok(SqlValue::Text(n.to_string()))
                } else if let Some(f) = n.as_f64() {
                    Ok(SqlValue::Real(f))
                } else {
                    Ok(SqlValue::Text(n.to_string()))
                }
            }
            JsonValue::String(s) => Ok(SqlValue::Text(s.clone())),
            JsonValue::Object(map) => {
                if map.len() == 1 {
                    if let Some(JsonValue::Array(items)) = map.get(BLOB_TAG) {
                        let mut bytes = Vec::with_capacity(items.len());
                        for item in items {
                            let b = item.as_u64().filter(|b| *b <= u64::from(u8::MAX)).ok_or_else(
                                || {
                                    StorageError::Serialization(
                                        "blob payload byte out of range".to_string(),
                                    )
                                },
                            )?;
                            bytes.push(b as u8);
                        }
                        return Ok(SqlValue::Blob(bytes));
                    }
                }
                Ok(SqlValue::Text(value.to_string()))
            }
            JsonValue::Array(_) => Ok(SqlValue::Text(value.to_string())),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Integer(i64::from(v))
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        SqlValue::Integer(i64::from(v))
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Integer(i64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

impl From<&[u8]> for SqlValue {
    fn from(v: &[u8]) -> Self {
        SqlValue::Blob(v.to_vec())
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => SqlValue::Null,
        }
    }
}

/// A backend-assigned surrogate key.
///
/// Engines that return 64-bit ids stay numeric; values that exceed the
/// signed 64-bit range are carried as text rather than silently truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowId {
    Int(i64),
    Text(String),
}

impl RowId {
    /// Normalizes an unsigned id, falling back to text past `i64::MAX`.
    pub fn from_u64(v: u64) -> Self {
        if v <= i64::MAX as u64 {
            RowId::Int(v as i64)
        } else {
            RowId::Text(v.to_string())
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RowId::Int(v) => Some(*v),
            RowId::Text(s) => s.parse().ok(),
        }
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowId::Int(v) => write!(f, "{v}"),
            RowId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RowId {
    fn from(v: i64) -> Self {
        RowId::Int(v)
    }
}

/// Outcome of a single mutating statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunResult {
    /// Rows affected by the last mutating statement.
    pub changes: u64,
    /// Backend-assigned surrogate key, when the engine produces one.
    pub last_insert_row_id: Option<RowId>,
}

impl RunResult {
    pub fn new(changes: u64, last_insert_row_id: Option<RowId>) -> Self {
        Self {
            changes,
            last_insert_row_id,
        }
    }
}
