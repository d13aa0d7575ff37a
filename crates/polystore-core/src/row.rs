//! Materialized result rows.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use polystore_common::{Result, StorageError};

use crate::value::SqlValue;

/// A single result row: column name to value, order-insignificant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: HashMap<String, SqlValue>,
}

impl Row {
    pub fn new(columns: HashMap<String, SqlValue>) -> Self {
        Self { columns }
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        self.columns.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns.get(column)
    }

    /// Text value of a column, if present and textual.
    pub fn text(&self, column: &str) -> Option<&str> {
        self.columns.get(column).and_then(SqlValue::as_text)
    }

    pub fn integer(&self, column: &str) -> Option<i64> {
        self.columns.get(column).and_then(SqlValue::as_integer)
    }

    pub fn real(&self, column: &str) -> Option<f64> {
        self.columns.get(column).and_then(SqlValue::as_real)
    }

    pub fn blob(&self, column: &str) -> Option<&[u8]> {
        self.columns.get(column).and_then(SqlValue::as_blob)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn columns(&self) -> &HashMap<String, SqlValue> {
        &self.columns
    }

    pub fn into_columns(self) -> HashMap<String, SqlValue> {
        self.columns
    }

    /// Converts the row into a JSON object.
    pub fn to_json(&self) -> JsonValue {
        let mut map = serde_json::Map::with_capacity(self.columns.len());
        for (name, value) in &self.columns {
            map.insert(name.clone(), value.to_json());
        }
        JsonValue::Object(map)
    }

    /// Reconstructs a row from a JSON object.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| StorageError::Serialization("row must be a JSON object".to_string()))?;
        let mut columns = HashMap::with_capacity(object.len());
        for (name, value) in object {
            columns.insert(name.clone(), SqlValue::from_json(value)?);
        }
        Ok(Self { columns })
    }
}

impl FromIterator<(String, SqlValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Row {
        let mut row = Row::default();
        row.insert("id", 1i64);
        row.insert("name", "ada");
        row.insert("score", 9.5);
        row.insert("payload", vec![1u8, 2, 3]);
        row.insert("deleted_at", SqlValue::Null);
        row
    }

    #[test]
    fn test_typed_accessors() {
        let row = sample();
        assert_eq!(row.integer("id"), Some(1));
        assert_eq!(row.text("name"), Some("ada"));
        assert_eq!(row.real("score"), Some(9.5));
        assert_eq!(row.blob("payload"), Some(&[1u8, 2, 3][..]));
        assert_eq!(row.get("deleted_at"), Some(&SqlValue::Null));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_json_round_trip() {
        let row = sample();
        let restored = Row::from_json(&row.to_json()).unwrap();
        assert_eq!(restored, row);
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(Row::from_json(&JsonValue::Array(vec![])).is_err());
    }
}
