//! Row materialization from driver rows.
//!
//! Driver column types map into the portable scalar model: integers widen
//! to 64-bit, booleans become 0/1, temporal and structured types carry as
//! text. NUMERIC stays textual so precision survives the trip.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{Column, Row as SqlxRow, TypeInfo};
use tracing::warn;
use uuid::Uuid;

use polystore_common::Result;
use polystore_core::{Row, SqlValue};

/// Converts one driver row into the portable row model.
pub(crate) fn row_from_pg(row: &PgRow) -> Result<Row> {
    let mut out = Row::default();
    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        out.insert(name, column_value(row, i, column.type_info().name())?);
    }
    Ok(out)
}

fn column_value(row: &PgRow, index: usize, type_name: &str) -> Result<SqlValue> {
    let value = match type_name {
        "BOOL" => row
            .try_get::<Option<bool>, _>(index)?
            .map(|v| SqlValue::Integer(i64::from(v))),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)?
            .map(|v| SqlValue::Integer(i64::from(v))),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)?
            .map(|v| SqlValue::Integer(i64::from(v))),
        "INT8" => row
            .try_get::<Option<i64>, _>(index)?
            .map(SqlValue::Integer),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)?
            .map(|v| SqlValue::Real(f64::from(v))),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(index)?
            .map(SqlValue::Real),
        // Textual NUMERIC keeps full precision.
        "NUMERIC" => row
            .try_get::<Option<Decimal>, _>(index)?
            .map(|v| SqlValue::Text(v.to_string())),
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" => row
            .try_get::<Option<String>, _>(index)?
            .map(SqlValue::Text),
        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)?
            .map(SqlValue::Blob),
        "UUID" => row
            .try_get::<Option<Uuid>, _>(index)?
            .map(|v| SqlValue::Text(v.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(|v| SqlValue::Text(v.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(|v| SqlValue::Text(v.to_string())),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)?
            .map(|v| SqlValue::Text(v.to_string())),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(index)?
            .map(|v| SqlValue::Text(v.to_string())),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(index)?
            .map(|v| SqlValue::Text(v.to_string())),
        other => {
            // Arrays and exotic types: try text, otherwise null out with a
            // diagnostic rather than failing the whole row.
            match row.try_get::<Option<String>, _>(index) {
                Ok(v) => v.map(SqlValue::Text),
                Err(_) => {
                    warn!(type_name = other, index, "unmapped column type, returning null");
                    Some(SqlValue::Null)
                }
            }
        }
    };
    Ok(value.unwrap_or(SqlValue::Null))
}
