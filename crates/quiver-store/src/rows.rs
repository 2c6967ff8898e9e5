//! Forgiving row decoding for the Any driver.
//!
//! The Any driver reports backend-native types: SQLite hands back 64-bit
//! integers where Postgres hands back 32-bit ones, and booleans arrive as
//! integers on SQLite. These helpers try the plausible decodings in order
//! so the storage crates stay backend-agnostic.

use serde_json::{Map, Number, Value};
use sqlx::any::{AnyRow, AnyTypeInfoKind};
use sqlx::{Column, Decode, Row, ValueRef};

/// Decode an integer column regardless of backend width.
pub fn get_i64(row: &AnyRow, col: &str) -> Result<i64, sqlx::Error> {
    row.try_get::<i64, _>(col)
        .or_else(|_| row.try_get::<i32, _>(col).map(i64::from))
}

/// Decode a boolean column stored as BOOLEAN or INTEGER 0/1.
pub fn get_bool(row: &AnyRow, col: &str) -> Result<bool, sqlx::Error> {
    if let Ok(b) = row.try_get::<bool, _>(col) {
        return Ok(b);
    }
    get_i64(row, col).map(|v| v != 0)
}

/// Decode a nullable text column.
///
/// Goes through the raw value instead of `try_get::<Option<String>, _>` —
/// the Any driver's `ValueRef::is_null` always reports `false` (a known
/// upstream quirk), so both `String` and `Option<String>` decode attempts
/// fail on an actually-null column. The value's type-info kind is the
/// reliable signal for nullness here.
pub fn get_opt_string(row: &AnyRow, col: &str) -> Result<Option<String>, sqlx::Error> {
    let raw = row.try_get_raw(col)?;
    if raw.type_info().kind() == AnyTypeInfoKind::Null {
        return Ok(None);
    }
    <String as Decode<sqlx::any::Any>>::decode(raw)
        .map(Some)
        .map_err(sqlx::Error::Decode)
}

/// Convert one column of a result row to JSON, trying the decodings the
/// Any driver can produce. Unknown types fall back to null.
pub fn column_to_json(row: &AnyRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Value::Number(Number::from(v));
    }
    if let Ok(v) = row.try_get::<i32, _>(index) {
        return Value::Number(Number::from(v));
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<bool, _>(index) {
        return Value::Bool(v);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    Value::Null
}

/// Normalize a result row to a map from column name to JSON value.
pub fn row_to_json(row: &AnyRow) -> Value {
    let mut map = Map::new();
    for (index, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), column_to_json(row, index));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::AnyPool;

    #[tokio::test]
    async fn rows_normalize_to_named_maps() {
        sqlx::any::install_default_drivers();
        let pool = AnyPool::connect("sqlite::memory:").await.unwrap();
        let row = sqlx::query("SELECT 1 AS n, 'hi' AS s, 2.5 AS f")
            .fetch_one(&pool)
            .await
            .unwrap();
        let json = row_to_json(&row);
        assert_eq!(json["n"], 1);
        assert_eq!(json["s"], "hi");
        assert_eq!(json["f"], 2.5);
    }
}
