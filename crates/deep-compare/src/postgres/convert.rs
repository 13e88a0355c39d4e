//! Conversion of PostgreSQL result rows into [`Row`]s.

use tokio_postgres::types::FromSql;
use tracing::debug;

use crate::core::{Row, SqlValue};

/// Convert every column of a result row by its declared type.
pub fn convert_row(row: &tokio_postgres::Row) -> Row {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        out.insert(column.name(), convert_value(row, idx, column.type_().name()));
    }
    out
}

/// Convert the first column of each row (single-column queries).
pub fn first_column_values(rows: &[tokio_postgres::Row]) -> Vec<SqlValue> {
    rows.iter()
        .filter(|row| !row.is_empty())
        .map(|row| convert_value(row, 0, row.columns()[0].type_().name()))
        .collect()
}

fn get<'a, T>(row: &'a tokio_postgres::Row, idx: usize) -> SqlValue
where
    T: FromSql<'a> + Into<SqlValue>,
{
    match row.try_get::<_, Option<T>>(idx) {
        Ok(value) => value.into(),
        Err(e) => {
            debug!("column {} could not be read: {}", idx, e);
            SqlValue::Null
        }
    }
}

/// Convert a single value given its PostgreSQL type name.
pub fn convert_value(row: &tokio_postgres::Row, idx: usize, data_type: &str) -> SqlValue {
    match data_type.to_lowercase().as_str() {
        "bool" | "boolean" => get::<bool>(row, idx),
        "int2" | "smallint" => get::<i16>(row, idx),
        "int4" | "integer" | "int" => get::<i32>(row, idx),
        "int8" | "bigint" => get::<i64>(row, idx),
        "float4" | "real" => get::<f32>(row, idx),
        "float8" | "double precision" => get::<f64>(row, idx),
        "numeric" | "decimal" => get::<rust_decimal::Decimal>(row, idx),
        "uuid" => get::<uuid::Uuid>(row, idx),
        "timestamp" | "timestamp without time zone" => get::<chrono::NaiveDateTime>(row, idx),
        "timestamptz" | "timestamp with time zone" => {
            get::<chrono::DateTime<chrono::FixedOffset>>(row, idx)
        }
        "date" => get::<chrono::NaiveDate>(row, idx),
        "time" | "time without time zone" => get::<chrono::NaiveTime>(row, idx),
        "bytea" => get::<Vec<u8>>(row, idx),
        "json" | "jsonb" => match row.try_get::<_, Option<serde_json::Value>>(idx) {
            Ok(Some(v)) => SqlValue::Text(v.to_string()),
            Ok(None) => SqlValue::Null,
            Err(e) => {
                debug!("json column {} could not be read: {}", idx, e);
                SqlValue::Null
            }
        },
        _ => get::<String>(row, idx),
    }
}

/// Quote a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Text form of values for `= ANY($1)` against a `::text` cast column.
pub fn text_params(values: &[SqlValue]) -> Vec<String> {
    values
        .iter()
        .filter(|v| !v.is_null())
        .map(|v| v.normalized().canonical())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_text_params_skip_nulls() {
        let params = text_params(&[
            SqlValue::Int(7),
            SqlValue::Null,
            SqlValue::Text("abc".into()),
            SqlValue::Bytes(b"xyz".to_vec()),
        ]);
        assert_eq!(params, vec!["7", "abc", "xyz"]);
    }
}
