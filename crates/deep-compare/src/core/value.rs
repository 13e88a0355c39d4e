//! SQL value types for database-agnostic row comparison.
//!
//! Rows fetched from either database are converted into [`SqlValue`] so that
//! equality and canonical formatting are defined once, per variant, instead of
//! relying on whatever the driver hands back.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// Dynamically typed scalar held in a [`Row`](super::Row).
///
/// Equality is structural and typed: `Int(1)` and `Text("1")` are different
/// values even though they format identically.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// Any integer column (smallint, int, bigint).
    Int(i64),

    /// Floating point (real, double precision).
    Float(f64),

    /// Text/string data.
    Text(String),

    /// Binary data (bytea).
    Bytes(Vec<u8>),

    /// UUID value.
    Uuid(Uuid),

    /// Decimal value with arbitrary precision.
    Decimal(Decimal),

    /// Timestamp without timezone.
    Timestamp(NaiveDateTime),

    /// Timestamp with timezone offset.
    TimestampTz(DateTime<FixedOffset>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Canonical `%v`-style string used for matching keys and value partitioning.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// Key that distinguishes values by type as well as content.
    ///
    /// Used to deduplicate value sets where `Int(1)` and `Text("1")` must stay apart.
    #[must_use]
    pub fn typed_key(&self) -> String {
        format!("{}:{}", self.type_tag(), self)
    }

    /// Short name of the variant.
    #[must_use]
    pub fn type_tag(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::Uuid(_) => "uuid",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::TimestampTz(_) => "timestamptz",
            SqlValue::Date(_) => "date",
            SqlValue::Time(_) => "time",
        }
    }

    /// Copy of this value with bytes decoded to text, for readable output.
    ///
    /// Never use the result for equality checks.
    #[must_use]
    pub fn normalized(&self) -> SqlValue {
        match self {
            SqlValue::Bytes(b) => SqlValue::Text(String::from_utf8_lossy(b).into_owned()),
            other => other.clone(),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "<nil>"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "{}", v),
            SqlValue::Bytes(v) => write!(f, "{}", String::from_utf8_lossy(v)),
            SqlValue::Uuid(v) => write!(f, "{}", v),
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
            SqlValue::TimestampTz(v) => write!(f, "{}", v.to_rfc3339()),
            SqlValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            SqlValue::Time(v) => write!(f, "{}", v.format("%H:%M:%S%.f")),
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::Bool(v) => serializer.serialize_bool(*v),
            SqlValue::Int(v) => serializer.serialize_i64(*v),
            SqlValue::Float(v) => serializer.serialize_f64(*v),
            SqlValue::Text(v) => serializer.serialize_str(v),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value;
        match v {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Int(i),
                None => SqlValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => SqlValue::Text(s),
            other => SqlValue::Text(other.to_string()),
        }
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        SqlValue::Float(f64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl From<DateTime<FixedOffset>> for SqlValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        SqlValue::TimestampTz(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(v: NaiveTime) -> Self {
        SqlValue::Time(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_formatting() {
        assert_eq!(SqlValue::Int(10).canonical(), "10");
        assert_eq!(SqlValue::Float(10.5).canonical(), "10.5");
        assert_eq!(SqlValue::Bool(true).canonical(), "true");
        assert_eq!(SqlValue::Null.canonical(), "<nil>");
        assert_eq!(SqlValue::Bytes(b"abc".to_vec()).canonical(), "abc");
    }

    #[test]
    fn test_typed_equality() {
        assert_ne!(SqlValue::Int(1), SqlValue::Text("1".into()));
        assert_eq!(SqlValue::Int(1).canonical(), SqlValue::Text("1".into()).canonical());
        assert_ne!(
            SqlValue::Int(1).typed_key(),
            SqlValue::Text("1".into()).typed_key()
        );
        assert_ne!(SqlValue::Bytes(b"x".to_vec()), SqlValue::Text("x".into()));
    }

    #[test]
    fn test_normalized_decodes_bytes_only() {
        let bytes = SqlValue::Bytes(b"hello".to_vec());
        assert_eq!(bytes.normalized(), SqlValue::Text("hello".into()));
        assert_eq!(SqlValue::Int(3).normalized(), SqlValue::Int(3));
    }

    #[test]
    fn test_from_json() {
        assert_eq!(SqlValue::from(serde_json::json!(7)), SqlValue::Int(7));
        assert_eq!(SqlValue::from(serde_json::json!(1.5)), SqlValue::Float(1.5));
        assert_eq!(SqlValue::from(serde_json::json!(null)), SqlValue::Null);
        assert_eq!(
            SqlValue::from(serde_json::json!("a")),
            SqlValue::Text("a".into())
        );
    }

    #[test]
    fn test_serialize_to_json() {
        let json = serde_json::to_value(SqlValue::Bytes(b"raw".to_vec())).unwrap();
        assert_eq!(json, serde_json::json!("raw"));
        let json = serde_json::to_value(SqlValue::Null).unwrap();
        assert!(json.is_null());
    }

    #[test]
    fn test_from_option() {
        assert_eq!(SqlValue::from(None::<i32>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(4i32)), SqlValue::Int(4));
    }
}
