//! Conversion of JSON record values into typed PostgreSQL parameters.
//!
//! The target type is the actual type of the destination column, read from
//! `information_schema`, so tables created by hand or by older versions are
//! written correctly too. Values that do not fit their column become NULL;
//! they are still present in the `raw_data` payload.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tokio_postgres::types::ToSql;

/// Column types the sink knows how to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    SmallInt,
    Integer,
    BigInt,
    Double,
    Numeric,
    Date,
    Timestamp,
    TimestampTz,
    Boolean,
    Text,
    Json,
    Jsonb,
}

impl ColumnType {
    /// Parse `information_schema.columns.data_type`.
    ///
    /// Returns None for types the sink cannot bind; such columns are left
    /// untouched by upserts.
    pub fn from_data_type(data_type: &str) -> Option<Self> {
        let t = match data_type {
            "smallint" => Self::SmallInt,
            "integer" => Self::Integer,
            "bigint" => Self::BigInt,
            "double precision" | "real" => Self::Double,
            "numeric" => Self::Numeric,
            "date" => Self::Date,
            "timestamp without time zone" => Self::Timestamp,
            "timestamp with time zone" => Self::TimestampTz,
            "boolean" => Self::Boolean,
            "text" | "character varying" | "character" => Self::Text,
            "json" => Self::Json,
            "jsonb" => Self::Jsonb,
            _ => return None,
        };
        Some(t)
    }
}

/// PostgreSQL value wrapper for type-safe parameter binding.
#[derive(Debug, Clone, PartialEq)]
pub enum PostgreSQLValue {
    /// Typed NULL, so the parameter still matches its column
    Null(ColumnType),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Decimal(Decimal),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Bool(bool),
    Text(String),
    Json(Value),
}

impl PostgreSQLValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    /// Convert a JSON value for a column of type `column_type`.
    ///
    /// Absent, null and unconvertible values yield a typed NULL.
    pub fn from_json(value: Option<&Value>, column_type: ColumnType) -> Self {
        match value {
            None | Some(Value::Null) => Self::Null(column_type),
            Some(v) => convert(v, column_type).unwrap_or(Self::Null(column_type)),
        }
    }

    /// Box into a ToSql trait object.
    pub fn into_boxed(self) -> Box<dyn ToSql + Sync + Send> {
        match self {
            Self::Null(t) => null_of(t),
            Self::Int16(i) => Box::new(i),
            Self::Int32(i) => Box::new(i),
            Self::Int64(i) => Box::new(i),
            Self::Float64(f) => Box::new(f),
            Self::Decimal(d) => Box::new(d),
            Self::Date(d) => Box::new(d),
            Self::Timestamp(ts) => Box::new(ts),
            Self::TimestampTz(ts) => Box::new(ts),
            Self::Bool(b) => Box::new(b),
            Self::Text(s) => Box::new(s),
            Self::Json(j) => Box::new(j),
        }
    }
}

fn null_of(column_type: ColumnType) -> Box<dyn ToSql + Sync + Send> {
    match column_type {
        ColumnType::SmallInt => Box::new(None::<i16>),
        ColumnType::Integer => Box::new(None::<i32>),
        ColumnType::BigInt => Box::new(None::<i64>),
        ColumnType::Double => Box::new(None::<f64>),
        ColumnType::Numeric => Box::new(None::<Decimal>),
        ColumnType::Date => Box::new(None::<NaiveDate>),
        ColumnType::Timestamp => Box::new(None::<NaiveDateTime>),
        ColumnType::TimestampTz => Box::new(None::<DateTime<Utc>>),
        ColumnType::Boolean => Box::new(None::<bool>),
        ColumnType::Text => Box::new(None::<String>),
        ColumnType::Json | ColumnType::Jsonb => Box::new(None::<Value>),
    }
}

fn convert(value: &Value, column_type: ColumnType) -> Option<PostgreSQLValue> {
    match column_type {
        ColumnType::SmallInt => as_i64(value)
            .and_then(|i| i16::try_from(i).ok())
            .map(PostgreSQLValue::Int16),
        ColumnType::Integer => as_i64(value)
            .and_then(|i| i32::try_from(i).ok())
            .map(PostgreSQLValue::Int32),
        ColumnType::BigInt => as_i64(value).map(PostgreSQLValue::Int64),
        ColumnType::Double => match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .map(PostgreSQLValue::Float64),
        ColumnType::Numeric => as_decimal(value).map(PostgreSQLValue::Decimal),
        ColumnType::Date => value.as_str().and_then(parse_date).map(PostgreSQLValue::Date),
        ColumnType::Timestamp => value
            .as_str()
            .and_then(parse_timestamp)
            .map(|ts| PostgreSQLValue::Timestamp(ts.naive_utc())),
        ColumnType::TimestampTz => value
            .as_str()
            .and_then(parse_timestamp)
            .map(PostgreSQLValue::TimestampTz),
        ColumnType::Boolean => match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
        .map(PostgreSQLValue::Bool),
        ColumnType::Text => Some(PostgreSQLValue::Text(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        ColumnType::Json | ColumnType::Jsonb => Some(PostgreSQLValue::Json(value.clone())),
    }
}

/// Integer from a JSON number or an integer string.
pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Dates arrive as `2024-01-15` or with an offset, `2024-01-15+01:00`.
fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    s.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

/// RFC 3339 timestamps; offset-less timestamps are taken as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|ts| ts.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn conv(v: Value, t: ColumnType) -> PostgreSQLValue {
        PostgreSQLValue::from_json(Some(&v), t)
    }

    #[test]
    fn test_column_types() {
        assert_eq!(ColumnType::from_data_type("bigint"), Some(ColumnType::BigInt));
        assert_eq!(
            ColumnType::from_data_type("timestamp with time zone"),
            Some(ColumnType::TimestampTz)
        );
        assert_eq!(ColumnType::from_data_type("character varying"), Some(ColumnType::Text));
        assert_eq!(ColumnType::from_data_type("tsvector"), None);
    }

    #[test]
    fn test_integers_from_numbers_and_strings() {
        assert_eq!(conv(json!(42), ColumnType::BigInt), PostgreSQLValue::Int64(42));
        assert_eq!(conv(json!("42"), ColumnType::BigInt), PostgreSQLValue::Int64(42));
        assert_eq!(conv(json!("x"), ColumnType::BigInt), PostgreSQLValue::Null(ColumnType::BigInt));
        assert_eq!(
            conv(json!(70000), ColumnType::SmallInt),
            PostgreSQLValue::Null(ColumnType::SmallInt)
        );
    }

    #[test]
    fn test_numeric() {
        assert_eq!(
            conv(json!("1234.50"), ColumnType::Numeric),
            PostgreSQLValue::Decimal(Decimal::from_str("1234.50").unwrap())
        );
        assert_eq!(
            conv(json!(2.5), ColumnType::Numeric),
            PostgreSQLValue::Decimal(Decimal::from_str("2.5").unwrap())
        );
    }

    #[test]
    fn test_date_with_offset_suffix() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(conv(json!("2024-01-15+01:00"), ColumnType::Date), PostgreSQLValue::Date(expected));
        assert_eq!(conv(json!("2024-01-15"), ColumnType::Date), PostgreSQLValue::Date(expected));
        assert!(conv(json!("15.1.2024"), ColumnType::Date).is_null());
    }

    #[test]
    fn test_timestamps() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap();
        assert_eq!(
            conv(json!("2024-01-15T10:30:00+01:00"), ColumnType::TimestampTz),
            PostgreSQLValue::TimestampTz(expected)
        );
        assert_eq!(
            conv(json!("2024-01-15T09:30:00.000+0000"), ColumnType::TimestampTz),
            PostgreSQLValue::TimestampTz(expected)
        );
        assert_eq!(
            conv(json!("2024-01-15T09:30:00"), ColumnType::TimestampTz),
            PostgreSQLValue::TimestampTz(expected)
        );
    }

    #[test]
    fn test_booleans() {
        assert_eq!(conv(json!("true"), ColumnType::Boolean), PostgreSQLValue::Bool(true));
        assert_eq!(conv(json!(false), ColumnType::Boolean), PostgreSQLValue::Bool(false));
        assert!(conv(json!("maybe"), ColumnType::Boolean).is_null());
    }

    #[test]
    fn test_text_keeps_strings_and_serializes_the_rest() {
        assert_eq!(conv(json!("code:ABC"), ColumnType::Text), PostgreSQLValue::Text("code:ABC".into()));
        assert_eq!(conv(json!(12), ColumnType::Text), PostgreSQLValue::Text("12".into()));
        assert_eq!(
            conv(json!({"a": 1}), ColumnType::Text),
            PostgreSQLValue::Text("{\"a\":1}".into())
        );
    }

    #[test]
    fn test_missing_and_null_are_typed_null() {
        assert_eq!(
            PostgreSQLValue::from_json(None, ColumnType::Date),
            PostgreSQLValue::Null(ColumnType::Date)
        );
        assert_eq!(
            PostgreSQLValue::from_json(Some(&Value::Null), ColumnType::Text),
            PostgreSQLValue::Null(ColumnType::Text)
        );
    }
}
