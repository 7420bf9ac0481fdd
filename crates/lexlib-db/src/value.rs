//! Parameter values and named arguments.
//!
//! [`Value`] is the closed set of things the binder can send to a driver.
//! Timestamps are canonicalized on the way in (UTC, microsecond precision) so
//! every dialect stores and compares the same instant the same way.

use chrono::{DateTime, NaiveDateTime, SubsecRound, TimeZone, Utc};
use lexlib_types::{ColumnKind, Id};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqliteValue, ValueRef};

use crate::error::DbError;

/// Text form used for timestamps in parameters, literals and SQLite storage.
///
/// Fixed width, so stored values sort chronologically as text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// A single bindable value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// Unicode text.
    Text(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// Canonical UTC timestamp; see [`canonical_timestamp`].
    Timestamp(DateTime<Utc>),
    /// Global identifier.
    Id(Id),
}

/// Converts any timestamp to UTC truncated to microseconds.
pub fn canonical_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> DateTime<Utc> {
    at.with_timezone(&Utc).trunc_subsecs(6)
}

/// Formats a timestamp with [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses canonical timestamp text. The fractional part is optional so
/// values written by `CURRENT_TIMESTAMP` parse too.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text.trim(), "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| canonical_timestamp(&naive.and_utc()))
}

impl Value {
    /// Decodes a SQLite value read from a column declared as `kind`.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Decode` when the stored value cannot represent
    /// `kind`.
    pub fn from_sqlite(kind: ColumnKind, raw: ValueRef<'_>) -> Result<Self, DbError> {
        let mismatch = || DbError::Decode {
            kind,
            found: raw.data_type().to_string(),
        };

        let value = match (kind, raw) {
            (_, ValueRef::Null) => Self::Null,
            (ColumnKind::Text | ColumnKind::VarChar(_), ValueRef::Text(text)) => {
                Self::Text(String::from_utf8(text.to_vec()).map_err(|_| mismatch())?)
            }
            (ColumnKind::Bytes, ValueRef::Blob(bytes) | ValueRef::Text(bytes)) => {
                Self::Bytes(bytes.to_vec())
            }
            (ColumnKind::Bool, ValueRef::Integer(n)) => Self::Bool(n != 0),
            (ColumnKind::Int, ValueRef::Integer(n)) => Self::Int(n),
            (ColumnKind::DateTime, ValueRef::Text(text)) => {
                let text = std::str::from_utf8(text).map_err(|_| mismatch())?;
                Self::Timestamp(parse_timestamp(text).ok_or_else(mismatch)?)
            }
            (ColumnKind::Id, ValueRef::Text(text)) => {
                let text = std::str::from_utf8(text).map_err(|_| mismatch())?;
                Self::Id(text.parse().map_err(|_| mismatch())?)
            }
            _ => return Err(mismatch()),
        };
        Ok(value)
    }

    /// Returns the integer payload, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the text payload, if this is `Text`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let output = match self {
            Self::Null => ToSqlOutput::Owned(SqliteValue::Null),
            Self::Bool(b) => ToSqlOutput::Owned(SqliteValue::Integer(i64::from(*b))),
            Self::Int(n) => ToSqlOutput::Owned(SqliteValue::Integer(*n)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Self::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Self::Timestamp(at) => ToSqlOutput::Owned(SqliteValue::Text(format_timestamp(at))),
            Self::Id(id) => ToSqlOutput::Owned(SqliteValue::Text(id.to_string())),
        };
        Ok(output)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Value {
    fn from(value: DateTime<Tz>) -> Self {
        Self::Timestamp(canonical_timestamp(&value))
    }
}

impl From<Id> for Value {
    fn from(value: Id) -> Self {
        Self::Id(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// The payload of a named argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// Bound to an `arg` marker.
    Scalar(Value),
    /// Bound to an `args` list-expansion marker.
    List(Vec<Value>),
}

/// A named argument supplied at render time.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    name: String,
    value: ArgValue,
}

impl Arg {
    /// A scalar argument.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: ArgValue::Scalar(value.into()),
        }
    }

    /// A collection argument for list expansion, kept in iteration order.
    pub fn list<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            name: name.into(),
            value: ArgValue::List(values.into_iter().map(Into::into).collect()),
        }
    }

    /// Argument name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Argument payload.
    pub fn value(&self) -> &ArgValue {
        &self.value
    }
}

/// Shorthand for [`Arg::new`].
pub fn arg(name: impl Into<String>, value: impl Into<Value>) -> Arg {
    Arg::new(name, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn timestamps_are_canonicalized_to_utc_micros() {
        let offset = FixedOffset::east_opt(5 * 3600).expect("valid offset");
        let local = offset
            .with_ymd_and_hms(2020, 1, 1, 5, 0, 0)
            .single()
            .expect("valid date")
            + chrono::Duration::nanoseconds(123_456_789);

        let Value::Timestamp(at) = Value::from(local) else {
            panic!("expected a timestamp");
        };
        assert_eq!(format_timestamp(&at), "2020-01-01 00:00:00.123456");
        assert_eq!(at.timezone(), Utc);
    }

    #[test]
    fn timestamp_text_parses_with_or_without_fraction() {
        let with = parse_timestamp("2021-06-01 10:20:30.000500").expect("should parse");
        assert_eq!(format_timestamp(&with), "2021-06-01 10:20:30.000500");
        let without = parse_timestamp("2021-06-01 10:20:30").expect("should parse");
        assert_eq!(format_timestamp(&without), "2021-06-01 10:20:30.000000");
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn options_map_to_null() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
    }

    #[test]
    fn decoding_rejects_mismatched_storage() {
        let err = Value::from_sqlite(ColumnKind::Int, ValueRef::Text(b"12"))
            .expect_err("text is not an integer");
        assert!(matches!(err, DbError::Decode { kind: ColumnKind::Int, .. }));

        assert_eq!(
            Value::from_sqlite(ColumnKind::Bool, ValueRef::Integer(1)).expect("should decode"),
            Value::Bool(true)
        );
        assert_eq!(
            Value::from_sqlite(ColumnKind::DateTime, ValueRef::Null).expect("should decode"),
            Value::Null
        );
    }

    #[test]
    fn list_arguments_keep_order() {
        let arg = Arg::list("ids", [3_i64, 1, 2]);
        assert_eq!(arg.name(), "ids");
        assert_eq!(
            arg.value(),
            &ArgValue::List(vec![Value::Int(3), Value::Int(1), Value::Int(2)])
        );
    }
}
