//! Tagged scalar values moved between entities, statements and rows.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};

use crate::error::MapperError;

/// One scalar read from, or written to, an entity field or statement
/// parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Int(i32),
    Long(i64),
    Char(char),
    Text(String),
    Bool(bool),
    Instant(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Converts this value into a field type, naming `field` on failure.
    pub fn cast<T: FromValue>(self, field: &str) -> Result<T, MapperError> {
        T::from_value(self, field)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Char(c) => write!(f, "{c}"),
            Self::Text(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Instant(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

pub(crate) fn instant_from_millis(field: &str, millis: i64) -> Result<DateTime<Utc>, MapperError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| MapperError::conversion(field, format!("timestamp {millis} out of range")))
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(SqlValue::Null),
            Self::Int(v) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*v))),
            Self::Long(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            Self::Char(c) => ToSqlOutput::Owned(SqlValue::Text(c.to_string())),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Self::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Self::Instant(t) => ToSqlOutput::Owned(SqlValue::Integer(t.timestamp_millis())),
        })
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Self::Char(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Instant(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Field types that can be assigned from a [`Value`].
///
/// Non-nullable numeric, boolean and text fields read a null as the zero
/// value, the way JDBC getters do. A null `char` or instant is an error.
pub trait FromValue: Sized {
    fn from_value(value: Value, field: &str) -> Result<Self, MapperError>;
}

fn mismatch(field: &str, expected: &str, value: &Value) -> MapperError {
    MapperError::conversion(field, format!("expected {expected}, got {value:?}"))
}

impl FromValue for i32 {
    fn from_value(value: Value, field: &str) -> Result<Self, MapperError> {
        match value {
            Value::Int(v) => Ok(v),
            Value::Long(v) => i32::try_from(v)
                .map_err(|_| MapperError::conversion(field, format!("{v} out of range"))),
            Value::Null => Ok(0),
            other => Err(mismatch(field, "integer", &other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value, field: &str) -> Result<Self, MapperError> {
        match value {
            Value::Int(v) => Ok(i64::from(v)),
            Value::Long(v) => Ok(v),
            Value::Null => Ok(0),
            other => Err(mismatch(field, "integer", &other)),
        }
    }
}

impl FromValue for char {
    fn from_value(value: Value, field: &str) -> Result<Self, MapperError> {
        match value {
            Value::Char(c) => Ok(c),
            Value::Int(v) => u32::try_from(v)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| MapperError::conversion(field, format!("invalid code point {v}"))),
            Value::Null => Err(MapperError::Null {
                field: field.to_string(),
            }),
            other => Err(mismatch(field, "character", &other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value, field: &str) -> Result<Self, MapperError> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Char(c) => Ok(c.to_string()),
            Value::Null => Ok(String::new()),
            other => Err(mismatch(field, "text", &other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value, field: &str) -> Result<Self, MapperError> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(v) => Ok(v != 0),
            Value::Long(v) => Ok(v != 0),
            Value::Null => Ok(false),
            other => Err(mismatch(field, "boolean", &other)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value, field: &str) -> Result<Self, MapperError> {
        match value {
            Value::Instant(t) => Ok(t),
            Value::Long(ms) => instant_from_millis(field, ms),
            Value::Null => Err(MapperError::Null {
                field: field.to_string(),
            }),
            other => Err(mismatch(field, "instant", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value, field: &str) -> Result<Self, MapperError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other, field).map(Some),
        }
    }
}
