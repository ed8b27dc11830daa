use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Values that cross the middleware boundary: query parameters going in and
/// row cells coming back.
///
/// One enum shared by every backend so the binder, the pool helpers, and the
/// adapters never branch on driver-specific types:
/// ```rust
/// use sql_bridge::SqlValue;
///
/// let params = vec![
///     SqlValue::Int(1),
///     SqlValue::Text("alice".into()),
///     SqlValue::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    Json(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
    /// A fixed-length sequence, consumed by the `values` / `values_list`
    /// template directives. Adapters reject it as a scalar bind value.
    Array(Vec<SqlValue>),
}

impl SqlValue {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        if let SqlValue::Int(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let SqlValue::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let SqlValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(value) => Some(*value),
            SqlValue::Int(0) => Some(false),
            SqlValue::Int(1) => Some(true),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            SqlValue::Timestamp(value) => Some(*value),
            SqlValue::Text(s) => {
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                    return Some(dt);
                }
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S.%3f").ok()
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let SqlValue::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[SqlValue]> {
        if let SqlValue::Array(items) = self {
            Some(items)
        } else {
            None
        }
    }

    /// Render this value as SQL literal text for string contexts (identifier
    /// and type directives resolve their selector to text through this).
    /// `None` for values with no sensible text form.
    #[must_use]
    pub(crate) fn to_plain_string(&self) -> Option<String> {
        Some(match self {
            SqlValue::Text(s) => s.clone(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::Bool(b) => b.to_string(),
            SqlValue::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Json(v) => v.to_string(),
            SqlValue::Blob(_) | SqlValue::Array(_) => return None,
        })
    }
}

impl From<JsonValue> for SqlValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => SqlValue::Null,
            JsonValue::Bool(b) => SqlValue::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Int(i)
                } else {
                    SqlValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => SqlValue::Text(s),
            other => SqlValue::Json(other),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

/// The parameter source handed to [`bind`](crate::binder::bind).
///
/// Positional, named, and no-params modes are mutually exclusive per call:
/// an indexed selector against a `Named` source (or the reverse) is a
/// [`ParamMode`](crate::SqlBridgeError::ParamMode) error, and `None` only
/// satisfies templates that consume no parameters at all.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum BindParams {
    /// No parameter source supplied.
    #[default]
    None,
    /// Positional parameters, consumed left-to-right by `{}` / `{N}` fields.
    Positional(Vec<SqlValue>),
    /// Named parameters, looked up by `{name}` fields.
    Named(BTreeMap<String, SqlValue>),
}

impl From<Vec<SqlValue>> for BindParams {
    fn from(values: Vec<SqlValue>) -> Self {
        BindParams::Positional(values)
    }
}

impl From<BTreeMap<String, SqlValue>> for BindParams {
    fn from(map: BTreeMap<String, SqlValue>) -> Self {
        BindParams::Named(map)
    }
}

impl<const N: usize> From<[(&str, SqlValue); N]> for BindParams {
    fn from(pairs: [(&str, SqlValue); N]) -> Self {
        BindParams::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

/// The backend families this middleware knows how to render for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum DriverKind {
    /// `SQLite` and compatible embedded engines
    Sqlite,
    /// `PostgreSQL`
    Postgres,
    /// `MySQL` / MariaDB
    Mysql,
    /// SQL Server
    Mssql,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_round_trip_through_serde() {
        let values = vec![
            SqlValue::Int(7),
            SqlValue::Text("x".into()),
            SqlValue::Bool(true),
            SqlValue::Null,
            SqlValue::Blob(vec![1, 2]),
            SqlValue::Array(vec![SqlValue::Float(1.5)]),
        ];
        let json = serde_json::to_string(&values).unwrap();
        let back: Vec<SqlValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn driver_kind_serializes_by_name() {
        let json = serde_json::to_string(&DriverKind::Postgres).unwrap();
        assert_eq!(json, "\"Postgres\"");
        assert_eq!(
            serde_json::from_str::<DriverKind>(&json).unwrap(),
            DriverKind::Postgres
        );
    }
}
