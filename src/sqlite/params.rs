use rusqlite::types::{Value, ValueRef};

use crate::error::SqlBridgeError;
use crate::types::SqlValue;

/// Convert bind parameters into owned `rusqlite` values.
pub(super) fn to_sqlite_values(params: &[SqlValue]) -> Result<Vec<Value>, SqlBridgeError> {
    params.iter().map(to_sqlite_value).collect()
}

fn to_sqlite_value(value: &SqlValue) -> Result<Value, SqlBridgeError> {
    Ok(match value {
        SqlValue::Int(i) => Value::Integer(*i),
        SqlValue::Float(f) => Value::Real(*f),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
        SqlValue::Timestamp(ts) => Value::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        SqlValue::Null => Value::Null,
        SqlValue::Json(v) => Value::Text(v.to_string()),
        SqlValue::Blob(bytes) => Value::Blob(bytes.clone()),
        SqlValue::Array(_) => {
            return Err(SqlBridgeError::Execution(
                "a sequence value cannot be bound as a scalar parameter".into(),
            ));
        }
    })
}

pub(super) fn from_sqlite_value(value: ValueRef<'_>) -> Result<SqlValue, SqlBridgeError> {
    Ok(match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Int(i),
        ValueRef::Real(f) => SqlValue::Float(f),
        ValueRef::Text(bytes) => SqlValue::Text(
            std::str::from_utf8(bytes)
                .map_err(|e| SqlBridgeError::Execution(format!("non-UTF8 text column: {e}")))?
                .to_string(),
        ),
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    })
}
