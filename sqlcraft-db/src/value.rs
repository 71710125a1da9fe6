//! SQLite value -> JSON conversion

use rusqlite::types::Value as SqlValue;
use serde_json::{json, Value};

pub(crate) fn json_value_from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(value) => json!(value),
        SqlValue::Real(value) => json!(value),
        SqlValue::Text(value) => json!(value),
        SqlValue::Blob(value) => json!(hex::encode(value)),
    }
}

/// Render a cell the way it is shown to the model: bare text, `NULL` for null
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
