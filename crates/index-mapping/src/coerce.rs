//! Column value → index field value coercions.

use crate::mapping::{FieldMapping, FieldType};
use serde_json::Value;
use sync_core::UniversalValue;

/// Reason a non-null value could not be represented as the declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionFailure {
    pub expected: FieldType,
    pub found: String,
}

/// Coerce one column value into the JSON value written to the index.
///
/// NULL becomes the field's configured default, falling back to the default
/// of its declared type.
pub fn coerce(value: &UniversalValue, field: &FieldMapping) -> Result<Value, CoercionFailure> {
    if value.is_null() {
        return Ok(field
            .default
            .clone()
            .unwrap_or_else(|| field.field_type.null_default()));
    }

    let fail = || CoercionFailure {
        expected: field.field_type,
        found: value.to_string(),
    };

    match field.field_type {
        FieldType::Text | FieldType::Keyword => Ok(Value::String(text(value))),
        FieldType::Long => match value {
            UniversalValue::UInt64(u) => Ok(Value::from(*u)),
            UniversalValue::Float64(f) if f.is_finite() => Ok(Value::from(f.trunc() as i64)),
            other => other.as_i64().map(Value::from).ok_or_else(fail),
        },
        FieldType::Double => value
            .as_f64()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(fail),
        FieldType::Boolean => match value {
            UniversalValue::Bool(b) => Ok(Value::Bool(*b)),
            UniversalValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Value::Bool(true)),
                "false" | "0" | "no" | "" => Ok(Value::Bool(false)),
                _ => Err(fail()),
            },
            other => other.as_i64().map(|i| Value::Bool(i != 0)).ok_or_else(fail),
        },
        FieldType::Date => match value {
            UniversalValue::Date(d) => Ok(Value::String(d.format("%Y-%m-%d").to_string())),
            UniversalValue::DateTime(dt) => Ok(Value::String(
                dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            )),
            UniversalValue::Text(s) => Ok(Value::String(s.clone())),
            _ => Err(fail()),
        },
        FieldType::Hex => match value {
            UniversalValue::Bytes(_) => Ok(Value::String(value.to_key_string())),
            UniversalValue::Text(s) => Ok(Value::String(s.to_ascii_lowercase())),
            _ => Err(fail()),
        },
        FieldType::Flag => {
            let mask = field.mask.unwrap_or(0);
            value
                .as_i64()
                .map(|bits| Value::Bool(bits & mask != 0))
                .ok_or_else(fail)
        }
    }
}

fn text(value: &UniversalValue) -> String {
    match value {
        UniversalValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        other => other.to_key_string(),
    }
}
