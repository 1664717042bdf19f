//! Source-neutral column values.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A decoded column value.
///
/// Values are produced by the Log Reader (from binlog rows) and by the
/// bootstrap loader (from JSONL exports), and consumed by the Event
/// Translator, which coerces them into index field values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum UniversalValue {
    /// SQL NULL
    Null,

    /// Boolean
    Bool(bool),

    /// Signed integer (all signed integer widths)
    Int64(i64),

    /// Unsigned integer (all unsigned integer widths)
    UInt64(u64),

    /// Floating point
    Float64(f64),

    /// Exact decimal kept as its textual representation
    Decimal(String),

    /// Character data
    Text(String),

    /// Binary data
    Bytes(Vec<u8>),

    /// Calendar date
    Date(NaiveDate),

    /// Time of day or interval, rendered `[-]HH:MM:SS[.ffffff]`
    Time(String),

    /// Date and time without zone
    DateTime(NaiveDateTime),

    /// JSON document
    Json(serde_json::Value),

    /// Set members
    Set(Vec<String>),
}

impl UniversalValue {
    /// Check if this value is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Interpret the value as a signed integer, if it is integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(i) => Some(*i),
            Self::UInt64(u) => i64::try_from(*u).ok(),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Text(s) | Self::Decimal(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Interpret the value as a float, if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float64(f) => Some(*f),
            Self::Int64(i) => Some(*i as f64),
            Self::UInt64(u) => Some(*u as f64),
            Self::Text(s) | Self::Decimal(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Render the value the way it should appear inside a document id.
    ///
    /// Integers render without decoration, text renders verbatim, and binary
    /// keys render as lowercase hex so the id stays printable.
    pub fn to_key_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int64(i) => i.to_string(),
            Self::UInt64(u) => u.to_string(),
            Self::Float64(f) => f.to_string(),
            Self::Decimal(s) | Self::Text(s) | Self::Time(s) => s.clone(),
            Self::Bytes(b) => b.iter().map(|byte| format!("{byte:02x}")).collect(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            Self::Json(v) => v.to_string(),
            Self::Set(members) => members.join(","),
        }
    }

    /// Convert a plain JSON value (as found in a bulk export) into a value.
    ///
    /// JSON has no date or binary types; those arrive as strings and are
    /// interpreted later by the field coercion the mapping declares.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int64(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInt64(u)
                } else {
                    Self::Float64(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Self::Text(s),
            other => Self::Json(other),
        }
    }
}

impl fmt::Display for UniversalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            other => f.write_str(&other.to_key_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_strings() {
        assert_eq!(UniversalValue::Int64(42).to_key_string(), "42");
        assert_eq!(UniversalValue::UInt64(7).to_key_string(), "7");
        assert_eq!(UniversalValue::Text("abc".into()).to_key_string(), "abc");
        assert_eq!(
            UniversalValue::Bytes(vec![0xde, 0xad, 0x01]).to_key_string(),
            "dead01"
        );
    }

    #[test]
    fn test_integer_views() {
        assert_eq!(UniversalValue::UInt64(5).as_i64(), Some(5));
        assert_eq!(UniversalValue::UInt64(u64::MAX).as_i64(), None);
        assert_eq!(UniversalValue::Text(" 12 ".into()).as_i64(), Some(12));
        assert_eq!(UniversalValue::Null.as_i64(), None);
    }

    #[test]
    fn test_from_json() {
        use serde_json::json;
        assert_eq!(UniversalValue::from_json(json!(null)), UniversalValue::Null);
        assert_eq!(UniversalValue::from_json(json!(3)), UniversalValue::Int64(3));
        assert_eq!(UniversalValue::from_json(json!(1.5)), UniversalValue::Float64(1.5));
        assert_eq!(
            UniversalValue::from_json(json!("x")),
            UniversalValue::Text("x".into())
        );
        assert_eq!(
            UniversalValue::from_json(json!({"a": 1})),
            UniversalValue::Json(json!({"a": 1}))
        );
    }
}
