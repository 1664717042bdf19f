//! Reverse conversion: MySQL values → UniversalValue
//!
//! Row images in the binlog carry physical values only: integers arrive
//! without signedness, enums as member indexes, sets as bitmasks. This module
//! combines each value with the column's `UniversalType` (from
//! `INFORMATION_SCHEMA`) to recover the logical value.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use mysql_async::Value;
use sync_core::{UniversalType, UniversalValue};
use thiserror::Error;

/// MySQL value with schema information for type-aware conversion.
#[derive(Debug, Clone)]
pub struct MySQLValueWithSchema {
    /// The raw MySQL value.
    pub value: Value,
    /// The column's declared type.
    pub universal_type: UniversalType,
}

/// Error during MySQL value conversion.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Type mismatch: expected {expected}, got {actual:?}")]
    TypeMismatch { expected: String, actual: Value },
    #[error("Invalid UTF-8 in string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("Invalid date/time value: {0:?}")]
    InvalidDateTime(Value),
    #[error("Enum index {index} out of range for {count} members")]
    EnumIndexOutOfRange { index: i64, count: usize },
}

impl MySQLValueWithSchema {
    pub fn new(value: Value, universal_type: UniversalType) -> Self {
        Self {
            value,
            universal_type,
        }
    }

    /// Convert to UniversalValue.
    pub fn to_universal_value(self) -> Result<UniversalValue, ConversionError> {
        UniversalValue::try_from(self)
    }
}

impl TryFrom<MySQLValueWithSchema> for UniversalValue {
    type Error = ConversionError;

    fn try_from(mv: MySQLValueWithSchema) -> Result<Self, Self::Error> {
        use UniversalType as T;

        // Handle NULL first
        if matches!(mv.value, Value::NULL) {
            return Ok(UniversalValue::Null);
        }

        match &mv.universal_type {
            T::Bool => Ok(UniversalValue::Bool(extract_int(&mv.value)? != 0)),

            T::Int8 { unsigned }
            | T::Int16 { unsigned }
            | T::Int24 { unsigned }
            | T::Int32 { unsigned }
            | T::Int64 { unsigned } => {
                if *unsigned {
                    Ok(UniversalValue::UInt64(extract_unsigned(
                        &mv.value,
                        &mv.universal_type,
                    )?))
                } else {
                    Ok(UniversalValue::Int64(extract_int(&mv.value)?))
                }
            }

            T::Year => {
                let y = extract_int(&mv.value)?;
                // Some decoders hand over the stored byte (offset from 1900)
                let y = if (1..=255).contains(&y) { 1900 + y } else { y };
                Ok(UniversalValue::Int64(y))
            }

            T::Float32 | T::Float64 => Ok(UniversalValue::Float64(extract_float(&mv.value)?)),

            T::Decimal { .. } => Ok(UniversalValue::Decimal(extract_string(&mv.value)?)),

            T::Char { .. } | T::VarChar { .. } | T::Text => {
                Ok(UniversalValue::Text(extract_string(&mv.value)?))
            }

            T::Bytes => Ok(UniversalValue::Bytes(extract_bytes(&mv.value)?)),

            T::Date => Ok(extract_date(&mv.value)?
                .map(UniversalValue::Date)
                .unwrap_or(UniversalValue::Null)),

            T::Time => Ok(UniversalValue::Time(extract_time(&mv.value)?)),

            T::LocalDateTime | T::Timestamp => Ok(extract_datetime(&mv.value)?
                .map(UniversalValue::DateTime)
                .unwrap_or(UniversalValue::Null)),

            T::Json => {
                let s = extract_string(&mv.value)?;
                match serde_json::from_str::<serde_json::Value>(&s) {
                    Ok(json) => Ok(UniversalValue::Json(json)),
                    Err(_) => Ok(UniversalValue::Text(s)),
                }
            }

            T::Bit { width } => {
                let n = extract_bit(&mv.value)?;
                if *width == 1 {
                    Ok(UniversalValue::Bool(n != 0))
                } else {
                    Ok(UniversalValue::UInt64(n))
                }
            }

            T::Enum { values } => match &mv.value {
                Value::Bytes(_) => Ok(UniversalValue::Text(extract_string(&mv.value)?)),
                _ => {
                    let index = extract_int(&mv.value)?;
                    if index == 0 {
                        // Invalid value inserted in non-strict mode
                        return Ok(UniversalValue::Text(String::new()));
                    }
                    usize::try_from(index - 1)
                        .ok()
                        .and_then(|i| values.get(i))
                        .map(|v| UniversalValue::Text(v.clone()))
                        .ok_or(ConversionError::EnumIndexOutOfRange {
                            index,
                            count: values.len(),
                        })
                }
            },

            T::Set { values } => match &mv.value {
                Value::Bytes(_) => {
                    let s = extract_string(&mv.value)?;
                    Ok(UniversalValue::Set(
                        s.split(',')
                            .filter(|m| !m.is_empty())
                            .map(str::to_string)
                            .collect(),
                    ))
                }
                _ => {
                    let mask = extract_unsigned(&mv.value, &T::Int64 { unsigned: true })?;
                    Ok(UniversalValue::Set(
                        values
                            .iter()
                            .enumerate()
                            .filter(|(i, _)| *i < 64 && mask & (1u64 << i) != 0)
                            .map(|(_, v)| v.clone())
                            .collect(),
                    ))
                }
            },
        }
    }
}

/// Extract integer from MySQL Value.
fn extract_int(value: &Value) -> Result<i64, ConversionError> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::UInt(u) => i64::try_from(*u).map_err(|_| ConversionError::TypeMismatch {
            expected: "signed integer".to_string(),
            actual: value.clone(),
        }),
        Value::Bytes(b) => {
            let s = String::from_utf8(b.clone())?;
            s.trim().parse().map_err(|_| ConversionError::TypeMismatch {
                expected: "integer".to_string(),
                actual: value.clone(),
            })
        }
        _ => Err(ConversionError::TypeMismatch {
            expected: "integer".to_string(),
            actual: value.clone(),
        }),
    }
}

/// Extract an unsigned integer, reinterpreting a negative physical value
/// with the column's storage width.
fn extract_unsigned(value: &Value, ty: &UniversalType) -> Result<u64, ConversionError> {
    match value {
        Value::UInt(u) => Ok(*u),
        Value::Int(i) if *i >= 0 => Ok(*i as u64),
        Value::Int(i) => {
            let bits = match ty {
                UniversalType::Int8 { .. } => 8,
                UniversalType::Int16 { .. } => 16,
                UniversalType::Int24 { .. } => 24,
                UniversalType::Int32 { .. } => 32,
                _ => 64,
            };
            let raw = *i as u64;
            Ok(if bits == 64 {
                raw
            } else {
                raw & ((1u64 << bits) - 1)
            })
        }
        Value::Bytes(b) => {
            let s = String::from_utf8(b.clone())?;
            s.trim().parse().map_err(|_| ConversionError::TypeMismatch {
                expected: "unsigned integer".to_string(),
                actual: value.clone(),
            })
        }
        _ => Err(ConversionError::TypeMismatch {
            expected: "unsigned integer".to_string(),
            actual: value.clone(),
        }),
    }
}

/// Extract float from MySQL Value.
fn extract_float(value: &Value) -> Result<f64, ConversionError> {
    match value {
        Value::Float(f) => Ok(*f as f64),
        Value::Double(d) => Ok(*d),
        Value::Int(i) => Ok(*i as f64),
        Value::UInt(u) => Ok(*u as f64),
        Value::Bytes(b) => {
            let s = String::from_utf8(b.clone())?;
            s.trim().parse().map_err(|_| ConversionError::TypeMismatch {
                expected: "float".to_string(),
                actual: value.clone(),
            })
        }
        _ => Err(ConversionError::TypeMismatch {
            expected: "float".to_string(),
            actual: value.clone(),
        }),
    }
}

/// Extract string from MySQL Value.
fn extract_string(value: &Value) -> Result<String, ConversionError> {
    match value {
        Value::Bytes(b) => Ok(String::from_utf8(b.clone())?),
        Value::Int(i) => Ok(i.to_string()),
        Value::UInt(u) => Ok(u.to_string()),
        Value::Float(f) => Ok(f.to_string()),
        Value::Double(d) => Ok(d.to_string()),
        _ => Err(ConversionError::TypeMismatch {
            expected: "string".to_string(),
            actual: value.clone(),
        }),
    }
}

/// Extract bytes from MySQL Value.
fn extract_bytes(value: &Value) -> Result<Vec<u8>, ConversionError> {
    match value {
        Value::Bytes(b) => Ok(b.clone()),
        _ => Err(ConversionError::TypeMismatch {
            expected: "bytes".to_string(),
            actual: value.clone(),
        }),
    }
}

/// BIT(n) values arrive as big-endian bytes.
fn extract_bit(value: &Value) -> Result<u64, ConversionError> {
    match value {
        Value::Bytes(b) => Ok(b
            .iter()
            .rev()
            .take(8)
            .rev()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))),
        Value::Int(i) => Ok(*i as u64),
        Value::UInt(u) => Ok(*u),
        _ => Err(ConversionError::TypeMismatch {
            expected: "bit".to_string(),
            actual: value.clone(),
        }),
    }
}

/// Extract date from MySQL Value. The zero date maps to `None`.
fn extract_date(value: &Value) -> Result<Option<NaiveDate>, ConversionError> {
    match value {
        Value::Date(0, 0, 0, ..) => Ok(None),
        Value::Date(year, month, day, ..) => {
            NaiveDate::from_ymd_opt(*year as i32, *month as u32, *day as u32)
                .map(Some)
                .ok_or_else(|| ConversionError::InvalidDateTime(value.clone()))
        }
        Value::Bytes(b) => {
            let s = String::from_utf8(b.clone())?;
            if s.starts_with("0000-00-00") {
                return Ok(None);
            }
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map(Some)
                .map_err(|_| ConversionError::InvalidDateTime(value.clone()))
        }
        _ => Err(ConversionError::TypeMismatch {
            expected: "date".to_string(),
            actual: value.clone(),
        }),
    }
}

/// Extract time from MySQL Value as `[-]HH:MM:SS[.ffffff]`.
///
/// MySQL TIME is an interval (up to 838 hours), so it is kept as text.
fn extract_time(value: &Value) -> Result<String, ConversionError> {
    match value {
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_hours = u64::from(*days) * 24 + u64::from(*hours);
            let sign = if *negative { "-" } else { "" };
            let mut s = format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}");
            if *micros > 0 {
                s.push_str(&format!(".{micros:06}"));
            }
            Ok(s)
        }
        Value::Bytes(b) => Ok(String::from_utf8(b.clone())?),
        _ => Err(ConversionError::TypeMismatch {
            expected: "time".to_string(),
            actual: value.clone(),
        }),
    }
}

/// Extract datetime from MySQL Value. The zero datetime maps to `None`.
///
/// TIMESTAMP columns can arrive as epoch seconds (integer, or text with a
/// fractional part); those are interpreted as UTC.
fn extract_datetime(value: &Value) -> Result<Option<NaiveDateTime>, ConversionError> {
    match value {
        Value::Date(0, 0, 0, ..) => Ok(None),
        Value::Date(year, month, day, hour, min, sec, micro) => {
            let date = NaiveDate::from_ymd_opt(*year as i32, *month as u32, *day as u32)
                .ok_or_else(|| ConversionError::InvalidDateTime(value.clone()))?;
            let time =
                NaiveTime::from_hms_micro_opt(*hour as u32, *min as u32, *sec as u32, *micro)
                    .ok_or_else(|| ConversionError::InvalidDateTime(value.clone()))?;
            Ok(Some(NaiveDateTime::new(date, time)))
        }
        Value::Int(0) | Value::UInt(0) => Ok(None),
        Value::Int(secs) => from_epoch(*secs, 0)
            .map(Some)
            .ok_or_else(|| ConversionError::InvalidDateTime(value.clone())),
        Value::UInt(secs) => i64::try_from(*secs)
            .ok()
            .and_then(|s| from_epoch(s, 0))
            .map(Some)
            .ok_or_else(|| ConversionError::InvalidDateTime(value.clone())),
        Value::Bytes(b) => {
            let s = String::from_utf8(b.clone())?;
            if s.starts_with("0000-00-00") {
                return Ok(None);
            }
            for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(&s, format) {
                    return Ok(Some(naive));
                }
            }
            if let Some(dt) = parse_epoch_text(&s) {
                return Ok(Some(dt));
            }
            Err(ConversionError::InvalidDateTime(value.clone()))
        }
        _ => Err(ConversionError::TypeMismatch {
            expected: "datetime".to_string(),
            actual: value.clone(),
        }),
    }
}

fn from_epoch(secs: i64, micros: u32) -> Option<NaiveDateTime> {
    if secs == 0 && micros == 0 {
        return None;
    }
    DateTime::from_timestamp(secs, micros * 1000).map(|dt| dt.naive_utc())
}

fn parse_epoch_text(s: &str) -> Option<NaiveDateTime> {
    let (secs, frac) = s.split_once('.').unwrap_or((s, ""));
    let secs: i64 = secs.parse().ok()?;
    let micros = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<6}");
        padded.get(..6)?.parse().ok()?
    };
    from_epoch(secs, micros)
}
