//! MySQL schema column type conversion.
//!
//! This module provides conversion from MySQL INFORMATION_SCHEMA column types
//! to `UniversalType` for decoding binlog row images.

use sync_core::UniversalType;

/// Convert MySQL INFORMATION_SCHEMA column type to UniversalType.
///
/// # Arguments
///
/// * `data_type` - The MySQL data type name (`DATA_TYPE`, e.g. "INT", "VARCHAR")
/// * `column_type` - The full column type string (`COLUMN_TYPE`, e.g. "int(10) unsigned")
/// * `precision` - Optional numeric precision
/// * `scale` - Optional numeric scale
///
/// # Example
///
/// ```
/// use mysql_types::mysql_column_to_universal_type;
/// use sync_core::UniversalType;
///
/// let ut = mysql_column_to_universal_type("INT", "int(11)", None, None);
/// assert_eq!(ut, UniversalType::Int32 { unsigned: false });
///
/// // TINYINT(1) is treated as boolean in MySQL
/// let ut = mysql_column_to_universal_type("TINYINT", "tinyint(1)", None, None);
/// assert_eq!(ut, UniversalType::Bool);
/// ```
pub fn mysql_column_to_universal_type(
    data_type: &str,
    column_type: &str,
    precision: Option<u32>,
    scale: Option<u32>,
) -> UniversalType {
    let column_type_lower = column_type.to_lowercase();
    let unsigned = column_type_lower.contains("unsigned");

    match data_type.to_uppercase().as_str() {
        // Numeric types
        "TINYINT" => {
            if column_type_lower.starts_with("tinyint(1)") && !unsigned {
                UniversalType::Bool
            } else {
                UniversalType::Int8 { unsigned }
            }
        }
        "SMALLINT" => UniversalType::Int16 { unsigned },
        "MEDIUMINT" => UniversalType::Int24 { unsigned },
        "INT" | "INTEGER" => UniversalType::Int32 { unsigned },
        "BIGINT" => UniversalType::Int64 { unsigned },
        "FLOAT" => UniversalType::Float32,
        "DOUBLE" | "REAL" => UniversalType::Float64,
        "DECIMAL" | "NUMERIC" => UniversalType::Decimal {
            precision: precision.map(|p| p.min(65) as u8).unwrap_or(10),
            scale: scale.map(|s| s.min(30) as u8).unwrap_or(0),
        },

        // Boolean
        "BOOLEAN" | "BOOL" => UniversalType::Bool,

        // String types
        "VARCHAR" => match extract_length_from_column_type(column_type) {
            Some(length) => UniversalType::VarChar { length },
            None => UniversalType::Text,
        },
        "CHAR" => UniversalType::Char {
            length: extract_length_from_column_type(column_type).unwrap_or(1),
        },
        "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" => UniversalType::Text,

        // Binary types
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            UniversalType::Bytes
        }

        // Date/Time types
        "DATE" => UniversalType::Date,
        "TIME" => UniversalType::Time,
        "DATETIME" => UniversalType::LocalDateTime,
        "TIMESTAMP" => UniversalType::Timestamp,
        "YEAR" => UniversalType::Year,

        // JSON
        "JSON" => UniversalType::Json,

        "BIT" => UniversalType::Bit {
            width: extract_length_from_column_type(column_type)
                .map(|w| w.min(64) as u16)
                .unwrap_or(1),
        },

        // e.g. "set('a','b','c')"
        "SET" => UniversalType::Set {
            values: extract_set_or_enum_values(column_type),
        },

        // e.g. "enum('small','medium','large')"
        "ENUM" => UniversalType::Enum {
            values: extract_set_or_enum_values(column_type),
        },

        // Fallback to Text for unknown types
        _ => UniversalType::Text,
    }
}

/// Extract length from a MySQL column type string.
///
/// E.g., "varchar(255)" -> Some(255), "int(11)" -> Some(11)
fn extract_length_from_column_type(column_type: &str) -> Option<u32> {
    let start = column_type.find('(')?;
    let end = column_type.find(')')?;
    if start >= end {
        return None;
    }
    let inner = &column_type[start + 1..end];
    // DECIMAL(10,2) style
    let first_part = inner.split(',').next().unwrap_or(inner);
    first_part.trim().parse().ok()
}

/// Extract member names from a MySQL SET or ENUM column type string.
///
/// Members are single-quoted; a doubled quote inside a member is a literal quote.
/// E.g., "enum('small','it''s')" -> vec!["small", "it's"]
fn extract_set_or_enum_values(column_type: &str) -> Vec<String> {
    let Some(start) = column_type.find('(') else {
        return Vec::new();
    };
    let Some(end) = column_type.rfind(')') else {
        return Vec::new();
    };
    if start >= end {
        return Vec::new();
    }

    let mut values = Vec::new();
    let mut chars = column_type[start + 1..end].chars().peekable();
    let mut current = String::new();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('\'', false) => in_quotes = true,
            ('\'', true) if chars.peek() == Some(&'\'') => {
                chars.next();
                current.push('\'');
            }
            ('\'', true) => {
                in_quotes = false;
                values.push(std::mem::take(&mut current));
            }
            (c, true) => current.push(c),
            _ => {}
        }
    }
    values
}
