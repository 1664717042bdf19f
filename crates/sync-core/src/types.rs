//! Source-neutral column types.
//!
//! `UniversalType` describes what a source column holds, independent of the
//! source database's spelling of it. The Log Reader attaches one to every
//! column it decodes so values can be interpreted correctly (signedness,
//! enum members, text vs. binary), and the Event Translator never has to know
//! MySQL type names.

use serde::{Deserialize, Serialize};

/// Universal data type representation for search-sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UniversalType {
    /// Boolean value (MySQL `TINYINT(1)`, `BOOL`)
    Bool,

    /// 8-bit integer
    Int8 { unsigned: bool },

    /// 16-bit integer
    Int16 { unsigned: bool },

    /// 24-bit integer (MySQL `MEDIUMINT`)
    Int24 { unsigned: bool },

    /// 32-bit integer
    Int32 { unsigned: bool },

    /// 64-bit integer
    Int64 { unsigned: bool },

    /// 32-bit IEEE 754 floating point
    Float32,

    /// 64-bit IEEE 754 floating point
    Float64,

    /// Exact decimal with specified precision and scale
    Decimal { precision: u8, scale: u8 },

    /// Fixed-length character string
    Char { length: u32 },

    /// Variable-length character string with max length
    VarChar { length: u32 },

    /// Unlimited text
    Text,

    /// Fixed or variable binary data (`BINARY`, `VARBINARY`, `BLOB`)
    Bytes,

    /// Date only (YYYY-MM-DD)
    Date,

    /// Time of day or interval (HH:MM:SS)
    Time,

    /// Timestamp without timezone (`DATETIME`)
    LocalDateTime,

    /// Timestamp stored as UTC epoch (`TIMESTAMP`)
    Timestamp,

    /// Year (`YEAR`)
    Year,

    /// JSON document
    Json,

    /// Bit field (`BIT(n)`)
    Bit { width: u16 },

    /// Enumeration; the binlog carries the 1-based member index
    Enum { values: Vec<String> },

    /// Set; the binlog carries a member bitmask
    Set { values: Vec<String> },
}

impl UniversalType {
    /// Whether this is an integer type declared `UNSIGNED`.
    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            Self::Int8 { unsigned: true }
                | Self::Int16 { unsigned: true }
                | Self::Int24 { unsigned: true }
                | Self::Int32 { unsigned: true }
                | Self::Int64 { unsigned: true }
        )
    }

    /// Whether values of this type are character data (as opposed to raw bytes).
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            Self::Char { .. } | Self::VarChar { .. } | Self::Text | Self::Decimal { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned_detection() {
        assert!(UniversalType::Int32 { unsigned: true }.is_unsigned());
        assert!(!UniversalType::Int32 { unsigned: false }.is_unsigned());
        assert!(!UniversalType::Float64.is_unsigned());
    }

    #[test]
    fn test_serde_tagged_format() {
        let ty = UniversalType::VarChar { length: 255 };
        let json = serde_json::to_value(&ty).unwrap();
        assert_eq!(json, serde_json::json!({"type": "var_char", "length": 255}));

        let parsed: UniversalType = serde_json::from_value(serde_json::json!({"type": "text"})).unwrap();
        assert_eq!(parsed, UniversalType::Text);
    }
}
