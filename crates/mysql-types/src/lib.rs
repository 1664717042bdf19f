//! MySQL type conversions for sync-core types.
//!
//! This crate converts what the MySQL replication stream and
//! `INFORMATION_SCHEMA` hand us into sync-core's source-neutral types.
//!
//! # Structure
//!
//! - `reverse`: Convert decoded binlog values → `UniversalValue`
//! - `schema`: MySQL column type to `UniversalType` conversion
//!
//! # Example
//!
//! ```rust
//! use mysql_async::Value;
//! use mysql_types::{mysql_column_to_universal_type, MySQLValueWithSchema};
//! use sync_core::{UniversalType, UniversalValue};
//!
//! let ty = mysql_column_to_universal_type("TINYINT", "tinyint(3) unsigned", None, None);
//! assert_eq!(ty, UniversalType::Int8 { unsigned: true });
//!
//! // The binlog carries the raw signed byte; the column metadata restores it.
//! let value = MySQLValueWithSchema::new(Value::Int(-1), ty).to_universal_value().unwrap();
//! assert_eq!(value, UniversalValue::UInt64(255));
//! ```

pub mod reverse;
pub mod schema;

pub use reverse::{ConversionError, MySQLValueWithSchema};
pub use schema::mysql_column_to_universal_type;
