//! Core types for the search-sync framework.
//!
//! This crate provides the foundational types shared by every stage of the
//! binlog → search index pipeline:
//!
//! - [`LogPosition`] - Totally ordered coordinate in the replication stream
//! - [`UniversalType`] / [`UniversalValue`] - Source-neutral column types and values
//! - [`TableDefinition`] - Column metadata for one version of a table schema
//! - [`RowChangeEvent`] - One committed mutation to one row
//! - [`IndexOperation`] - One unit of work against the search index
//!
//! # Architecture
//!
//! ```text
//! sync-core (this crate)
//!    │
//!    ├─── mysql-types                    (MySQL values → UniversalValue)
//!    ├─── search-sync-mysql-binlog-source (binlog → RowChangeEvent)
//!    ├─── index-mapping                  (RowChangeEvent → IndexOperation)
//!    └─── search-sink / opensearch-sink  (IndexOperation → search engine)
//! ```
//!
//! # Example
//!
//! ```rust
//! use sync_core::{LogPosition, RowChangeEvent, RowImage, UniversalValue};
//!
//! let mut after = RowImage::new();
//! after.insert("id".to_string(), UniversalValue::Int64(42));
//! after.insert("title".to_string(), UniversalValue::Text("foo".to_string()));
//!
//! let event = RowChangeEvent::insert(
//!     "torrents",
//!     "id",
//!     UniversalValue::Int64(42),
//!     after,
//!     LogPosition::new("mysql-bin.000001", 1024),
//! );
//! assert_eq!(event.primary_key.to_key_string(), "42");
//! ```

pub mod change;
pub mod operation;
pub mod position;
pub mod schema;
pub mod types;
pub mod values;

// Re-exports for convenience
pub use change::{RowChangeEvent, RowImage, RowOp};
pub use operation::{DocumentKey, Fields, IndexOperation};
pub use position::{LogPosition, PositionParseError};
pub use schema::{ColumnDefinition, TableDefinition};
pub use types::UniversalType;
pub use values::UniversalValue;
