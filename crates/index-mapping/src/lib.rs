//! Event Translator for search-sync.
//!
//! Turns [`RowChangeEvent`](sync_core::RowChangeEvent)s into
//! [`IndexOperation`](sync_core::IndexOperation)s according to declarative
//! per-table mappings: field projection, renames, type coercion, index
//! routing, and partial (child table) updates of a parent document.
//!
//! ```rust
//! use index_mapping::{FieldMapping, FieldType, IndexTarget, TableMapping, Translator};
//! use sync_core::{LogPosition, RowChangeEvent, RowImage, UniversalValue};
//!
//! let translator = Translator::new(vec![TableMapping::document(
//!     "torrents",
//!     IndexTarget::Static("nyaa".into()),
//!     vec![FieldMapping::new("display_name", FieldType::Text).named("title")],
//! )])
//! .unwrap();
//!
//! let mut row = RowImage::new();
//! row.insert("id".into(), UniversalValue::Int64(42));
//! row.insert("display_name".into(), UniversalValue::Text("foo".into()));
//! let event = RowChangeEvent::insert(
//!     "torrents",
//!     "id",
//!     UniversalValue::Int64(42),
//!     row,
//!     LogPosition::new("mysql-bin.000001", 4),
//! );
//!
//! let ops = translator.translate(&event).unwrap();
//! assert_eq!(ops[0].key().id, "torrents:42");
//! ```

pub mod coerce;
pub mod mapping;
pub mod translate;

pub use mapping::{
    validate, FieldMapping, FieldType, IndexTarget, MappingError, MappingKind, RoutedIndex,
    TableMapping,
};
pub use translate::{TranslateError, Translator};
