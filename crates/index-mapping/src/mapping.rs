//! Declarative table → index mappings.
//!
//! Mappings are deserialized from the `[[tables]]` array of the sync
//! configuration file:
//!
//! ```toml
//! [[tables]]
//! table = "nyaa_torrents"
//! document_prefix = "torrents"
//! index = { column = "main_category_id", indices = { "1" = "nyaa_anime", "2" = "nyaa_audio" }, default = "nyaa" }
//! fields = [
//!     { column = "id", type = "long" },
//!     { column = "display_name", name = "display_name", type = "text" },
//!     { column = "info_hash", type = "hex" },
//!     { column = "flags", name = "anonymous", type = "flag", mask = 1 },
//! ]
//!
//! [[tables]]
//! table = "nyaa_statistics"
//! kind = "partial"
//! key_column = "torrent_id"
//! document_prefix = "torrents"
//! index = "nyaa_anime"
//! fields = [{ column = "seed_count", type = "long" }]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Whether a table owns its documents or contributes fields to a parent's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingKind {
    /// Each row is one document; deletes remove it.
    #[default]
    Document,
    /// Rows merge counter fields into a parent document.
    Partial,
}

/// Where the documents of a table live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexTarget {
    Static(String),
    Routed(RoutedIndex),
}

/// Index chosen per row from the value of a classifying column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutedIndex {
    pub column: String,
    /// Bitmask applied to an integer column before the lookup.
    #[serde(default)]
    pub mask: Option<i64>,
    /// Classifying value (rendered as text) → index name.
    pub indices: BTreeMap<String, String>,
    #[serde(default)]
    pub default: Option<String>,
}

/// Declared index type of a projected field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Text,
    Keyword,
    Long,
    Double,
    Boolean,
    /// ISO-8601 without zone.
    Date,
    /// Binary rendered as lowercase hex.
    Hex,
    /// `(column & mask) != 0`
    Flag,
}

impl FieldType {
    /// Value written for a NULL column when no per-field default is set.
    pub fn null_default(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            FieldType::Text | FieldType::Keyword | FieldType::Hex => Value::String(String::new()),
            FieldType::Long => Value::from(0),
            FieldType::Double => Value::from(0.0),
            FieldType::Boolean | FieldType::Flag => Value::Bool(false),
            FieldType::Date => Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub column: String,
    /// Index field name; defaults to the column name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub field_type: FieldType,
    /// Only meaningful for `flag` fields.
    #[serde(default)]
    pub mask: Option<i64>,
    /// Replaces the type default for NULL values.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

impl FieldMapping {
    pub fn new(column: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            column: column.into(),
            name: None,
            field_type,
            mask: None,
            default: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_mask(mut self, mask: i64) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn field_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMapping {
    pub table: String,
    #[serde(default)]
    pub kind: MappingKind,
    /// Column the document id is derived from; defaults to the primary key.
    #[serde(default)]
    pub key_column: Option<String>,
    /// Document id prefix; defaults to the table name.
    #[serde(default)]
    pub document_prefix: Option<String>,
    pub index: IndexTarget,
    pub fields: Vec<FieldMapping>,
    /// Defaults to true for partial mappings and false otherwise.
    #[serde(default)]
    pub ignore_deletes: Option<bool>,
}

impl TableMapping {
    pub fn document(table: impl Into<String>, index: IndexTarget, fields: Vec<FieldMapping>) -> Self {
        Self {
            table: table.into(),
            kind: MappingKind::Document,
            key_column: None,
            document_prefix: None,
            index,
            fields,
            ignore_deletes: None,
        }
    }

    pub fn partial(
        table: impl Into<String>,
        key_column: impl Into<String>,
        parent: impl Into<String>,
        index: impl Into<String>,
        fields: Vec<FieldMapping>,
    ) -> Self {
        Self {
            table: table.into(),
            kind: MappingKind::Partial,
            key_column: Some(key_column.into()),
            document_prefix: Some(parent.into()),
            index: IndexTarget::Static(index.into()),
            fields,
            ignore_deletes: None,
        }
    }

    pub fn prefix(&self) -> &str {
        self.document_prefix.as_deref().unwrap_or(&self.table)
    }

    pub fn ignores_deletes(&self) -> bool {
        self.ignore_deletes
            .unwrap_or(self.kind == MappingKind::Partial)
    }

    /// Every column the mapping reads from a row image.
    pub fn projected_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = self.fields.iter().map(|f| f.column.as_str()).collect();
        if let Some(key) = &self.key_column {
            columns.push(key);
        }
        if let IndexTarget::Routed(routed) = &self.index {
            columns.push(&routed.column);
        }
        columns.sort_unstable();
        columns.dedup();
        columns
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("no tables are mapped")]
    Empty,
    #[error("table '{0}' is mapped more than once")]
    DuplicateTable(String),
    #[error("table '{0}' maps no fields")]
    NoFields(String),
    #[error("table '{table}' maps index field '{field}' more than once")]
    DuplicateField { table: String, field: String },
    #[error("partial table '{0}' must use a static index")]
    PartialRouted(String),
    #[error("partial table '{0}' must name a key_column")]
    PartialWithoutKey(String),
    #[error("flag field '{field}' of table '{table}' has no mask")]
    FlagWithoutMask { table: String, field: String },
    #[error("routed index of table '{0}' lists no indices")]
    EmptyRouting(String),
}

/// Check a set of mappings for the mistakes that would otherwise surface as
/// per-row translation failures.
pub fn validate(mappings: &[TableMapping]) -> Result<(), MappingError> {
    if mappings.is_empty() {
        return Err(MappingError::Empty);
    }
    let mut seen = HashSet::new();
    for mapping in mappings {
        let table = &mapping.table;
        if !seen.insert(table.as_str()) {
            return Err(MappingError::DuplicateTable(table.clone()));
        }
        if mapping.fields.is_empty() {
            return Err(MappingError::NoFields(table.clone()));
        }
        let mut names = HashSet::new();
        for field in &mapping.fields {
            if !names.insert(field.field_name()) {
                return Err(MappingError::DuplicateField {
                    table: table.clone(),
                    field: field.field_name().to_string(),
                });
            }
            if field.field_type == FieldType::Flag && field.mask.is_none() {
                return Err(MappingError::FlagWithoutMask {
                    table: table.clone(),
                    field: field.field_name().to_string(),
                });
            }
        }
        match (&mapping.kind, &mapping.index) {
            (MappingKind::Partial, IndexTarget::Routed(_)) => {
                return Err(MappingError::PartialRouted(table.clone()));
            }
            (_, IndexTarget::Routed(routed)) if routed.indices.is_empty() && routed.default.is_none() => {
                return Err(MappingError::EmptyRouting(table.clone()));
            }
            _ => {}
        }
        if mapping.kind == MappingKind::Partial && mapping.key_column.is_none() {
            return Err(MappingError::PartialWithoutKey(table.clone()));
        }
    }
    Ok(())
}
