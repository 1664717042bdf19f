//! Table schema metadata.
//!
//! Row images in the binlog are positional: a rows event carries values in
//! column order with no names. A `TableDefinition` supplies the names and
//! types for one version of a table's layout so the reader can turn a
//! positional row into a named [`RowImage`](crate::RowImage).

use crate::types::UniversalType;
use serde::{Deserialize, Serialize};

/// Single column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name
    pub name: String,
    /// Column type
    pub column_type: UniversalType,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: UniversalType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Column layout of one table, in ordinal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Database (schema) name
    pub database: String,
    /// Table name
    pub name: String,
    /// Columns in `ORDINAL_POSITION` order
    pub columns: Vec<ColumnDefinition>,
    /// Primary key column names in key order
    pub primary_key: Vec<String>,
}

impl TableDefinition {
    pub fn new(
        database: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<ColumnDefinition>,
        primary_key: Vec<String>,
    ) -> Self {
        Self {
            database: database.into(),
            name: name.into(),
            columns,
            primary_key,
        }
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get a column by ordinal.
    pub fn column(&self, ordinal: usize) -> Option<&ColumnDefinition> {
        self.columns.get(ordinal)
    }

    /// Get a column by name.
    pub fn get_column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The column used as the row's key.
    ///
    /// For composite keys only the first key column is used. Tables without a
    /// declared primary key fall back to a column named `id`.
    pub fn key_column(&self) -> &str {
        self.primary_key
            .first()
            .map(String::as_str)
            .unwrap_or("id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn torrents() -> TableDefinition {
        TableDefinition::new(
            "nyaa",
            "torrents",
            vec![
                ColumnDefinition::new("id", UniversalType::Int32 { unsigned: false }),
                ColumnDefinition::new("display_name", UniversalType::VarChar { length: 255 }),
            ],
            vec!["id".to_string()],
        )
    }

    #[test]
    fn test_lookup() {
        let table = torrents();
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.column(1).unwrap().name, "display_name");
        assert!(table.get_column("missing").is_none());
        assert_eq!(table.key_column(), "id");
    }

    #[test]
    fn test_key_column_fallback() {
        let mut table = torrents();
        table.primary_key.clear();
        assert_eq!(table.key_column(), "id");
    }
}
