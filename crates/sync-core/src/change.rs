//! Row-level change events decoded from the replication stream.

use crate::position::LogPosition;
use crate::values::UniversalValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Column name → value map for one row.
pub type RowImage = BTreeMap<String, UniversalValue>;

/// Kind of row mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOp {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for RowOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RowOp::Insert => "insert",
            RowOp::Update => "update",
            RowOp::Delete => "delete",
        })
    }
}

/// One committed mutation to one row.
///
/// Invariants:
/// - `Insert` carries only `after`, `Delete` carries only `before`, `Update`
///   carries both.
/// - `primary_key` is taken from `after` when present, `before` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChangeEvent {
    /// Source table name
    pub table: String,
    /// Operation kind
    pub op: RowOp,
    /// Name of the key column the reader used for `primary_key`
    pub primary_key_column: String,
    /// Key value of the affected row
    pub primary_key: UniversalValue,
    /// Row image before the change (update/delete)
    pub before: Option<RowImage>,
    /// Row image after the change (insert/update)
    pub after: Option<RowImage>,
    /// Position of the change in the replication stream
    pub position: LogPosition,
}

impl RowChangeEvent {
    /// Create an insert event.
    pub fn insert(
        table: impl Into<String>,
        primary_key_column: impl Into<String>,
        primary_key: UniversalValue,
        after: RowImage,
        position: LogPosition,
    ) -> Self {
        Self {
            table: table.into(),
            op: RowOp::Insert,
            primary_key_column: primary_key_column.into(),
            primary_key,
            before: None,
            after: Some(after),
            position,
        }
    }

    /// Create an update event.
    pub fn update(
        table: impl Into<String>,
        primary_key_column: impl Into<String>,
        primary_key: UniversalValue,
        before: RowImage,
        after: RowImage,
        position: LogPosition,
    ) -> Self {
        Self {
            table: table.into(),
            op: RowOp::Update,
            primary_key_column: primary_key_column.into(),
            primary_key,
            before: Some(before),
            after: Some(after),
            position,
        }
    }

    /// Create a delete event.
    pub fn delete(
        table: impl Into<String>,
        primary_key_column: impl Into<String>,
        primary_key: UniversalValue,
        before: RowImage,
        position: LogPosition,
    ) -> Self {
        Self {
            table: table.into(),
            op: RowOp::Delete,
            primary_key_column: primary_key_column.into(),
            primary_key,
            before: Some(before),
            after: None,
            position,
        }
    }

    /// The most recent image of the row: `after` if present, else `before`.
    pub fn current_image(&self) -> Option<&RowImage> {
        self.after.as_ref().or(self.before.as_ref())
    }
}
