//! Document-level operations produced by the translator and consumed by sinks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Field name → JSON value map for one document.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Identifies one document in the search index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentKey {
    pub index: String,
    pub id: String,
}

impl DocumentKey {
    pub fn new(index: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.id)
    }
}

/// A single mutation against the search index.
///
/// `Upsert` has merge semantics: the listed fields are written and any other
/// fields already on the document are preserved. If the document does not
/// exist it is created from `fields`.
///
/// `Update` merges the same way but only into a document that already
/// exists; against a missing document it is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum IndexOperation {
    Upsert { key: DocumentKey, fields: Fields },
    Update { key: DocumentKey, fields: Fields },
    Delete { key: DocumentKey },
}

impl IndexOperation {
    pub fn upsert(key: DocumentKey, fields: Fields) -> Self {
        IndexOperation::Upsert { key, fields }
    }

    pub fn update(key: DocumentKey, fields: Fields) -> Self {
        IndexOperation::Update { key, fields }
    }

    pub fn delete(key: DocumentKey) -> Self {
        IndexOperation::Delete { key }
    }

    pub fn key(&self) -> &DocumentKey {
        match self {
            IndexOperation::Upsert { key, .. }
            | IndexOperation::Update { key, .. }
            | IndexOperation::Delete { key } => key,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, IndexOperation::Delete { .. })
    }

    pub fn action(&self) -> &'static str {
        match self {
            IndexOperation::Upsert { .. } => "upsert",
            IndexOperation::Update { .. } => "update",
            IndexOperation::Delete { .. } => "delete",
        }
    }
}
