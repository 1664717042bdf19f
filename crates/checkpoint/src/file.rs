//! Checkpoint file wrapper for storage-agnostic serialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Checkpoint, SyncPhase};

/// Storage-agnostic checkpoint file wrapper.
///
/// This struct wraps source-specific checkpoints with metadata
/// for storage and retrieval. The format is:
/// - Self-describing (includes `database_type` field)
/// - Tied to an index build (includes `generation`)
/// - Storage-agnostic (uses JSON Value for checkpoint data)
///
/// # File Format
///
/// ```json
/// {
///     "database_type": "mysql-binlog",
///     "checkpoint": {
///         "file": "mysql-bin.000012",
///         "offset": 4711
///     },
///     "phase": "Incremental",
///     "generation": "torrents-v3",
///     "created_at": "2024-01-01T00:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointFile {
    /// Source type identifier (e.g., "mysql-binlog")
    pub database_type: String,
    /// Serialized checkpoint data as JSON Value
    pub checkpoint: serde_json::Value,
    /// Which record this is
    pub phase: SyncPhase,
    /// Index generation the checkpoint applies to
    #[serde(default)]
    pub generation: String,
    /// Timestamp when this checkpoint file was created
    pub created_at: DateTime<Utc>,
}

impl CheckpointFile {
    /// Create new checkpoint file from a source-specific checkpoint.
    pub fn new<C: Checkpoint>(
        checkpoint: &C,
        phase: SyncPhase,
        generation: impl Into<String>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            database_type: C::DATABASE_TYPE.to_string(),
            checkpoint: serde_json::to_value(checkpoint)?,
            phase,
            generation: generation.into(),
            created_at: Utc::now(),
        })
    }

    /// Parse checkpoint into source-specific type.
    ///
    /// Validates that the stored `database_type` matches the expected type `C`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The `database_type` doesn't match `C::DATABASE_TYPE`
    /// - The checkpoint data can't be deserialized into type `C`
    pub fn parse<C: Checkpoint>(&self) -> anyhow::Result<C> {
        if self.database_type != C::DATABASE_TYPE {
            anyhow::bail!(
                "Checkpoint type mismatch: expected '{}', found '{}'",
                C::DATABASE_TYPE,
                self.database_type
            );
        }
        Ok(serde_json::from_value(self.checkpoint.clone())?)
    }

    pub fn database_type(&self) -> &str {
        &self.database_type
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
