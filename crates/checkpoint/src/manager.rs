//! Generic sync manager for checkpoint operations.

use std::sync::Arc;

use crate::{store::CheckpointStore, Checkpoint, CheckpointFile, SyncPhase};

/// Outcome of loading a checkpoint for a phase.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded<C> {
    /// A checkpoint for the configured generation.
    Current(C),
    /// No record exists for the phase.
    NotInitialized,
    /// A record exists but was written for another index generation.
    OtherGeneration { found: String },
}

impl<C> Loaded<C> {
    /// The checkpoint if it belongs to the current generation.
    pub fn current(self) -> Option<C> {
        match self {
            Loaded::Current(c) => Some(c),
            _ => None,
        }
    }
}

/// Manager for handling checkpoint saving and loading.
///
/// Every record is stamped with the manager's generation. Records written
/// for another generation are reported as [`Loaded::OtherGeneration`] so the
/// caller can fall back to the bootstrap marker.
///
/// # Example
///
/// ```rust,ignore
/// use checkpoint::{FilesystemStore, SyncManager, SyncPhase};
///
/// let manager = SyncManager::new(Arc::new(FilesystemStore::new("/var/lib/search-sync")), "v1");
/// manager.save(&checkpoint, SyncPhase::Incremental).await?;
/// let loaded = manager.load::<MySQLBinlogCheckpoint>(SyncPhase::Incremental).await?;
/// ```
#[derive(Clone)]
pub struct SyncManager {
    store: Arc<dyn CheckpointStore>,
    generation: String,
}

impl SyncManager {
    pub fn new(store: Arc<dyn CheckpointStore>, generation: impl Into<String>) -> Self {
        Self {
            store,
            generation: generation.into(),
        }
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    /// Persist a checkpoint for a phase, replacing the previous record.
    pub async fn save<C: Checkpoint>(&self, checkpoint: &C, phase: SyncPhase) -> anyhow::Result<()> {
        let file = CheckpointFile::new(checkpoint, phase, self.generation.clone())?;
        self.store.write(&file).await?;

        tracing::info!(
            phase = %phase,
            generation = %self.generation,
            "Saved checkpoint: {}",
            checkpoint.to_cli_string()
        );
        Ok(())
    }

    /// Load and parse the checkpoint for a phase.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read, or its source type
    /// doesn't match `C::DATABASE_TYPE`.
    pub async fn load<C: Checkpoint>(&self, phase: SyncPhase) -> anyhow::Result<Loaded<C>> {
        let Some(file) = self.store.read(phase).await? else {
            return Ok(Loaded::NotInitialized);
        };
        if file.generation != self.generation {
            tracing::warn!(
                phase = %phase,
                expected = %self.generation,
                found = %file.generation,
                "Ignoring checkpoint written for another index generation"
            );
            return Ok(Loaded::OtherGeneration {
                found: file.generation,
            });
        }
        Ok(Loaded::Current(file.parse::<C>()?))
    }
}
