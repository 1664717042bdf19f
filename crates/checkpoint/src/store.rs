//! Checkpoint storage trait
//!
//! This module defines the CheckpointStore trait for backend-agnostic
//! checkpoint storage operations.

use anyhow::Result;
use async_trait::async_trait;

use crate::{CheckpointFile, SyncPhase};

/// Trait for checkpoint storage operations.
///
/// One record is kept per phase. Writing a phase replaces the previous
/// record for that phase as a single atomic step: a reader observes either
/// the old record or the new one, never a torn write.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Replace the record for `file.phase`.
    async fn write(&self, file: &CheckpointFile) -> Result<()>;

    /// Read the record for a phase.
    ///
    /// Returns None if the checkpoint doesn't exist.
    async fn read(&self, phase: SyncPhase) -> Result<Option<CheckpointFile>>;
}
