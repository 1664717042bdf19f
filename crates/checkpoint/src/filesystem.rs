//! Filesystem-based checkpoint storage implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::store::CheckpointStore;
use crate::{CheckpointFile, SyncPhase};

/// Filesystem implementation of CheckpointStore trait.
///
/// Stores one JSON file per phase in a directory
/// (`{dir}/incremental.json`, `{dir}/full_sync_start.json`).
/// Writes go to a temporary sibling first, are flushed and synced, then
/// renamed over the previous file.
pub struct FilesystemStore {
    dir: PathBuf,
}

impl FilesystemStore {
    /// Create a new FilesystemStore with the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for a phase.
    pub fn path_for(&self, phase: SyncPhase) -> PathBuf {
        self.dir.join(format!("{}.json", phase.as_str()))
    }

    fn tmp_path_for(&self, phase: SyncPhase) -> PathBuf {
        self.dir.join(format!(".{}.json.tmp", phase.as_str()))
    }
}

pub(crate) async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[async_trait]
impl CheckpointStore for FilesystemStore {
    async fn write(&self, file: &CheckpointFile) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create checkpoint dir {}", self.dir.display()))?;

        let target = self.path_for(file.phase);
        let tmp = self.tmp_path_for(file.phase);
        let body = serde_json::to_vec_pretty(file)?;

        let mut handle = tokio::fs::File::create(&tmp)
            .await
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        handle.write_all(&body).await?;
        handle.flush().await?;
        handle
            .sync_all()
            .await
            .with_context(|| format!("Failed to sync {}", tmp.display()))?;
        drop(handle);

        tokio::fs::rename(&tmp, &target)
            .await
            .with_context(|| format!("Failed to rename {} into place", tmp.display()))?;

        // Persist the rename itself. Not every platform allows opening a directory.
        if let Err(e) = sync_dir(&self.dir).await {
            tracing::warn!(
                dir = %self.dir.display(),
                error = %e,
                "Failed to sync checkpoint directory after rename"
            );
        }

        tracing::debug!("Stored {} checkpoint to {}", file.phase, target.display());
        Ok(())
    }

    async fn read(&self, phase: SyncPhase) -> Result<Option<CheckpointFile>> {
        let path = self.path_for(phase);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        let file = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt checkpoint file {}", path.display()))?;
        Ok(Some(file))
    }
}
