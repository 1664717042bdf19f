//! In-memory checkpoint storage.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::store::CheckpointStore;
use crate::{CheckpointFile, SyncPhase};

/// CheckpointStore that keeps records in memory and counts writes.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<SyncPhase, CheckpointFile>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `write` calls so far, across all phases.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn write(&self, file: &CheckpointFile) -> Result<()> {
        self.records.lock().await.insert(file.phase, file.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&self, phase: SyncPhase) -> Result<Option<CheckpointFile>> {
        Ok(self.records.lock().await.get(&phase).cloned())
    }
}
