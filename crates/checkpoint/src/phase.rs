//! Sync phase enumeration for checkpoint tracking.

use serde::{Deserialize, Serialize};

/// Which record a checkpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncPhase {
    /// Bootstrap marker, captured before the bulk reindex begins.
    ///
    /// Used to seed the running checkpoint on first start, or when the
    /// running checkpoint belongs to another index generation.
    FullSyncStart,

    /// Running checkpoint: the highest commit position whose index
    /// operations are confirmed applied.
    Incremental,
}

impl SyncPhase {
    /// Get the string representation of this phase.
    ///
    /// Used for checkpoint file naming (`incremental.json`) and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::FullSyncStart => "full_sync_start",
            SyncPhase::Incremental => "incremental",
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
