//! Checkpoint advancement from confirmed commit positions.

use sync_core::LogPosition;

/// Tracks the highest confirmed commit marker and what has been persisted.
///
/// Confirmations may arrive out of order or repeat; the tracked position only
/// moves forward.
#[derive(Debug, Clone)]
pub struct CheckpointTracker {
    confirmed: LogPosition,
    saved: LogPosition,
}

impl CheckpointTracker {
    /// Start from the position the run resumed at, which is already durable.
    pub fn new(start: LogPosition) -> Self {
        Self {
            confirmed: start.clone(),
            saved: start,
        }
    }

    /// Record a commit marker whose preceding operations are applied.
    /// Returns whether the confirmed position moved.
    pub fn confirm(&mut self, commit: &LogPosition) -> bool {
        if *commit > self.confirmed {
            self.confirmed = commit.clone();
            true
        } else {
            false
        }
    }

    pub fn confirmed(&self) -> &LogPosition {
        &self.confirmed
    }

    pub fn saved(&self) -> &LogPosition {
        &self.saved
    }

    /// Position to persist, if it moved past the last save.
    pub fn due(&self) -> Option<&LogPosition> {
        (self.confirmed > self.saved).then_some(&self.confirmed)
    }

    pub fn mark_saved(&mut self, position: &LogPosition) {
        if *position > self.saved {
            self.saved = position.clone();
        }
    }
}
