//! Operator counters for a running sync.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Counters shared by the pipeline stages.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    rows_received: AtomicU64,
    commits_received: AtomicU64,
    source_reconnects: AtomicU64,
    operations_applied: AtomicU64,
    operations_rejected: AtomicU64,
    batches_applied: AtomicU64,
    index_transport_errors: AtomicU64,
    translate_errors: AtomicU64,
    unroutable_rows: AtomicU64,
    schema_mismatches: AtomicU64,
    rows_skipped_disabled: AtomicU64,
    checkpoints_saved: AtomicU64,
    checkpoint_errors: AtomicU64,
}

/// Point-in-time copy of [`SyncMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub rows_received: u64,
    pub commits_received: u64,
    pub source_reconnects: u64,
    pub operations_applied: u64,
    pub operations_rejected: u64,
    pub batches_applied: u64,
    pub index_transport_errors: u64,
    pub translate_errors: u64,
    pub unroutable_rows: u64,
    pub schema_mismatches: u64,
    pub rows_skipped_disabled: u64,
    pub checkpoints_saved: u64,
    pub checkpoint_errors: u64,
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_received(&self) {
        bump(&self.rows_received, 1);
    }

    pub fn commit_received(&self) {
        bump(&self.commits_received, 1);
    }

    pub fn source_reconnect(&self) {
        bump(&self.source_reconnects, 1);
    }

    pub fn batch_applied(&self, applied: u64, rejected: u64) {
        bump(&self.batches_applied, 1);
        bump(&self.operations_applied, applied);
        bump(&self.operations_rejected, rejected);
    }

    pub fn index_transport_error(&self) {
        bump(&self.index_transport_errors, 1);
    }

    pub fn translate_error(&self) {
        bump(&self.translate_errors, 1);
    }

    pub fn unroutable_row(&self) {
        bump(&self.unroutable_rows, 1);
    }

    pub fn schema_mismatch(&self) {
        bump(&self.schema_mismatches, 1);
    }

    pub fn row_skipped_disabled(&self) {
        bump(&self.rows_skipped_disabled, 1);
    }

    pub fn checkpoint_saved(&self) {
        bump(&self.checkpoints_saved, 1);
    }

    pub fn checkpoint_error(&self) {
        bump(&self.checkpoint_errors, 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            rows_received: get(&self.rows_received),
            commits_received: get(&self.commits_received),
            source_reconnects: get(&self.source_reconnects),
            operations_applied: get(&self.operations_applied),
            operations_rejected: get(&self.operations_rejected),
            batches_applied: get(&self.batches_applied),
            index_transport_errors: get(&self.index_transport_errors),
            translate_errors: get(&self.translate_errors),
            unroutable_rows: get(&self.unroutable_rows),
            schema_mismatches: get(&self.schema_mismatches),
            rows_skipped_disabled: get(&self.rows_skipped_disabled),
            checkpoints_saved: get(&self.checkpoints_saved),
            checkpoint_errors: get(&self.checkpoint_errors),
        }
    }

    /// Emit the periodic stats line.
    pub fn log_stats(&self) {
        let s = self.snapshot();
        info!(
            rows = s.rows_received,
            commits = s.commits_received,
            applied = s.operations_applied,
            rejected = s.operations_rejected,
            batches = s.batches_applied,
            transport_errors = s.index_transport_errors,
            reconnects = s.source_reconnects,
            translate_errors = s.translate_errors,
            unroutable = s.unroutable_rows,
            schema_mismatches = s.schema_mismatches,
            skipped_disabled = s.rows_skipped_disabled,
            checkpoints = s.checkpoints_saved,
            "Sync stats"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let m = SyncMetrics::new();
        m.row_received();
        m.row_received();
        m.batch_applied(5, 1);
        m.unroutable_row();
        let s = m.snapshot();
        assert_eq!(s.rows_received, 2);
        assert_eq!(s.operations_applied, 5);
        assert_eq!(s.operations_rejected, 1);
        assert_eq!(s.batches_applied, 1);
        assert_eq!(s.unroutable_rows, 1);
        assert_eq!(s.schema_mismatches, 0);
    }
}
