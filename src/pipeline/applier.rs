//! Index Applier: batching, connection state and retries.

use super::backoff::BackoffPolicy;
use super::metrics::SyncMetrics;
use super::{sleep_or_cancel, Work};
use crate::error::SyncError;
use search_sink::{coalesce, OperationResult, SearchSink};
use std::sync::Arc;
use std::time::Duration;
use sync_core::{IndexOperation, LogPosition};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Connection state of the applier towards the search engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
}

/// Outcome of one applied batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub applied: usize,
    pub rejected: usize,
}

/// Sends batches to a [`SearchSink`], retrying transport failures.
///
/// `Disconnected → Connecting → Ready`, and back to `Disconnected` on a
/// transport error. A batch is only reported once the engine answered it.
pub struct Applier {
    sink: Arc<dyn SearchSink>,
    backoff: Arc<dyn BackoffPolicy>,
    metrics: Arc<SyncMetrics>,
    state: ConnectionState,
    attempt: u32,
}

impl Applier {
    pub fn new(
        sink: Arc<dyn SearchSink>,
        backoff: Arc<dyn BackoffPolicy>,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            sink,
            backoff,
            metrics,
            state: ConnectionState::Disconnected,
            attempt: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Apply `ops` until the engine confirms them.
    ///
    /// Returns `Ok(None)` when cancelled before that happened; a cancelled
    /// token still allows one attempt. Fatal sink errors are returned.
    pub async fn apply(
        &mut self,
        ops: &[IndexOperation],
        cancel: &CancellationToken,
    ) -> Result<Option<BatchReport>, SyncError> {
        loop {
            match self.state {
                ConnectionState::Disconnected => {
                    self.state = ConnectionState::Connecting;
                }
                ConnectionState::Connecting => match self.sink.ping().await {
                    Ok(()) => {
                        info!(attempt = self.attempt, "Search index reachable");
                        self.state = ConnectionState::Ready;
                    }
                    Err(e) if e.is_transient() => {
                        warn!(attempt = self.attempt, error = %e, "Search index unreachable");
                        self.metrics.index_transport_error();
                        self.state = ConnectionState::Disconnected;
                        if !self.wait(cancel).await {
                            return Ok(None);
                        }
                    }
                    Err(e) => return Err(e.into()),
                },
                ConnectionState::Ready => match self.sink.bulk(ops).await {
                    Ok(results) => {
                        self.attempt = 0;
                        return Ok(Some(self.tally(ops, &results)));
                    }
                    Err(e) if e.is_transient() => {
                        warn!(count = ops.len(), error = %e, "Bulk request failed, will retry");
                        self.metrics.index_transport_error();
                        self.state = ConnectionState::Disconnected;
                        if !self.wait(cancel).await {
                            return Ok(None);
                        }
                    }
                    Err(e) => return Err(e.into()),
                },
            }
        }
    }

    async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        let delay = self.backoff.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        debug!(delay_ms = delay.as_millis() as u64, "Backing off");
        sleep_or_cancel(delay, cancel).await
    }

    fn tally(&self, ops: &[IndexOperation], results: &[OperationResult]) -> BatchReport {
        let mut report = BatchReport::default();
        for (op, result) in ops.iter().zip(results) {
            match result {
                OperationResult::Applied => report.applied += 1,
                OperationResult::Failed { status, reason } => {
                    warn!(
                        index = %op.key().index,
                        id = %op.key().id,
                        action = op.action(),
                        status,
                        reason = %reason,
                        "Document rejected by search index"
                    );
                    report.rejected += 1;
                }
            }
        }
        self.metrics
            .batch_applied(report.applied as u64, report.rejected as u64);
        report
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BatchSettings {
    pub batch_size: usize,
    pub flush_interval: Duration,
}

/// Work queued since the last flush.
#[derive(Default)]
struct PendingBatch {
    ops: Vec<IndexOperation>,
    commit: Option<LogPosition>,
    deadline: Option<Instant>,
}

impl PendingBatch {
    fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Drain work items into batches until the queue closes.
///
/// A batch is flushed at `batch_size` operations or `flush_interval` after
/// its first item. Commit markers are published on `confirmed` once every
/// operation queued before them is applied.
pub(crate) async fn run_applier(
    mut applier: Applier,
    settings: BatchSettings,
    mut rx: mpsc::Receiver<Work>,
    confirmed: watch::Sender<LogPosition>,
    cancel: CancellationToken,
) -> Result<(), SyncError> {
    let mut batch = PendingBatch::default();

    loop {
        let deadline = batch.deadline;
        tokio::select! {
            item = rx.recv() => match item {
                Some(Work::Ops { position, ops }) => {
                    debug!(position = %position, count = ops.len(), "Queued operations");
                    if batch.is_empty() {
                        batch.deadline = Some(Instant::now() + settings.flush_interval);
                    }
                    batch.ops.extend(ops);
                    if batch.ops.len() >= settings.batch_size
                        && !flush(&mut applier, &mut batch, &confirmed, &cancel).await?
                    {
                        return Ok(());
                    }
                }
                Some(Work::Commit(position)) => {
                    if batch.is_empty() {
                        confirmed.send_replace(position);
                    } else {
                        batch.commit = Some(position);
                    }
                }
                None => {
                    if !batch.is_empty() {
                        flush(&mut applier, &mut batch, &confirmed, &cancel).await?;
                    }
                    return Ok(());
                }
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if !flush(&mut applier, &mut batch, &confirmed, &cancel).await? {
                    return Ok(());
                }
            }
        }
    }
}

/// Apply the pending batch. Returns false if shutdown interrupted it.
async fn flush(
    applier: &mut Applier,
    batch: &mut PendingBatch,
    confirmed: &watch::Sender<LogPosition>,
    cancel: &CancellationToken,
) -> Result<bool, SyncError> {
    let queued = std::mem::take(&mut batch.ops);
    let commit = batch.commit.take();
    batch.deadline = None;

    let ops = coalesce(queued);
    match applier.apply(&ops, cancel).await? {
        Some(report) => {
            debug!(
                applied = report.applied,
                rejected = report.rejected,
                "Batch applied"
            );
            if let Some(commit) = commit {
                confirmed.send_replace(commit);
            }
            Ok(true)
        }
        None => {
            warn!(
                count = ops.len(),
                "Shutting down before the batch was confirmed; it will be replayed on restart"
            );
            Ok(false)
        }
    }
}
