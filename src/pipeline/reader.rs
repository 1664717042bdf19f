//! Reader stage: binlog subscription with reconnects.

use super::backoff::BackoffPolicy;
use super::metrics::SyncMetrics;
use super::sleep_or_cancel;
use crate::error::SyncError;
use search_sync_mysql_binlog_source::{IncrementalSource, SourceEvent};
use std::sync::Arc;
use sync_core::LogPosition;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Stream source events into `tx` until cancelled or a fatal error.
///
/// Connection failures reopen the stream at the last commit marker handed
/// downstream. Events at or before the last position already sent are
/// dropped, so a reopen never duplicates work.
pub(crate) async fn run_reader(
    source: Arc<dyn IncrementalSource>,
    start: LogPosition,
    tx: mpsc::Sender<SourceEvent>,
    backoff: Arc<dyn BackoffPolicy>,
    metrics: Arc<SyncMetrics>,
    cancel: CancellationToken,
) -> Result<(), SyncError> {
    let mut resume = start.clone();
    let mut last_sent = start;
    let mut attempt: u32 = 0;

    loop {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            opened = source.open(&resume) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => {
                info!(position = %resume, source = source.source_type(), "Subscribed to change stream");
                stream
            }
            Err(e) if e.is_transient() => {
                warn!(position = %resume, error = %e, "Failed to open change stream");
                metrics.source_reconnect();
                if !sleep_or_cancel(backoff.delay(attempt), &cancel).await {
                    return Ok(());
                }
                attempt = attempt.saturating_add(1);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                item = stream.next() => item,
            };
            let event = match item {
                Some(Ok(event)) => event,
                Some(Err(e)) if e.is_transient() => {
                    warn!(position = %resume, error = %e, "Change stream interrupted");
                    break;
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    warn!(position = %resume, "Change stream ended");
                    break;
                }
            };
            attempt = 0;

            if *event.position() <= last_sent {
                debug!(position = %event.position(), "Skipping already forwarded event");
                continue;
            }
            last_sent = event.position().clone();
            let commit = match &event {
                SourceEvent::Row(_) => {
                    metrics.row_received();
                    None
                }
                SourceEvent::Commit(position) => {
                    metrics.commit_received();
                    Some(position.clone())
                }
                SourceEvent::SchemaMismatch { .. } => None,
            };

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                sent = tx.send(event) => sent,
            };
            if sent.is_err() {
                // Downstream stopped.
                return Ok(());
            }
            if let Some(commit) = commit {
                resume = commit;
            }
        }

        metrics.source_reconnect();
        if !sleep_or_cancel(backoff.delay(attempt), &cancel).await {
            return Ok(());
        }
        attempt = attempt.saturating_add(1);
    }
}
