//! Continuous sync pipeline.
//!
//! Three tasks joined by bounded queues:
//!
//! ```text
//! reader ──SourceEvent──▶ translator ──Work──▶ applier ──confirmed──▶ checkpoint
//! ```
//!
//! The reader stops consuming the binlog when the queues are full, so an
//! unreachable search engine never causes events to be dropped. Only this
//! module writes the incremental checkpoint, and only positions confirmed by
//! the applier.

pub mod applier;
pub mod backoff;
pub mod metrics;
mod reader;
mod translator;
pub mod tracker;

use crate::config::PipelineConfig;
use crate::error::SyncError;
use applier::{Applier, BatchSettings};
use backoff::BackoffPolicy;
use checkpoint::{Loaded, SyncManager, SyncPhase};
use index_mapping::Translator;
use metrics::SyncMetrics;
use search_sink::SearchSink;
use search_sync_mysql_binlog_source::{IncrementalSource, MySQLBinlogCheckpoint};
use std::sync::Arc;
use std::time::Duration;
use sync_core::{IndexOperation, LogPosition};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinError;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracker::CheckpointTracker;
use tracing::{info, warn};

/// Item passed from the translator to the applier.
#[derive(Debug)]
pub(crate) enum Work {
    /// Operations produced by one row event.
    Ops {
        position: LogPosition,
        ops: Vec<IndexOperation>,
    },
    /// Transaction boundary; confirmed once everything before it is applied.
    Commit(LogPosition),
}

/// Sleep for `delay`. Returns false if cancelled first.
pub(crate) async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub queue_capacity: usize,
    pub checkpoint_interval: Duration,
    pub stats_interval: Duration,
}

impl From<&PipelineConfig> for PipelineSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            flush_interval: config.flush_interval,
            queue_capacity: config.queue_capacity,
            checkpoint_interval: config.checkpoint_interval,
            stats_interval: config.stats_interval,
        }
    }
}

/// A configured sync run: source, mapping, sink and checkpoint store.
pub struct Pipeline {
    source: Arc<dyn IncrementalSource>,
    sink: Arc<dyn SearchSink>,
    translator: Arc<Translator>,
    checkpoints: SyncManager,
    settings: PipelineSettings,
    backoff: Arc<dyn BackoffPolicy>,
    metrics: Arc<SyncMetrics>,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn IncrementalSource>,
        sink: Arc<dyn SearchSink>,
        translator: Translator,
        checkpoints: SyncManager,
        settings: PipelineSettings,
        backoff: Arc<dyn BackoffPolicy>,
    ) -> Self {
        Self {
            source,
            sink,
            translator: Arc::new(translator),
            checkpoints,
            settings,
            backoff,
            metrics: Arc::new(SyncMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<SyncMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run until `cancel` fires or a fatal error occurs.
    ///
    /// `start` must be a commit position; nothing at or before it is applied.
    /// On the way out the highest confirmed commit position is saved once and
    /// returned.
    pub async fn run(
        self,
        start: LogPosition,
        cancel: CancellationToken,
    ) -> Result<LogPosition, SyncError> {
        let settings = self.settings.clone();
        let stop = cancel.child_token();
        let (event_tx, event_rx) = mpsc::channel(settings.queue_capacity);
        let (work_tx, work_rx) = mpsc::channel(settings.queue_capacity);
        let (confirmed_tx, mut confirmed_rx) = watch::channel(start.clone());

        info!(
            position = %start,
            source = self.source.source_type(),
            tables = ?self.translator.tables(),
            batch_size = settings.batch_size,
            "Starting sync pipeline"
        );

        let mut reader_task = tokio::spawn(reader::run_reader(
            Arc::clone(&self.source),
            start.clone(),
            event_tx,
            Arc::clone(&self.backoff),
            Arc::clone(&self.metrics),
            stop.clone(),
        ));
        let translator_task = tokio::spawn(translator::run_translator(
            Arc::clone(&self.translator),
            event_rx,
            work_tx,
            Arc::clone(&self.metrics),
        ));
        let mut applier_task = tokio::spawn(applier::run_applier(
            Applier::new(
                Arc::clone(&self.sink),
                Arc::clone(&self.backoff),
                Arc::clone(&self.metrics),
            ),
            BatchSettings {
                batch_size: settings.batch_size,
                flush_interval: settings.flush_interval,
            },
            work_rx,
            confirmed_tx,
            stop.clone(),
        ));

        let mut tracker = CheckpointTracker::new(start);
        let mut checkpoint_tick = interval_at(
            Instant::now() + settings.checkpoint_interval,
            settings.checkpoint_interval,
        );
        checkpoint_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats_tick = interval_at(
            Instant::now() + settings.stats_interval,
            settings.stats_interval,
        );
        stats_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut reader_result: Option<Result<(), SyncError>> = None;
        let applier_result = loop {
            tokio::select! {
                joined = &mut applier_task => break stage_result("applier", joined),
                joined = &mut reader_task, if reader_result.is_none() => {
                    let result = stage_result("reader", joined);
                    if result.is_err() {
                        // Drain what is queued, then stop.
                        stop.cancel();
                    }
                    reader_result = Some(result);
                }
                _ = checkpoint_tick.tick() => {
                    tracker.confirm(&confirmed_rx.borrow_and_update());
                    self.save_due(&mut tracker).await;
                }
                _ = stats_tick.tick() => self.metrics.log_stats(),
            }
        };

        stop.cancel();
        let reader_result = match reader_result {
            Some(result) => result,
            None => stage_result("reader", reader_task.await),
        };
        if let Err(e) = translator_task.await {
            warn!(error = %e, "Translator task failed");
        }

        tracker.confirm(&confirmed_rx.borrow());
        let confirmed = tracker.confirmed().clone();
        let saved = self
            .checkpoints
            .save(
                &MySQLBinlogCheckpoint::new(confirmed.clone()),
                SyncPhase::Incremental,
            )
            .await
            .map_err(SyncError::Checkpoint);
        if saved.is_ok() {
            self.metrics.checkpoint_saved();
        }
        self.metrics.log_stats();

        reader_result?;
        applier_result?;
        saved?;
        info!(position = %confirmed, "Sync pipeline stopped");
        Ok(confirmed)
    }

    /// Persist the confirmed position if it moved. Failures are retried on the next tick.
    async fn save_due(&self, tracker: &mut CheckpointTracker) {
        let Some(position) = tracker.due().cloned() else {
            return;
        };
        match self
            .checkpoints
            .save(
                &MySQLBinlogCheckpoint::new(position.clone()),
                SyncPhase::Incremental,
            )
            .await
        {
            Ok(()) => {
                tracker.mark_saved(&position);
                self.metrics.checkpoint_saved();
            }
            Err(e) => {
                self.metrics.checkpoint_error();
                warn!(position = %position, error = %e, "Failed to save checkpoint");
            }
        }
    }
}

fn stage_result(
    stage: &str,
    joined: Result<Result<(), SyncError>, JoinError>,
) -> Result<(), SyncError> {
    joined.map_err(|e| SyncError::Other(anyhow::anyhow!("{stage} task failed: {e}")))?
}

/// Position to resume from.
///
/// The incremental checkpoint of the configured generation wins. Without one
/// the run starts at the bootstrap marker captured before the bulk reindex.
pub async fn resolve_start(checkpoints: &SyncManager) -> Result<LogPosition, SyncError> {
    let incremental = checkpoints
        .load::<MySQLBinlogCheckpoint>(SyncPhase::Incremental)
        .await
        .map_err(SyncError::Checkpoint)?;
    match incremental {
        Loaded::Current(checkpoint) => {
            info!(position = %checkpoint.position, "Resuming from incremental checkpoint");
            return Ok(checkpoint.position);
        }
        Loaded::NotInitialized => {
            info!("No incremental checkpoint yet, starting from the bootstrap marker");
        }
        Loaded::OtherGeneration { found } => {
            warn!(
                found = %found,
                generation = checkpoints.generation(),
                "Incremental checkpoint belongs to another generation, starting from the bootstrap marker"
            );
        }
    }

    let marker = checkpoints
        .load::<MySQLBinlogCheckpoint>(SyncPhase::FullSyncStart)
        .await
        .map_err(SyncError::Checkpoint)?;
    match marker {
        Loaded::Current(marker) => Ok(marker.position),
        Loaded::NotInitialized => Err(SyncError::config(
            "no bootstrap marker found; run mark-bootstrap before the bulk reindex",
        )),
        Loaded::OtherGeneration { found } => Err(SyncError::config(format!(
            "bootstrap marker was written for generation '{found}', not '{}'; run mark-bootstrap",
            checkpoints.generation()
        ))),
    }
}
