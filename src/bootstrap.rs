//! Initial index load.
//!
//! `mark-bootstrap` records the binlog position before an external export is
//! taken. `bootstrap` then loads that export (one `{"table": ..., "row": {...}}`
//! object per line) through the applier and seeds the incremental checkpoint
//! with the marker, so streaming picks up exactly where the export began.
//!
//! Partial-table rows only update documents that already exist, so an export
//! lists parent tables before their child tables.

use crate::error::SyncError;
use crate::pipeline::applier::Applier;
use anyhow::anyhow;
use checkpoint::{Loaded, SyncManager, SyncPhase};
use index_mapping::Translator;
use search_sink::coalesce;
use search_sync_mysql_binlog_source::{IncrementalSource, MySQLBinlogCheckpoint};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use sync_core::{IndexOperation, LogPosition, RowImage, UniversalValue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct ExportRecord {
    table: String,
    row: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    /// Key column for tables whose mapping names none.
    pub primary_key_column: String,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapSummary {
    pub rows: u64,
    pub operations: u64,
    pub skipped: u64,
    pub rejected: u64,
}

/// Capture the source's current position as the bootstrap marker.
pub async fn mark_bootstrap(
    source: &dyn IncrementalSource,
    checkpoints: &SyncManager,
) -> Result<LogPosition, SyncError> {
    let position = source.current_position().await?;
    checkpoints
        .save(
            &MySQLBinlogCheckpoint::new(position.clone()),
            SyncPhase::FullSyncStart,
        )
        .await
        .map_err(SyncError::Checkpoint)?;
    info!(position = %position, generation = checkpoints.generation(), "Recorded bootstrap marker");
    Ok(position)
}

/// Load an export and seed the incremental checkpoint with the marker.
pub async fn bootstrap<R: BufRead>(
    reader: R,
    translator: &Translator,
    applier: &mut Applier,
    checkpoints: &SyncManager,
    options: &BootstrapOptions,
    cancel: &CancellationToken,
) -> Result<BootstrapSummary, SyncError> {
    let marker = match checkpoints
        .load::<MySQLBinlogCheckpoint>(SyncPhase::FullSyncStart)
        .await
        .map_err(SyncError::Checkpoint)?
    {
        Loaded::Current(marker) => marker,
        Loaded::NotInitialized | Loaded::OtherGeneration { .. } => {
            return Err(SyncError::config(
                "no bootstrap marker for this generation; run mark-bootstrap before exporting",
            ))
        }
    };

    let summary = load_export(reader, translator, applier, options, cancel).await?;

    checkpoints
        .save(&marker, SyncPhase::Incremental)
        .await
        .map_err(SyncError::Checkpoint)?;
    info!(
        rows = summary.rows,
        operations = summary.operations,
        skipped = summary.skipped,
        rejected = summary.rejected,
        position = %marker.position,
        "Bootstrap complete"
    );
    Ok(summary)
}

/// Translate and apply every row of an export.
pub async fn load_export<R: BufRead>(
    reader: R,
    translator: &Translator,
    applier: &mut Applier,
    options: &BootstrapOptions,
    cancel: &CancellationToken,
) -> Result<BootstrapSummary, SyncError> {
    let mut summary = BootstrapSummary::default();
    let mut batch: Vec<IndexOperation> = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line.map_err(|e| SyncError::Other(anyhow!("Error reading line {line_number}: {e}")))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ExportRecord = serde_json::from_str(&line)
            .map_err(|e| SyncError::Other(anyhow!("Error parsing JSON at line {line_number}: {e}")))?;
        summary.rows += 1;

        let row: RowImage = record
            .row
            .into_iter()
            .map(|(column, value)| (column, UniversalValue::from_json(value)))
            .collect();
        match translator.translate_row(&record.table, &options.primary_key_column, &row) {
            Ok(ops) if ops.is_empty() => summary.skipped += 1,
            Ok(ops) => batch.extend(ops),
            Err(e) => {
                warn!(line = line_number, table = %record.table, error = %e, "Skipping export row");
                summary.skipped += 1;
            }
        }

        if batch.len() >= options.batch_size {
            flush(&mut batch, applier, &mut summary, cancel).await?;
        }
    }
    if !batch.is_empty() {
        flush(&mut batch, applier, &mut summary, cancel).await?;
    }
    Ok(summary)
}

async fn flush(
    batch: &mut Vec<IndexOperation>,
    applier: &mut Applier,
    summary: &mut BootstrapSummary,
    cancel: &CancellationToken,
) -> Result<(), SyncError> {
    let ops = coalesce(std::mem::take(batch));
    let Some(report) = applier.apply(&ops, cancel).await? else {
        return Err(SyncError::Other(anyhow!(
            "bootstrap interrupted; the checkpoint was not initialized"
        )));
    };
    summary.operations += report.applied as u64;
    summary.rejected += report.rejected as u64;
    debug!(count = ops.len(), total = summary.operations, "Applied bootstrap batch");
    Ok(())
}
