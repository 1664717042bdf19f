//! Translator stage: source events → index work items.

use super::metrics::SyncMetrics;
use super::Work;
use index_mapping::{TranslateError, Translator};
use search_sync_mysql_binlog_source::SourceEvent;
use std::collections::HashSet;
use std::sync::Arc;
use sync_core::IndexOperation;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Translate events until the reader's queue closes or the applier goes away.
///
/// A schema mismatch reported by the reader, or a row missing projected
/// columns, disables the table for the rest of the run; other tables keep
/// flowing. A row updated to an unroutable value is skipped, but the document
/// it was indexed under is still deleted.
pub(crate) async fn run_translator(
    translator: Arc<Translator>,
    mut rx: mpsc::Receiver<SourceEvent>,
    tx: mpsc::Sender<Work>,
    metrics: Arc<SyncMetrics>,
) {
    let mut disabled: HashSet<String> = HashSet::new();

    while let Some(event) = rx.recv().await {
        let work = match event {
            SourceEvent::Row(row) => {
                if disabled.contains(&row.table) {
                    metrics.row_skipped_disabled();
                    continue;
                }
                match translator.translate(&row) {
                    Ok(ops) if ops.is_empty() => continue,
                    Ok(ops) => Work::Ops {
                        position: row.position,
                        ops,
                    },
                    Err(e @ TranslateError::UnmappedSchema { .. }) => {
                        error!(
                            table = %row.table,
                            position = %row.position,
                            error = %e,
                            "Row no longer matches its mapping, disabling table"
                        );
                        metrics.schema_mismatch();
                        disabled.insert(row.table);
                        continue;
                    }
                    Err(e @ TranslateError::Unroutable { .. }) => {
                        warn!(table = %row.table, position = %row.position, error = %e, "Skipping unroutable row");
                        metrics.unroutable_row();
                        let TranslateError::Unroutable { stale: Some(stale), .. } = e else {
                            continue;
                        };
                        Work::Ops {
                            position: row.position,
                            ops: vec![IndexOperation::delete(stale)],
                        }
                    }
                    Err(e) => {
                        warn!(
                            table = %row.table,
                            position = %row.position,
                            kind = e.kind(),
                            error = %e,
                            "Skipping untranslatable row"
                        );
                        metrics.translate_error();
                        continue;
                    }
                }
            }
            SourceEvent::Commit(position) => Work::Commit(position),
            SourceEvent::SchemaMismatch {
                table,
                position,
                detail,
            } => {
                error!(table = %table, position = %position, detail = %detail, "Schema mismatch, disabling table");
                metrics.schema_mismatch();
                disabled.insert(table);
                continue;
            }
        };

        if tx.send(work).await.is_err() {
            break;
        }
    }
}
