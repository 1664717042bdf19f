//! Shared fixtures for the pipeline integration tests.

#![allow(dead_code)]

use checkpoint::{MemoryStore, SyncManager, SyncPhase};
use index_mapping::{FieldMapping, FieldType, IndexTarget, RoutedIndex, TableMapping, Translator};
use search_sink::testing::MemorySink;
use search_sync::error::SyncError;
use search_sync::pipeline::backoff::ExponentialBackoff;
use search_sync::pipeline::metrics::SyncMetrics;
use search_sync::{Pipeline, PipelineSettings};
use search_sync_mysql_binlog_source::testing::ScriptedSource;
use search_sync_mysql_binlog_source::{MySQLBinlogCheckpoint, SourceEvent};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use sync_core::{LogPosition, RowChangeEvent, RowImage, UniversalValue};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const GENERATION: &str = "test";

pub fn pos(offset: u64) -> LogPosition {
    LogPosition::new("mysql-bin.000001", offset)
}

pub fn row_pos(offset: u64) -> LogPosition {
    pos(offset).with_row(1)
}

pub fn commit(offset: u64) -> SourceEvent {
    SourceEvent::Commit(pos(offset))
}

pub fn torrent(id: i64, title: &str, category: i64) -> RowImage {
    BTreeMap::from([
        ("id".to_string(), UniversalValue::Int64(id)),
        ("title".to_string(), UniversalValue::Text(title.to_string())),
        ("category".to_string(), UniversalValue::Int64(category)),
    ])
}

pub fn insert_torrent(offset: u64, id: i64, title: &str, category: i64) -> SourceEvent {
    SourceEvent::Row(RowChangeEvent::insert(
        "torrents",
        "id",
        UniversalValue::Int64(id),
        torrent(id, title, category),
        row_pos(offset),
    ))
}

pub fn update_torrent(offset: u64, before: RowImage, after: RowImage) -> SourceEvent {
    let id = after.get("id").cloned().unwrap_or(UniversalValue::Null);
    SourceEvent::Row(RowChangeEvent::update(
        "torrents",
        "id",
        id,
        before,
        after,
        row_pos(offset),
    ))
}

pub fn delete_torrent(offset: u64, before: RowImage) -> SourceEvent {
    let id = before.get("id").cloned().unwrap_or(UniversalValue::Null);
    SourceEvent::Row(RowChangeEvent::delete(
        "torrents",
        "id",
        id,
        before,
        row_pos(offset),
    ))
}

pub fn statistics(offset: u64, id: i64, torrent_id: i64, seeders: Option<i64>) -> SourceEvent {
    let mut row = BTreeMap::from([
        ("id".to_string(), UniversalValue::Int64(id)),
        ("torrent_id".to_string(), UniversalValue::Int64(torrent_id)),
        ("leech_count".to_string(), UniversalValue::Int64(0)),
    ]);
    if let Some(seeders) = seeders {
        row.insert("seed_count".to_string(), UniversalValue::Int64(seeders));
    }
    SourceEvent::Row(RowChangeEvent::insert(
        "statistics",
        "id",
        UniversalValue::Int64(id),
        row,
        row_pos(offset),
    ))
}

pub fn untracked(offset: u64, id: i64) -> SourceEvent {
    SourceEvent::Row(RowChangeEvent::insert(
        "comments",
        "id",
        UniversalValue::Int64(id),
        BTreeMap::from([("id".to_string(), UniversalValue::Int64(id))]),
        row_pos(offset),
    ))
}

/// `torrents` routed by category (1 → anime, 2 → audio) plus partial
/// `statistics` rows updating the anime documents.
pub fn mappings() -> Vec<TableMapping> {
    vec![
        TableMapping::document(
            "torrents",
            IndexTarget::Routed(RoutedIndex {
                column: "category".into(),
                mask: None,
                indices: BTreeMap::from([
                    ("1".to_string(), "anime".to_string()),
                    ("2".to_string(), "audio".to_string()),
                ]),
                default: None,
            }),
            vec![
                FieldMapping::new("title", FieldType::Text),
                FieldMapping::new("category", FieldType::Long),
            ],
        ),
        TableMapping::partial(
            "statistics",
            "torrent_id",
            "torrents",
            "anime",
            vec![
                FieldMapping::new("seed_count", FieldType::Long),
                FieldMapping::new("leech_count", FieldType::Long),
            ],
        ),
    ]
}

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        batch_size: 100,
        flush_interval: Duration::from_millis(50),
        queue_capacity: 4,
        checkpoint_interval: Duration::from_secs(3600),
        stats_interval: Duration::from_secs(3600),
    }
}

/// A scripted source, an in-memory index and an in-memory checkpoint store.
pub struct Harness {
    pub source: ScriptedSource,
    pub sink: MemorySink,
    pub store: Arc<MemoryStore>,
    pub checkpoints: SyncManager,
    pub settings: PipelineSettings,
}

/// A pipeline running in a background task.
pub struct Running {
    pub cancel: CancellationToken,
    pub metrics: Arc<SyncMetrics>,
    pub handle: JoinHandle<Result<LogPosition, SyncError>>,
}

impl Running {
    /// Cancel and wait for the pipeline to stop.
    pub async fn stop(self) -> Result<LogPosition, SyncError> {
        self.cancel.cancel();
        self.join().await
    }

    pub async fn join(self) -> Result<LogPosition, SyncError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => panic!("pipeline task panicked: {e}"),
        }
    }
}

impl Harness {
    pub fn new(source: ScriptedSource) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            source,
            sink: MemorySink::new(),
            checkpoints: SyncManager::new(store.clone(), GENERATION),
            store,
            settings: settings(),
        }
    }

    pub fn start(&self, from: LogPosition) -> Running {
        let pipeline = Pipeline::new(
            Arc::new(self.source.clone()),
            Arc::new(self.sink.clone()),
            Translator::new(mappings()).unwrap(),
            self.checkpoints.clone(),
            self.settings.clone(),
            Arc::new(
                ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1), 2.0)
                    .without_jitter(),
            ),
        );
        let cancel = CancellationToken::new();
        let metrics = pipeline.metrics();
        let handle = tokio::spawn(pipeline.run(from, cancel.clone()));
        Running {
            cancel,
            metrics,
            handle,
        }
    }

    pub async fn saved_position(&self) -> Option<LogPosition> {
        self.checkpoints
            .load::<MySQLBinlogCheckpoint>(SyncPhase::Incremental)
            .await
            .unwrap()
            .current()
            .map(|c| c.position)
    }
}

/// Let the paused clock run until every stage is idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_secs(1)).await;
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..6000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within a minute of virtual time");
}
