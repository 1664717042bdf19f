//! Binlog decoding state machine.
//!
//! Turns a sequence of [`BinlogFrame`]s into [`SourceEvent`]s: filters
//! untracked tables, names row values with cached column metadata, and emits
//! commit markers at transaction boundaries.

use mysql_async::Value;
use mysql_types::MySQLValueWithSchema;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use sync_core::{LogPosition, RowChangeEvent, RowImage, TableDefinition, UniversalValue};
use tracing::{debug, info, warn};

use crate::frame::{BinlogFrame, RowPair, RowsKind};
use crate::schema::{ddl_tokens, ColumnFetcher, SchemaCache};
use crate::{SourceError, SourceEvent};

#[derive(Debug, Clone)]
struct TableRef {
    database: String,
    table: String,
    column_count: usize,
}

/// Stateful decoder for one replication session.
pub struct BinlogDecoder {
    fetcher: Arc<dyn ColumnFetcher>,
    database: String,
    tracked: HashSet<String>,
    progress_every: u64,

    file: String,
    table_ids: HashMap<u64, TableRef>,
    schemas: SchemaCache,
    /// Tables reported as mismatched, with the table id they were reported for
    mismatched: HashMap<String, u64>,
    /// Current transaction produced at least one row event
    tx_rows: bool,
    /// Untracked events seen since the last commit marker
    untracked: u64,
}

impl BinlogDecoder {
    pub fn new(
        fetcher: Arc<dyn ColumnFetcher>,
        database: impl Into<String>,
        tracked: impl IntoIterator<Item = String>,
        progress_every: u64,
        start: &LogPosition,
    ) -> Self {
        Self {
            fetcher,
            database: database.into(),
            tracked: tracked.into_iter().collect(),
            progress_every,
            file: start.file.clone(),
            table_ids: HashMap::new(),
            schemas: SchemaCache::default(),
            mismatched: HashMap::new(),
            tx_rows: false,
            untracked: 0,
        }
    }

    /// Current binlog file name.
    pub fn file(&self) -> &str {
        &self.file
    }

    fn is_tracked(&self, database: &str, table: &str) -> bool {
        database == self.database && self.tracked.contains(table)
    }

    /// Feed one frame, returning the events it completes.
    pub async fn handle(&mut self, frame: BinlogFrame) -> Result<Vec<SourceEvent>, SourceError> {
        match frame {
            BinlogFrame::Rotate { file, offset } => {
                if !file.is_empty() && file != self.file {
                    info!(file = %file, offset, "Binlog rotated");
                    self.file = file;
                }
                Ok(Vec::new())
            }

            BinlogFrame::TableMap {
                table_id,
                database,
                table,
                column_count,
            } => {
                if self.is_tracked(&database, &table) {
                    if self.schemas.invalidate_if_stale(&table, table_id) {
                        debug!(table = %table, table_id, "Table id changed, schema will be refetched");
                    }
                } else {
                    self.untracked += 1;
                }
                self.table_ids.insert(
                    table_id,
                    TableRef {
                        database,
                        table,
                        column_count,
                    },
                );
                Ok(Vec::new())
            }

            BinlogFrame::Rows {
                table_id,
                kind,
                end_offset,
                rows,
            } => self.handle_rows(table_id, kind, end_offset, rows).await,

            BinlogFrame::Xid { end_offset } => Ok(self.boundary(end_offset)),

            BinlogFrame::Query {
                database,
                query,
                end_offset,
            } => Ok(self.handle_query(&database, &query, end_offset)),

            BinlogFrame::Other { end_offset } => {
                if end_offset > 0 {
                    self.untracked += 1;
                }
                Ok(Vec::new())
            }
        }
    }

    async fn handle_rows(
        &mut self,
        table_id: u64,
        kind: RowsKind,
        end_offset: u64,
        rows: Vec<RowPair>,
    ) -> Result<Vec<SourceEvent>, SourceError> {
        let tref = self.table_ids.get(&table_id).cloned().ok_or_else(|| {
            SourceError::Protocol(format!(
                "rows event for unknown table id {table_id} at {}:{end_offset}",
                self.file
            ))
        })?;

        if !self.is_tracked(&tref.database, &tref.table)
            || self.mismatched.get(&tref.table) == Some(&table_id)
        {
            self.untracked += 1;
            return Ok(Vec::new());
        }

        let definition = match self.schema_for(&tref, table_id).await? {
            Ok(definition) => definition,
            Err(detail) => {
                let position = LogPosition::new(self.file.clone(), end_offset);
                warn!(
                    table = %tref.table,
                    position = %position,
                    "Schema mismatch, table disabled: {detail}"
                );
                self.mismatched.insert(tref.table.clone(), table_id);
                self.untracked += 1;
                return Ok(vec![SourceEvent::SchemaMismatch {
                    table: tref.table,
                    position,
                    detail,
                }]);
            }
        };

        let mut events = Vec::with_capacity(rows.len());
        for (ordinal, pair) in rows.into_iter().enumerate() {
            let position =
                LogPosition::new(self.file.clone(), end_offset).with_row(ordinal as u32 + 1);
            let event = row_event(&definition, kind, pair, position)?;
            events.push(SourceEvent::Row(event));
        }

        if !events.is_empty() {
            self.tx_rows = true;
        }
        Ok(events)
    }

    /// Column metadata matching the table map's width, refetching if needed.
    ///
    /// The inner `Err` carries a mismatch description.
    async fn schema_for(
        &mut self,
        tref: &TableRef,
        table_id: u64,
    ) -> Result<Result<Arc<TableDefinition>, String>, SourceError> {
        if let Some(definition) = self
            .schemas
            .get_valid(&tref.table, table_id, tref.column_count)
        {
            return Ok(Ok(definition));
        }

        debug!(table = %tref.table, table_id, "Fetching column metadata");
        let Some(definition) = self
            .fetcher
            .fetch_table(&tref.database, &tref.table)
            .await?
        else {
            return Ok(Err(format!(
                "table {}.{} no longer exists",
                tref.database, tref.table
            )));
        };

        if definition.column_count() != tref.column_count {
            return Ok(Err(format!(
                "binlog rows carry {} columns, INFORMATION_SCHEMA lists {}",
                tref.column_count,
                definition.column_count()
            )));
        }
        if definition.get_column(definition.key_column()).is_none() {
            return Ok(Err(format!(
                "key column '{}' not found",
                definition.key_column()
            )));
        }

        let definition = Arc::new(definition);
        self.schemas.insert(table_id, Arc::clone(&definition));
        Ok(Ok(definition))
    }

    fn handle_query(&mut self, database: &str, query: &str, end_offset: u64) -> Vec<SourceEvent> {
        let trimmed = query.trim();
        if trimmed.eq_ignore_ascii_case("BEGIN") {
            return Vec::new();
        }
        if trimmed.eq_ignore_ascii_case("COMMIT") {
            // Non-transactional engines commit with a statement instead of an XID
            return self.boundary(end_offset);
        }

        if let Some(tokens) = ddl_tokens(trimmed) {
            let touched: Vec<String> = self
                .tracked
                .iter()
                .filter(|t| tokens.iter().any(|tok| tok == *t))
                .cloned()
                .collect();
            for table in touched {
                info!(database, table = %table, "DDL on tracked table, schema will be refetched");
                self.schemas.invalidate(&table);
                self.mismatched.remove(&table);
            }
            // DDL commits implicitly
            return self.boundary(end_offset);
        }

        self.untracked += 1;
        Vec::new()
    }

    fn boundary(&mut self, end_offset: u64) -> Vec<SourceEvent> {
        let position = LogPosition::new(self.file.clone(), end_offset);
        if self.tx_rows {
            self.tx_rows = false;
            self.untracked = 0;
            return vec![SourceEvent::Commit(position)];
        }

        self.untracked += 1;
        if self.progress_every > 0 && self.untracked >= self.progress_every {
            self.untracked = 0;
            return vec![SourceEvent::Commit(position)];
        }
        Vec::new()
    }
}

fn row_event(
    definition: &TableDefinition,
    kind: RowsKind,
    pair: RowPair,
    position: LogPosition,
) -> Result<RowChangeEvent, SourceError> {
    let key_column = definition.key_column().to_string();
    let table = definition.name.clone();

    let before = pair.before.map(|v| image(definition, v)).transpose()?;
    let after = pair.after.map(|v| image(definition, v)).transpose()?;

    let key_of = |img: &RowImage| img.get(&key_column).cloned().unwrap_or(UniversalValue::Null);

    let event = match (kind, before, after) {
        (RowsKind::Write, _, Some(after)) => {
            let pk = key_of(&after);
            RowChangeEvent::insert(table, key_column, pk, after, position)
        }
        (RowsKind::Update, Some(before), Some(after)) => {
            let pk = key_of(&after);
            RowChangeEvent::update(table, key_column, pk, before, after, position)
        }
        (RowsKind::Delete, Some(before), _) => {
            let pk = key_of(&before);
            RowChangeEvent::delete(table, key_column, pk, before, position)
        }
        (kind, _, _) => {
            return Err(SourceError::Protocol(format!(
                "{kind:?} rows event for {table} at {position} is missing a row image"
            )));
        }
    };
    Ok(event)
}

fn image(definition: &TableDefinition, values: Vec<Value>) -> Result<RowImage, SourceError> {
    if values.len() != definition.column_count() {
        return Err(SourceError::Configuration(format!(
            "row image for {} has {} of {} columns; binlog_row_image must be FULL",
            definition.name,
            values.len(),
            definition.column_count()
        )));
    }

    let mut row = RowImage::new();
    for (column, value) in definition.columns.iter().zip(values) {
        let converted = MySQLValueWithSchema::new(value, column.column_type.clone())
            .to_universal_value()
            .map_err(|e| {
                SourceError::Protocol(format!("{}.{}: {e}", definition.name, column.name))
            })?;
        row.insert(column.name.clone(), converted);
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use sync_core::{ColumnDefinition, RowOp, UniversalType};

    #[derive(Default)]
    struct FakeFetcher {
        tables: Mutex<HashMap<String, TableDefinition>>,
        fetches: AtomicUsize,
    }

    impl FakeFetcher {
        fn set(&self, def: TableDefinition) {
            self.tables.lock().unwrap().insert(def.name.clone(), def);
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ColumnFetcher for FakeFetcher {
        async fn fetch_table(
            &self,
            _database: &str,
            table: &str,
        ) -> Result<Option<TableDefinition>, SourceError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.tables.lock().unwrap().get(table).cloned())
        }
    }

    fn torrents(extra: bool) -> TableDefinition {
        let mut columns = vec![
            ColumnDefinition::new("id", UniversalType::Int32 { unsigned: true }),
            ColumnDefinition::new("title", UniversalType::VarChar { length: 255 }),
            ColumnDefinition::new("category", UniversalType::Int8 { unsigned: false }),
        ];
        if extra {
            columns.push(ColumnDefinition::new("flags", UniversalType::Int32 { unsigned: true }));
        }
        TableDefinition::new("tracker", "torrents", columns, vec!["id".to_string()])
    }

    fn decoder(fetcher: Arc<FakeFetcher>, progress_every: u64) -> BinlogDecoder {
        BinlogDecoder::new(
            fetcher,
            "tracker",
            vec!["torrents".to_string()],
            progress_every,
            &LogPosition::new("mysql-bin.000001", 4),
        )
    }

    fn table_map(table_id: u64, table: &str, column_count: usize) -> BinlogFrame {
        BinlogFrame::TableMap {
            table_id,
            database: "tracker".into(),
            table: table.into(),
            column_count,
        }
    }

    fn torrent_row(id: i64, title: &str, category: i64) -> Vec<Value> {
        vec![
            Value::Int(id),
            Value::Bytes(title.as_bytes().to_vec()),
            Value::Int(category),
        ]
    }

    async fn feed(decoder: &mut BinlogDecoder, frames: Vec<BinlogFrame>) -> Vec<SourceEvent> {
        let mut out = Vec::new();
        for frame in frames {
            out.extend(decoder.handle(frame).await.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_insert_then_commit_marker() {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.set(torrents(false));
        let mut decoder = decoder(fetcher.clone(), 0);

        let events = feed(
            &mut decoder,
            vec![
                BinlogFrame::Query {
                    database: "tracker".into(),
                    query: "BEGIN".into(),
                    end_offset: 200,
                },
                table_map(71, "torrents", 3),
                BinlogFrame::Rows {
                    table_id: 71,
                    kind: RowsKind::Write,
                    end_offset: 300,
                    rows: vec![
                        RowPair::insert(torrent_row(42, "foo", 1)),
                        RowPair::insert(torrent_row(43, "bar", 2)),
                    ],
                },
                BinlogFrame::Xid { end_offset: 331 },
            ],
        )
        .await;

        assert_eq!(events.len(), 3);
        let SourceEvent::Row(first) = &events[0] else {
            panic!("expected row event, got {:?}", events[0]);
        };
        assert_eq!(first.op, RowOp::Insert);
        assert_eq!(first.table, "torrents");
        assert_eq!(first.primary_key, UniversalValue::UInt64(42));
        assert_eq!(first.position, LogPosition::new("mysql-bin.000001", 300).with_row(1));
        assert_eq!(
            first.after.as_ref().unwrap().get("title"),
            Some(&UniversalValue::Text("foo".into()))
        );
        assert_eq!(events[1].position().row, 2);
        assert_eq!(
            events[2],
            SourceEvent::Commit(LogPosition::new("mysql-bin.000001", 331))
        );
        assert_eq!(fetcher.fetches(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_images() {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.set(torrents(false));
        let mut decoder = decoder(fetcher, 0);

        let events = feed(
            &mut decoder,
            vec![
                table_map(71, "torrents", 3),
                BinlogFrame::Rows {
                    table_id: 71,
                    kind: RowsKind::Update,
                    end_offset: 500,
                    rows: vec![RowPair::update(
                        torrent_row(42, "foo", 1),
                        torrent_row(42, "foo", 2),
                    )],
                },
                BinlogFrame::Rows {
                    table_id: 71,
                    kind: RowsKind::Delete,
                    end_offset: 600,
                    rows: vec![RowPair::delete(torrent_row(42, "foo", 2))],
                },
            ],
        )
        .await;

        let SourceEvent::Row(update) = &events[0] else {
            panic!("expected update");
        };
        assert_eq!(update.op, RowOp::Update);
        assert_eq!(
            update.before.as_ref().unwrap().get("category"),
            Some(&UniversalValue::Int64(1))
        );
        assert_eq!(
            update.after.as_ref().unwrap().get("category"),
            Some(&UniversalValue::Int64(2))
        );

        let SourceEvent::Row(delete) = &events[1] else {
            panic!("expected delete");
        };
        assert_eq!(delete.op, RowOp::Delete);
        assert!(delete.after.is_none());
        assert_eq!(delete.primary_key, UniversalValue::UInt64(42));
    }

    #[tokio::test]
    async fn test_untracked_tables_only_produce_progress_markers() {
        let fetcher = Arc::new(FakeFetcher::default());
        let mut decoder = decoder(fetcher.clone(), 7);

        let mut frames = Vec::new();
        for tx in 0..3u64 {
            frames.push(table_map(90, "users", 2));
            frames.push(BinlogFrame::Rows {
                table_id: 90,
                kind: RowsKind::Write,
                end_offset: 1000 + tx * 100,
                rows: vec![RowPair::insert(vec![Value::Int(1), Value::Int(2)])],
            });
            frames.push(BinlogFrame::Xid {
                end_offset: 1050 + tx * 100,
            });
        }
        let events = feed(&mut decoder, frames).await;

        assert_eq!(
            events,
            vec![SourceEvent::Commit(LogPosition::new("mysql-bin.000001", 1250))]
        );
        assert_eq!(fetcher.fetches(), 0);
    }

    #[tokio::test]
    async fn test_other_database_is_untracked() {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.set(torrents(false));
        let mut decoder = decoder(fetcher, 0);

        let events = feed(
            &mut decoder,
            vec![
                BinlogFrame::TableMap {
                    table_id: 5,
                    database: "staging".into(),
                    table: "torrents".into(),
                    column_count: 3,
                },
                BinlogFrame::Rows {
                    table_id: 5,
                    kind: RowsKind::Write,
                    end_offset: 100,
                    rows: vec![RowPair::insert(torrent_row(1, "x", 1))],
                },
                BinlogFrame::Xid { end_offset: 131 },
            ],
        )
        .await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_rotate_changes_file_in_positions() {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.set(torrents(false));
        let mut decoder = decoder(fetcher, 0);

        let events = feed(
            &mut decoder,
            vec![
                BinlogFrame::Rotate {
                    file: "mysql-bin.000002".into(),
                    offset: 4,
                },
                table_map(71, "torrents", 3),
                BinlogFrame::Rows {
                    table_id: 71,
                    kind: RowsKind::Write,
                    end_offset: 300,
                    rows: vec![RowPair::insert(torrent_row(1, "x", 1))],
                },
                BinlogFrame::Xid { end_offset: 331 },
            ],
        )
        .await;
        assert_eq!(decoder.file(), "mysql-bin.000002");
        assert_eq!(
            events.last(),
            Some(&SourceEvent::Commit(LogPosition::new("mysql-bin.000002", 331)))
        );
    }

    #[tokio::test]
    async fn test_schema_change_refetches_and_mismatch_disables_table() {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.set(torrents(false));
        let mut decoder = decoder(fetcher.clone(), 0);

        // Column added, but INFORMATION_SCHEMA still reports the old layout
        let wide = vec![
            Value::Int(1),
            Value::Bytes(b"x".to_vec()),
            Value::Int(1),
            Value::Int(0),
        ];
        let events = feed(
            &mut decoder,
            vec![
                table_map(72, "torrents", 4),
                BinlogFrame::Rows {
                    table_id: 72,
                    kind: RowsKind::Write,
                    end_offset: 700,
                    rows: vec![RowPair::insert(wide.clone())],
                },
                BinlogFrame::Rows {
                    table_id: 72,
                    kind: RowsKind::Write,
                    end_offset: 800,
                    rows: vec![RowPair::insert(wide.clone())],
                },
            ],
        )
        .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            SourceEvent::SchemaMismatch { table, .. } if table == "torrents"
        ));
        assert_eq!(fetcher.fetches(), 1);

        // After the DDL is visible, the table comes back
        fetcher.set(torrents(true));
        let events = feed(
            &mut decoder,
            vec![
                BinlogFrame::Query {
                    database: "tracker".into(),
                    query: "ALTER TABLE torrents ADD COLUMN flags INT UNSIGNED".into(),
                    end_offset: 900,
                },
                table_map(73, "torrents", 4),
                BinlogFrame::Rows {
                    table_id: 73,
                    kind: RowsKind::Write,
                    end_offset: 1000,
                    rows: vec![RowPair::insert(wide)],
                },
            ],
        )
        .await;
        assert_eq!(events.len(), 1);
        let SourceEvent::Row(row) = &events[0] else {
            panic!("expected row after schema refresh");
        };
        assert_eq!(
            row.after.as_ref().unwrap().get("flags"),
            Some(&UniversalValue::UInt64(0))
        );
        assert_eq!(fetcher.fetches(), 2);
    }

    #[tokio::test]
    async fn test_rows_without_table_map_is_protocol_error() {
        let fetcher = Arc::new(FakeFetcher::default());
        let mut decoder = decoder(fetcher, 0);
        let err = decoder
            .handle(BinlogFrame::Rows {
                table_id: 1,
                kind: RowsKind::Write,
                end_offset: 10,
                rows: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_statement_commit_is_a_boundary() {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.set(torrents(false));
        let mut decoder = decoder(fetcher, 0);

        let events = feed(
            &mut decoder,
            vec![
                table_map(71, "torrents", 3),
                BinlogFrame::Rows {
                    table_id: 71,
                    kind: RowsKind::Write,
                    end_offset: 300,
                    rows: vec![RowPair::insert(torrent_row(5, "y", 1))],
                },
                BinlogFrame::Query {
                    database: "tracker".into(),
                    query: "COMMIT".into(),
                    end_offset: 350,
                },
            ],
        )
        .await;
        assert_eq!(
            events.last(),
            Some(&SourceEvent::Commit(LogPosition::new("mysql-bin.000001", 350)))
        );
    }
}
