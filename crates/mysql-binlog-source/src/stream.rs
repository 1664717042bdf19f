//! MySQL binlog source over the replication protocol.
//!
//! Opens a `COM_BINLOG_DUMP` session with `mysql_async`, converts each event
//! into a [`BinlogFrame`] and runs it through the [`BinlogDecoder`].

use async_trait::async_trait;
use futures::StreamExt;
use mysql_async::binlog::events::{Event, EventData, RowsEventData};
use mysql_async::binlog::row::BinlogRow;
use mysql_async::binlog::value::BinlogValue;
use mysql_async::prelude::Queryable;
use mysql_async::{BinlogStream, BinlogStreamRequest, Conn, Opts, Pool, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use sync_core::LogPosition;
use tracing::{debug, info};

use crate::checkpoint::get_current_checkpoint;
use crate::decoder::BinlogDecoder;
use crate::frame::{BinlogFrame, RowPair, RowsKind};
use crate::schema::{ColumnFetcher, InformationSchemaFetcher};
use crate::{ChangeStream, IncrementalSource, SourceError, SourceEvent, SourceOpts};

/// Binlog reader backed by a live MySQL server.
pub struct MySQLBinlogSource {
    opts: Opts,
    pool: Pool,
    source: SourceOpts,
    database: String,
    fetcher: Arc<dyn ColumnFetcher>,
}

impl MySQLBinlogSource {
    pub fn new(source: SourceOpts) -> Result<Self, SourceError> {
        let opts = Opts::from_url(&source.source_uri)
            .map_err(|e| SourceError::Configuration(format!("invalid source URI: {e}")))?;
        let database = source
            .source_database
            .clone()
            .or_else(|| opts.db_name().map(str::to_string))
            .ok_or_else(|| {
                SourceError::Configuration(
                    "source database must be set in the URI or configuration".to_string(),
                )
            })?;
        let pool = Pool::new(opts.clone());
        let fetcher = Arc::new(InformationSchemaFetcher::new(pool.clone()));

        Ok(Self {
            opts,
            pool,
            source,
            database,
            fetcher,
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    async fn conn(&self, requested: &LogPosition) -> Result<Conn, SourceError> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| SourceError::from_mysql(e, requested))
    }

    /// Refuse to run against a server whose binlog cannot be decoded into full rows.
    async fn verify_server_settings(&self, conn: &mut Conn) -> Result<(), SourceError> {
        let here = LogPosition::new("", 0);
        for (variable, expected) in [("binlog_format", "ROW"), ("binlog_row_image", "FULL")] {
            let value: Option<String> = conn
                .query_first(format!("SELECT @@GLOBAL.{variable}"))
                .await
                .map_err(|e| SourceError::from_mysql(e, &here))?;
            let value = value.unwrap_or_default();
            if !value.eq_ignore_ascii_case(expected) {
                return Err(SourceError::Configuration(format!(
                    "{variable} is '{value}', expected {expected}"
                )));
            }
        }
        Ok(())
    }

    /// Check that `from` names a retained file and an offset inside it.
    async fn verify_position(&self, conn: &mut Conn, from: &LogPosition) -> Result<(), SourceError> {
        let logs: Vec<(String, u64)> = conn
            .query_map("SHOW BINARY LOGS", |row: mysql_async::Row| {
                (
                    row.get::<String, _>(0).unwrap_or_default(),
                    row.get::<u64, _>(1).unwrap_or_default(),
                )
            })
            .await
            .map_err(|e| SourceError::from_mysql(e, from))?;

        let oldest = logs.first().map(|(name, _)| name.clone());
        let unavailable = |detail: String| SourceError::PositionUnavailable {
            requested: from.clone(),
            oldest: oldest.clone(),
            detail,
        };

        match logs.iter().find(|(name, _)| *name == from.file) {
            None => Err(unavailable(format!(
                "{} is not among the {} retained binlog files",
                from.file,
                logs.len()
            ))),
            Some((_, size)) if from.offset > *size => Err(unavailable(format!(
                "offset {} is past the end of {} ({size} bytes)",
                from.offset, from.file
            ))),
            Some(_) => Ok(()),
        }
    }
}

#[async_trait]
impl IncrementalSource for MySQLBinlogSource {
    fn source_type(&self) -> &'static str {
        "mysql-binlog"
    }

    async fn open(&self, from: &LogPosition) -> Result<Box<dyn ChangeStream>, SourceError> {
        let mut conn = self.conn(from).await?;
        self.verify_server_settings(&mut conn).await?;
        self.verify_position(&mut conn, from).await?;
        drop(conn);

        // The dump connection is dedicated; it cannot go back to the pool.
        let conn = Conn::new(self.opts.clone())
            .await
            .map_err(|e| SourceError::from_mysql(e, from))?;

        let stream = conn
            .get_binlog_stream(dump_request(self.source.server_id, from))
            .await
            .map_err(|e| SourceError::from_mysql(e, from))?;

        info!(
            position = %from,
            server_id = self.source.server_id,
            database = %self.database,
            "Subscribed to binlog stream"
        );

        let decoder = BinlogDecoder::new(
            Arc::clone(&self.fetcher),
            self.database.clone(),
            self.source.tables.iter().cloned(),
            self.source.progress_every_events,
            from,
        );

        Ok(Box::new(MySQLChangeStream {
            stream: Some(stream),
            decoder,
            pending: VecDeque::new(),
            requested: from.clone(),
        }))
    }

    async fn current_position(&self) -> Result<LogPosition, SourceError> {
        let here = LogPosition::new("", 0);
        let mut conn = self.conn(&here).await?;
        self.verify_server_settings(&mut conn).await?;
        Ok(get_current_checkpoint(&mut conn).await?.position)
    }
}

/// Change stream over a live binlog dump session.
pub struct MySQLChangeStream {
    stream: Option<BinlogStream>,
    decoder: BinlogDecoder,
    pending: VecDeque<SourceEvent>,
    requested: LogPosition,
}

impl MySQLChangeStream {
    async fn fill(&mut self) -> Result<bool, SourceError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(false);
        };
        let event = match stream.next().await {
            Some(Ok(event)) => event,
            Some(Err(e)) => return Err(SourceError::from_mysql(e, &self.requested)),
            None => {
                return Err(SourceError::Connection(
                    "binlog stream closed by server".to_string(),
                ))
            }
        };

        let frame = to_frame(stream, &event)?;
        let events = self.decoder.handle(frame).await?;
        self.pending.extend(events);
        Ok(true)
    }
}

#[async_trait]
impl ChangeStream for MySQLChangeStream {
    async fn next(&mut self) -> Option<Result<SourceEvent, SourceError>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            match self.fill().await {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(e) => {
                    // The session is unusable after any error
                    self.stream = None;
                    return Some(Err(e));
                }
            }
        }
    }
}

fn to_frame(stream: &BinlogStream, event: &Event) -> Result<BinlogFrame, SourceError> {
    let end_offset = u64::from(event.header().log_pos());
    let protocol = |e: std::io::Error| SourceError::Protocol(format!("event ending at {end_offset}: {e}"));

    let frame = match event.read_data().map_err(protocol)? {
        Some(EventData::RotateEvent(rotate)) => BinlogFrame::Rotate {
            file: rotate.name().into_owned(),
            offset: rotate.position(),
        },
        Some(EventData::TableMapEvent(tme)) => BinlogFrame::TableMap {
            table_id: tme.table_id(),
            database: tme.database_name().into_owned(),
            table: tme.table_name().into_owned(),
            column_count: tme.columns_count() as usize,
        },
        Some(EventData::RowsEvent(rows_event)) => {
            let table_id = rows_event.table_id();
            let tme = stream.get_tme(table_id).ok_or_else(|| {
                SourceError::Protocol(format!("no table map for table id {table_id}"))
            })?;
            let mut rows = Vec::new();
            for row in rows_event.rows(tme) {
                let (before, after) = row.map_err(protocol)?;
                rows.push(RowPair {
                    before: before.map(row_values),
                    after: after.map(row_values),
                });
            }
            BinlogFrame::Rows {
                table_id,
                kind: rows_kind(&rows_event),
                end_offset,
                rows,
            }
        }
        Some(EventData::XidEvent(_)) => BinlogFrame::Xid { end_offset },
        Some(EventData::QueryEvent(query)) => BinlogFrame::Query {
            database: query.schema().into_owned(),
            query: query.query().into_owned(),
            end_offset,
        },
        _ => BinlogFrame::Other { end_offset },
    };
    Ok(frame)
}

/// Offsets below the 4-byte magic header start at the first event.
fn dump_offset(from: &LogPosition) -> u64 {
    from.offset.max(4)
}

fn dump_request(server_id: u32, from: &LogPosition) -> BinlogStreamRequest<'_> {
    BinlogStreamRequest::new(server_id)
        .with_filename(from.file.as_bytes())
        .with_pos(dump_offset(from))
}

fn rows_kind(rows: &RowsEventData<'_>) -> RowsKind {
    match rows {
        RowsEventData::WriteRowsEventV1(_) | RowsEventData::WriteRowsEvent(_) => RowsKind::Write,
        RowsEventData::DeleteRowsEventV1(_) | RowsEventData::DeleteRowsEvent(_) => {
            RowsKind::Delete
        }
        _ => RowsKind::Update,
    }
}

fn row_values(row: BinlogRow) -> Vec<Value> {
    row.unwrap()
        .into_iter()
        .map(|value| match value {
            BinlogValue::Value(v) => v,
            other => {
                // Binary JSON and partial JSON updates are not decoded
                debug!("Replacing undecoded binlog value with NULL: {other:?}");
                Value::NULL
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_request_starts_after_magic_header() {
        let fresh = LogPosition::new("mysql-bin.000042", 0);
        assert_eq!(dump_offset(&fresh), 4);
        let resumed = LogPosition::new("mysql-bin.000042", 1577);
        assert_eq!(dump_offset(&resumed), 1577);

        let _request: BinlogStreamRequest<'_> = dump_request(4242, &resumed);
    }
}
