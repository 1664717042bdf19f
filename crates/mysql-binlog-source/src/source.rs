//! Traits for the MySQL binlog reader.
//!
//! The replication connection is owned by whoever holds the
//! `IncrementalSource`; the pipeline receives it as a trait object, so tests
//! drive the same pipeline with a scripted source.

use async_trait::async_trait;
use sync_core::{LogPosition, RowChangeEvent};

use crate::SourceError;

/// One item yielded by a change stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// A committed row mutation of a tracked table.
    Row(RowChangeEvent),

    /// End of a transaction; the position is a valid resume point.
    ///
    /// Emitted after every transaction that produced at least one `Row`, and
    /// periodically while only untracked events are read.
    Commit(LogPosition),

    /// A tracked table's row layout no longer matches its metadata.
    ///
    /// No `Row` events are produced for the table until its schema changes
    /// again.
    SchemaMismatch {
        table: String,
        position: LogPosition,
        detail: String,
    },
}

impl SourceEvent {
    pub fn position(&self) -> &LogPosition {
        match self {
            SourceEvent::Row(row) => &row.position,
            SourceEvent::Commit(position) => position,
            SourceEvent::SchemaMismatch { position, .. } => position,
        }
    }
}

/// Trait for a binlog-like incremental source.
#[async_trait]
pub trait IncrementalSource: Send + Sync {
    /// Get the source type identifier
    fn source_type(&self) -> &'static str;

    /// Subscribe to the stream, resuming just after `from`.
    ///
    /// Fails with `PositionUnavailable` if the server no longer retains `from`.
    async fn open(&self, from: &LogPosition) -> Result<Box<dyn ChangeStream>, SourceError>;

    /// The position the next transaction will be written at.
    async fn current_position(&self) -> Result<LogPosition, SourceError>;
}

/// A forward-only stream of source events.
#[async_trait]
pub trait ChangeStream: Send {
    /// Get the next event.
    ///
    /// Returns None once the stream has ended (after a connection error has
    /// been reported, or on shutdown).
    async fn next(&mut self) -> Option<Result<SourceEvent, SourceError>>;
}
