//! Transport-neutral view of the binlog events the decoder cares about.
//!
//! The replication client hands over borrowed, lazily parsed events; the
//! stream adapter copies the relevant parts into a `BinlogFrame` so the
//! decoding state machine can be driven (and tested) without a server.

use mysql_async::Value;

/// Kind of a rows event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowsKind {
    Write,
    Update,
    Delete,
}

/// Before/after images of one row inside a rows event, in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPair {
    pub before: Option<Vec<Value>>,
    pub after: Option<Vec<Value>>,
}

/// One decoded binlog event.
///
/// `end_offset` is the event header's `log_pos`: the offset just past the
/// event in the current file.
#[derive(Debug, Clone, PartialEq)]
pub enum BinlogFrame {
    /// Switch to a new binlog file.
    Rotate { file: String, offset: u64 },

    /// Binds a table id to a table for the following rows events.
    TableMap {
        table_id: u64,
        database: String,
        table: String,
        column_count: usize,
    },

    /// Row images for one table.
    Rows {
        table_id: u64,
        kind: RowsKind,
        end_offset: u64,
        rows: Vec<RowPair>,
    },

    /// Transaction commit (InnoDB).
    Xid { end_offset: u64 },

    /// Statement event: `BEGIN`, `COMMIT` for non-transactional engines, or DDL.
    Query {
        database: String,
        query: String,
        end_offset: u64,
    },

    /// Anything else (GTID, format description, heartbeat, ...).
    Other { end_offset: u64 },
}

impl RowPair {
    pub fn insert(after: Vec<Value>) -> Self {
        Self {
            before: None,
            after: Some(after),
        }
    }

    pub fn update(before: Vec<Value>, after: Vec<Value>) -> Self {
        Self {
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn delete(before: Vec<Value>) -> Self {
        Self {
            before: Some(before),
            after: None,
        }
    }

    /// Number of columns carried by the row images.
    pub fn width(&self) -> usize {
        self.after
            .as_ref()
            .or(self.before.as_ref())
            .map(Vec::len)
            .unwrap_or(0)
    }
}
