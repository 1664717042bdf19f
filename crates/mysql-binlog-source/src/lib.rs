//! MySQL binlog reader for search-sync
//!
//! Subscribes to the server's row-based binary log as a replication client
//! and yields typed row-change events for the tracked tables, in log order,
//! with commit markers at transaction boundaries.

pub mod checkpoint;
mod decoder;
mod error;
pub mod frame;
mod schema;
mod source;
mod stream;

#[doc(hidden)]
pub mod testing;

pub use checkpoint::{get_current_checkpoint, MySQLBinlogCheckpoint};
pub use decoder::BinlogDecoder;
pub use error::SourceError;
pub use schema::{ColumnFetcher, InformationSchemaFetcher};
pub use source::{ChangeStream, IncrementalSource, SourceEvent};
pub use stream::{MySQLBinlogSource, MySQLChangeStream};

/// MySQL source connection options
#[derive(Clone, Debug)]
pub struct SourceOpts {
    /// MySQL connection URI
    pub source_uri: String,
    /// Source database name (defaults to the database in the URI)
    pub source_database: Option<String>,
    /// Replication server id; must be unique among the server's replicas
    pub server_id: u32,
    /// Tables whose row events are decoded
    pub tables: Vec<String>,
    /// Emit a progress commit marker after this many untracked events (0 disables)
    pub progress_every_events: u64,
}
