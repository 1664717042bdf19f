//! search-sync library
//!
//! Keeps a search index in step with a MySQL database by following its
//! row-based binary log.
//!
//! # Components
//!
//! - `search_sync_mysql_binlog_source` - replication client decoding row events
//! - `index_mapping` - table-to-document mappings and the event translator
//! - `search_sink` / `opensearch_sink` - bulk application to the search engine
//! - `checkpoint` - durable resume positions and the bootstrap marker
//! - [`pipeline`] - the reader, translator and applier tasks and their orchestration
//!
//! # CLI Usage
//!
//! ```bash
//! # Before exporting the database for the initial index build
//! search-sync --config search-sync.toml mark-bootstrap
//!
//! # Load the export, then stream changes
//! search-sync --config search-sync.toml bootstrap --input export.jsonl
//! search-sync --config search-sync.toml run
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod pipeline;

pub use config::SyncConfig;
pub use error::SyncError;
pub use pipeline::{resolve_start, Pipeline, PipelineSettings};
