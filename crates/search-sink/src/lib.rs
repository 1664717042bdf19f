//! Search index sink trait abstraction.
//!
//! This crate defines the `SearchSink` trait the Index Applier writes
//! through. `opensearch-sink` implements it over the `_bulk` HTTP API; the
//! in-memory [`testing::MemorySink`] implements it for pipeline tests.
//!
//! The trait speaks sync-core [`IndexOperation`](sync_core::IndexOperation)s
//! so the pipeline never couples to a specific client library.

mod batch;
mod traits;

#[doc(hidden)]
pub mod testing;

pub use batch::coalesce;
pub use traits::{OperationResult, SearchSink, SinkError};
