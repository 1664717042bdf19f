//! OpenSearch implementation of [`search_sink::SearchSink`].
//!
//! Upserts are sent as bulk `update` actions with `doc_as_upsert`, partial
//! updates as plain `update` actions, deletes as bulk `delete` actions. The `items` array of the bulk response is mapped
//! back onto the operations that were sent.

mod bulk;
mod client;

pub use bulk::{bulk_lines, parse_bulk_response};
pub use client::{OpenSearchSink, OpenSearchSinkConfig};
