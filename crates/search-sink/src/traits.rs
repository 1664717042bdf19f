//! SearchSink trait definition.
//!
//! This trait abstracts over the search engine client, allowing the
//! pipeline to be compiled against a single interface that works with the
//! real bulk API and with in-memory doubles.

use std::sync::Arc;
use sync_core::IndexOperation;

/// Whole-request failure of a sink call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// Engine unreachable, HTTP 5xx or 429. Retried; the batch is resent.
    #[error("search engine transport error: {0}")]
    Transport(String),

    /// Credentials rejected (HTTP 401/403). Fatal.
    #[error("search engine rejected credentials: {0}")]
    Authentication(String),

    /// Response could not be understood. Fatal.
    #[error("unexpected search engine response: {0}")]
    Protocol(String),
}

impl SinkError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Transport(_))
    }
}

/// Outcome of one operation inside a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    Applied,
    /// Rejected by the engine for this document only.
    Failed { status: u16, reason: String },
}

impl OperationResult {
    pub fn failed(status: u16, reason: impl Into<String>) -> Self {
        OperationResult::Failed {
            status,
            reason: reason.into(),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, OperationResult::Applied)
    }
}

/// Trait for writing index operations to a search engine.
///
/// # Contract
///
/// `bulk` returns one result per input operation, in input order, or a
/// [`SinkError`] when the request as a whole failed. Upserts merge fields
/// into an existing document and create it when absent. Updates merge the
/// same way but never create; updating or deleting an absent document is
/// reported as `Applied`.
#[async_trait::async_trait]
pub trait SearchSink: Send + Sync {
    /// Check that the engine is reachable and accepts our credentials.
    async fn ping(&self) -> Result<(), SinkError>;

    /// Apply a batch of operations with one bulk request.
    async fn bulk(&self, ops: &[IndexOperation]) -> Result<Vec<OperationResult>, SinkError>;
}

#[async_trait::async_trait]
impl<S: SearchSink + ?Sized> SearchSink for Arc<S> {
    async fn ping(&self) -> Result<(), SinkError> {
        (**self).ping().await
    }

    async fn bulk(&self, ops: &[IndexOperation]) -> Result<Vec<OperationResult>, SinkError> {
        (**self).bulk(ops).await
    }
}
