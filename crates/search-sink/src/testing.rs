//! In-memory sink for pipeline tests.

use crate::traits::{OperationResult, SearchSink, SinkError};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use sync_core::{DocumentKey, Fields, IndexOperation};

#[derive(Default)]
struct State {
    documents: BTreeMap<DocumentKey, Fields>,
    applied: Vec<IndexOperation>,
    batches: Vec<Vec<IndexOperation>>,
    rejections: HashMap<String, String>,
    unreachable: bool,
    fail_next: usize,
    attempts: usize,
}

fn lock(m: &Mutex<State>) -> MutexGuard<'_, State> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Search engine double holding documents in a map.
///
/// Cloning shares state, so a test keeps one handle while the pipeline
/// owns another.
#[derive(Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<State>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// While unreachable every call fails with a transport error.
    pub fn set_reachable(&self, reachable: bool) {
        lock(&self.state).unreachable = !reachable;
    }

    /// Fail the next `n` bulk requests with a transport error.
    pub fn fail_next(&self, n: usize) {
        lock(&self.state).fail_next = n;
    }

    /// Reject every operation on the document with this id.
    pub fn reject(&self, id: impl Into<String>, reason: impl Into<String>) {
        lock(&self.state).rejections.insert(id.into(), reason.into());
    }

    pub fn document(&self, index: &str, id: &str) -> Option<Fields> {
        lock(&self.state)
            .documents
            .get(&DocumentKey::new(index, id))
            .cloned()
    }

    pub fn documents(&self) -> BTreeMap<DocumentKey, Fields> {
        lock(&self.state).documents.clone()
    }

    /// Operations that were applied, in application order.
    pub fn applied(&self) -> Vec<IndexOperation> {
        lock(&self.state).applied.clone()
    }

    /// Successful bulk requests, as sent.
    pub fn batches(&self) -> Vec<Vec<IndexOperation>> {
        lock(&self.state).batches.clone()
    }

    /// Bulk requests attempted, including failed ones.
    pub fn attempts(&self) -> usize {
        lock(&self.state).attempts
    }
}

#[async_trait::async_trait]
impl SearchSink for MemorySink {
    async fn ping(&self) -> Result<(), SinkError> {
        if lock(&self.state).unreachable {
            return Err(SinkError::Transport("connection refused".into()));
        }
        Ok(())
    }

    async fn bulk(&self, ops: &[IndexOperation]) -> Result<Vec<OperationResult>, SinkError> {
        let mut state = lock(&self.state);
        state.attempts += 1;
        if state.unreachable {
            return Err(SinkError::Transport("connection refused".into()));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(SinkError::Transport("503 Service Unavailable".into()));
        }

        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            if let Some(reason) = state.rejections.get(&op.key().id) {
                results.push(OperationResult::failed(400, reason.clone()));
                continue;
            }
            match op {
                IndexOperation::Upsert { key, fields } => {
                    state
                        .documents
                        .entry(key.clone())
                        .or_default()
                        .extend(fields.clone());
                }
                IndexOperation::Update { key, fields } => {
                    if let Some(document) = state.documents.get_mut(key) {
                        document.extend(fields.clone());
                    }
                }
                IndexOperation::Delete { key } => {
                    state.documents.remove(key);
                }
            }
            state.applied.push(op.clone());
            results.push(OperationResult::Applied);
        }
        state.batches.push(ops.to_vec());
        Ok(results)
    }
}
