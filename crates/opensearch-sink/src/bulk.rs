//! `_bulk` request bodies and response parsing.

use search_sink::{OperationResult, SinkError};
use serde_json::{json, Value};
use sync_core::IndexOperation;

/// Conflicting concurrent updates of one document are retried server side.
const RETRY_ON_CONFLICT: u32 = 3;

/// NDJSON lines for a bulk request, two per upsert or update and one per delete.
pub fn bulk_lines(ops: &[IndexOperation]) -> Vec<Value> {
    let mut lines = Vec::with_capacity(ops.len() * 2);
    for op in ops {
        match op {
            IndexOperation::Upsert { key, fields } => {
                lines.push(json!({
                    "update": {
                        "_index": key.index,
                        "_id": key.id,
                        "retry_on_conflict": RETRY_ON_CONFLICT,
                    }
                }));
                lines.push(json!({ "doc": fields, "doc_as_upsert": true }));
            }
            IndexOperation::Update { key, fields } => {
                lines.push(json!({
                    "update": {
                        "_index": key.index,
                        "_id": key.id,
                        "retry_on_conflict": RETRY_ON_CONFLICT,
                    }
                }));
                lines.push(json!({ "doc": fields }));
            }
            IndexOperation::Delete { key } => {
                lines.push(json!({ "delete": { "_index": key.index, "_id": key.id } }));
            }
        }
    }
    lines
}

/// Map a bulk response body onto per-operation results.
///
/// Item-level 429 and 5xx statuses mean the node shed load; they fail the
/// whole batch as a transport error so it is resent after backoff.
pub fn parse_bulk_response(
    ops: &[IndexOperation],
    body: &Value,
) -> Result<Vec<OperationResult>, SinkError> {
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| SinkError::Protocol("bulk response has no items array".into()))?;
    if items.len() != ops.len() {
        return Err(SinkError::Protocol(format!(
            "bulk response has {} items for {} operations",
            items.len(),
            ops.len()
        )));
    }

    let mut results = Vec::with_capacity(ops.len());
    for (op, item) in ops.iter().zip(items) {
        let action = if op.is_delete() { "delete" } else { "update" };
        let entry = item.get(action).ok_or_else(|| {
            SinkError::Protocol(format!("bulk item for {} is not a {action} result", op.key()))
        })?;
        let status = entry
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
            .ok_or_else(|| SinkError::Protocol(format!("bulk item for {} has no status", op.key())))?;

        let result = match status {
            200..=299 => OperationResult::Applied,
            // Absent documents: deleting is done, updating has nothing to touch.
            404 if op.is_delete() => OperationResult::Applied,
            404 if matches!(op, IndexOperation::Update { .. }) && is_document_missing(entry) => {
                OperationResult::Applied
            }
            429 | 500..=599 => {
                return Err(SinkError::Transport(format!(
                    "bulk item for {} failed with status {status}: {}",
                    op.key(),
                    error_reason(entry)
                )));
            }
            _ => OperationResult::failed(status, error_reason(entry)),
        };
        results.push(result);
    }
    Ok(results)
}

fn is_document_missing(entry: &Value) -> bool {
    entry
        .pointer("/error/type")
        .and_then(Value::as_str)
        .is_some_and(|kind| kind == "document_missing_exception")
}

fn error_reason(entry: &Value) -> String {
    let Some(error) = entry.get("error") else {
        return "unknown error".to_string();
    };
    let kind = error.get("type").and_then(Value::as_str);
    let reason = error.get("reason").and_then(Value::as_str);
    match (kind, reason) {
        (Some(kind), Some(reason)) => format!("{kind}: {reason}"),
        (Some(text), None) | (None, Some(text)) => text.to_string(),
        (None, None) => error.to_string(),
    }
}
