//! Per-document coalescing of a batch window.

use std::collections::HashMap;
use sync_core::{DocumentKey, Fields, IndexOperation};

/// What one document ends up with, emitted in field order.
///
/// `delete` and `update` are never both set: an update queued after a delete
/// targets a missing document and is dropped.
#[derive(Default)]
struct Pending {
    delete: bool,
    update: Option<Fields>,
    upsert: Option<Fields>,
}

fn merge(slot: &mut Option<Fields>, fields: Fields) {
    match slot {
        Some(existing) => existing.extend(fields),
        None => *slot = Some(fields),
    }
}

/// Collapse the operations of one batch window to the minimum per document.
///
/// - consecutive upserts merge, later fields win;
/// - a delete supersedes everything queued before it;
/// - a delete followed by upserts stays a delete then one merged upsert;
/// - an update after an upsert folds into it, an update after a delete is
///   dropped, and an update before an upsert stays a separate operation.
///
/// Documents appear in the order of their first operation. Operations on
/// different documents are independent, so only per-document order matters.
pub fn coalesce(ops: Vec<IndexOperation>) -> Vec<IndexOperation> {
    let mut order: Vec<DocumentKey> = Vec::new();
    let mut pending: HashMap<DocumentKey, Pending> = HashMap::new();

    for op in ops {
        let key = op.key().clone();
        let slot = pending.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            Pending::default()
        });
        match op {
            IndexOperation::Delete { .. } => {
                *slot = Pending {
                    delete: true,
                    ..Pending::default()
                };
            }
            IndexOperation::Upsert { fields, .. } => merge(&mut slot.upsert, fields),
            IndexOperation::Update { fields, .. } => {
                if slot.upsert.is_some() {
                    merge(&mut slot.upsert, fields);
                } else if !slot.delete {
                    merge(&mut slot.update, fields);
                }
            }
        }
    }

    let mut out = Vec::with_capacity(order.len());
    for key in order {
        let Some(doc) = pending.remove(&key) else {
            continue;
        };
        if doc.delete {
            out.push(IndexOperation::delete(key.clone()));
        }
        if let Some(fields) = doc.update {
            out.push(IndexOperation::update(key.clone(), fields));
        }
        if let Some(fields) = doc.upsert {
            out.push(IndexOperation::upsert(key, fields));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(id: &str) -> DocumentKey {
        DocumentKey::new("nyaa", id)
    }

    fn upsert(id: &str, pairs: &[(&str, serde_json::Value)]) -> IndexOperation {
        let fields = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        IndexOperation::upsert(key(id), fields)
    }

    #[test]
    fn test_consecutive_upserts_merge() {
        let out = coalesce(vec![
            upsert("t:1", &[("title", json!("a")), ("seeders", json!(1))]),
            upsert("t:1", &[("title", json!("b"))]),
        ]);
        assert_eq!(
            out,
            vec![upsert("t:1", &[("title", json!("b")), ("seeders", json!(1))])]
        );
    }

    #[test]
    fn test_delete_supersedes_earlier_operations() {
        let out = coalesce(vec![
            upsert("t:1", &[("title", json!("a"))]),
            IndexOperation::delete(key("t:1")),
        ]);
        assert_eq!(out, vec![IndexOperation::delete(key("t:1"))]);
    }

    #[test]
    fn test_delete_then_upsert_is_kept() {
        let out = coalesce(vec![
            upsert("t:1", &[("title", json!("a"))]),
            IndexOperation::delete(key("t:1")),
            upsert("t:1", &[("title", json!("b"))]),
            upsert("t:1", &[("seeders", json!(3))]),
        ]);
        assert_eq!(
            out,
            vec![
                IndexOperation::delete(key("t:1")),
                upsert("t:1", &[("title", json!("b")), ("seeders", json!(3))]),
            ]
        );
    }

    #[test]
    fn test_documents_keep_first_appearance_order() {
        let out = coalesce(vec![
            upsert("t:2", &[("a", json!(1))]),
            upsert("t:1", &[("a", json!(1))]),
            upsert("t:2", &[("a", json!(2))]),
        ]);
        let ids: Vec<&str> = out.iter().map(|op| op.key().id.as_str()).collect();
        assert_eq!(ids, vec!["t:2", "t:1"]);
    }

    fn update(id: &str, pairs: &[(&str, serde_json::Value)]) -> IndexOperation {
        let fields = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        IndexOperation::update(key(id), fields)
    }

    #[test]
    fn test_update_folds_into_earlier_upsert() {
        let out = coalesce(vec![
            upsert("t:1", &[("title", json!("a"))]),
            update("t:1", &[("seed_count", json!(4))]),
            update("t:1", &[("seed_count", json!(5))]),
        ]);
        assert_eq!(
            out,
            vec![upsert("t:1", &[("title", json!("a")), ("seed_count", json!(5))])]
        );
    }

    #[test]
    fn test_updates_never_become_upserts() {
        let out = coalesce(vec![
            update("t:1", &[("seed_count", json!(1))]),
            update("t:1", &[("leech_count", json!(2))]),
            upsert("t:1", &[("title", json!("a"))]),
        ]);
        assert_eq!(
            out,
            vec![
                update("t:1", &[("seed_count", json!(1)), ("leech_count", json!(2))]),
                upsert("t:1", &[("title", json!("a"))]),
            ]
        );
    }

    #[test]
    fn test_update_after_delete_is_dropped() {
        let out = coalesce(vec![
            update("t:1", &[("seed_count", json!(1))]),
            IndexOperation::delete(key("t:1")),
            update("t:1", &[("seed_count", json!(2))]),
        ]);
        assert_eq!(out, vec![IndexOperation::delete(key("t:1"))]);
    }
}
