// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation-state persistence.
//!
//! State transitions are persisted before they are acted on: stage starts
//! go out before any work unit is emitted (synchronously for the stages
//! whose restart re-spends provider money), and stage completions are
//! confirmed durable before the next stage starts.

use crate::error::EngineError;
use bindery_core::{read_book, with_book, OpConfig, OpType, OperationState, SharedBook};
use bindery_storage::{StateStore, WriteOp};
use serde_json::{json, Map, Value};

/// The four standard state fields for `prefix`.
pub fn op_state_doc(state: &OperationState, prefix: &str) -> Map<String, Value> {
    let mut doc = Map::new();
    doc.insert(format!("{prefix}_started"), json!(state.is_started()));
    doc.insert(format!("{prefix}_complete"), json!(state.is_complete()));
    doc.insert(format!("{prefix}_failed"), json!(state.is_failed()));
    doc.insert(format!("{prefix}_retries"), json!(state.retries()));
    doc
}

fn op_write(book: &SharedBook, op: OpType) -> Option<WriteOp> {
    let cfg = OpConfig::of(op);
    read_book(book, |b| {
        let doc_id = cfg.doc_id(b)?;
        let doc = op_state_doc(&b.op_state(op), cfg.field_prefix);
        Some(WriteOp::update(cfg.collection.name(), doc_id, doc))
    })
}

/// Persist the current state fields of `op`, fire-and-forget. A missing
/// target document makes this a no-op, not an error.
pub fn persist_op_state<S: StateStore>(store: &S, book: &SharedBook, op: OpType) {
    if let Some(write) = op_write(book, op) {
        store.send(write);
    }
}

/// Persist the current state fields of `op` and wait for the write;
/// records the returned CID. A missing target document is a no-op.
pub async fn persist_op_state_sync<S: StateStore>(
    store: &S,
    book: &SharedBook,
    op: OpType,
) -> Result<(), EngineError> {
    let Some(write) = op_write(book, op) else {
        return Ok(());
    };
    let collection = write.collection.clone();
    let ack = store.send_sync(write).await?;
    with_book(book, |b| {
        b.track_write(&collection, &ack.doc_id, &ack.cid);
        b.record_op_cid(op, &ack.cid);
    });
    Ok(())
}

/// Persist completion of `op`: `_complete` set, `_started` cleared,
/// written synchronously; the returned CID is recorded against the op and
/// the owning document.
pub async fn persist_op_complete<S: StateStore>(
    store: &S,
    book: &SharedBook,
    op: OpType,
) -> Result<(), EngineError> {
    persist_op_state_sync(store, book, op).await
}

/// Update the book's store-visible status label, fire-and-forget.
pub fn set_book_status<S: StateStore>(store: &S, book: &SharedBook, label: &str) {
    let doc_id = with_book(book, |b| {
        b.status = label.to_string();
        b.book_doc_id.clone()
    });
    if doc_id.is_empty() {
        return;
    }
    let mut doc = Map::new();
    doc.insert("status".to_string(), json!(label));
    store.send(WriteOp::update("Book", doc_id, doc));
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
