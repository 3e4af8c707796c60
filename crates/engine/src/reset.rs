// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cascading operation reset.
//!
//! Resetting an operation invalidates everything downstream of it. For
//! each operation in the cascade: in-memory state is cleared under one
//! write-lock acquisition, agent records are deleted from memory and the
//! store, the standard state fields (plus any per-op extras) are zeroed
//! with a synchronous write, and the op's store-side cleanup actions run.

use crate::error::EngineError;
use crate::extract;
use bindery_core::{
    read_book, with_book, AgentState, OpConfig, OpType, ResetAction, SharedBook,
};
use bindery_storage::{Query, StateStore, WriteOp};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

/// Reset `op` and every operation in its transitive cascade.
pub async fn reset_from<S: StateStore>(
    store: &S,
    book: &SharedBook,
    toc_doc_id: Option<&str>,
    op: OpType,
) -> Result<(), EngineError> {
    let mut targets = vec![op];
    targets.extend(OpConfig::transitive_cascade(op));

    let book_id = read_book(book, |b| b.id.clone());
    info!(book_id = %book_id, op = %op, cascade = targets.len(), "resetting operations");

    for target in targets {
        reset_one(store, book, toc_doc_id, target).await?;
    }
    Ok(())
}

async fn reset_one<S: StateStore>(
    store: &S,
    book: &SharedBook,
    toc_doc_id: Option<&str>,
    op: OpType,
) -> Result<(), EngineError> {
    let cfg = OpConfig::of(op);

    // Memory first: op state, memory hook, and agent maps are all cleared
    // under one write-lock acquisition.
    let removed_agents: Vec<AgentState> = with_book(book, |b| {
        b.op_reset(op);
        if let Some(hook) = cfg.reset_memory {
            hook(b);
        }
        cfg.agent_types
            .iter()
            .flat_map(|agent_type| b.clear_agent_states(agent_type))
            .collect()
    });

    for agent_type in cfg.agent_types {
        delete_agent_records(store, book, agent_type, &removed_agents).await?;
    }

    // Zero the standard fields plus any op-specific extras, synchronously.
    if let Some(doc_id) = read_book(book, |b| cfg.doc_id(b)) {
        let mut doc = crate::persist::op_state_doc(&read_book(book, |b| b.op_state(op)), cfg.field_prefix);
        for field in cfg.reset_db_fields {
            doc.insert(field.to_string(), Value::Null);
        }
        let ack = store
            .send_sync(WriteOp::update(cfg.collection.name(), doc_id, doc))
            .await?;
        with_book(book, |b| {
            b.track_write(cfg.collection.name(), &ack.doc_id, &ack.cid);
            b.record_op_cid(op, &ack.cid);
        });
    }

    for action in cfg.reset_actions {
        run_reset_action(store, book, toc_doc_id, *action).await?;
    }
    Ok(())
}

async fn delete_agent_records<S: StateStore>(
    store: &S,
    book: &SharedBook,
    agent_type: &str,
    removed: &[AgentState],
) -> Result<(), EngineError> {
    let book_id = read_book(book, |b| b.id.clone());
    // The store may hold records memory never saw (e.g. after a partial
    // rehydrate), so query rather than trusting the removed set alone.
    let query = Query::new("AgentState")
        .select(["_docID"])
        .filter_eq("book_id", json!(book_id.as_str()))
        .filter_eq("agent_type", json!(agent_type));
    let mut doc_ids: Vec<String> = match store.execute(&query).await {
        Ok(response) => response
            .get("AgentState")
            .cloned()
            .unwrap_or_default()
            .iter()
            .filter_map(extract::doc_id)
            .collect(),
        Err(err) => {
            warn!(%agent_type, %err, "agent-state query failed during reset; using in-memory records");
            Vec::new()
        }
    };
    for state in removed {
        if !state.doc_id.is_empty() && !doc_ids.contains(&state.doc_id) {
            doc_ids.push(state.doc_id.clone());
        }
    }
    for doc_id in doc_ids {
        store.send_sync(WriteOp::delete("AgentState", doc_id)).await?;
    }
    Ok(())
}

async fn run_reset_action<S: StateStore>(
    store: &S,
    book: &SharedBook,
    toc_doc_id: Option<&str>,
    action: ResetAction,
) -> Result<(), EngineError> {
    match action {
        ResetAction::DeleteTocEntries => {
            let Some(toc_doc_id) = toc_doc_id else {
                return Ok(());
            };
            for doc_id in toc_entry_ids(store, toc_doc_id).await? {
                store.send_sync(WriteOp::delete("TocEntry", doc_id)).await?;
            }
        }
        ResetAction::ClearEntryLinks => {
            let Some(toc_doc_id) = toc_doc_id else {
                return Ok(());
            };
            for doc_id in toc_entry_ids(store, toc_doc_id).await? {
                let mut doc = Map::new();
                doc.insert("actual_page".to_string(), Value::Null);
                store
                    .send_sync(WriteOp::update("TocEntry", doc_id, doc))
                    .await?;
            }
        }
        ResetAction::DeleteChapters => {
            let book_id = read_book(book, |b| b.id.clone());
            let query = Query::new("Chapter")
                .select(["_docID"])
                .filter_eq("book_id", json!(book_id.as_str()));
            let response = store.execute(&query).await?;
            for doc in response.get("Chapter").cloned().unwrap_or_default() {
                if let Some(doc_id) = extract::doc_id(&doc) {
                    store.send_sync(WriteOp::delete("Chapter", doc_id)).await?;
                }
            }
        }
        ResetAction::ClearPageLabels => {
            clear_page_fields(
                store,
                book,
                &[
                    ("page_number_label", Value::Null),
                    ("running_header", Value::Null),
                    ("label_complete", json!(false)),
                ],
            )
            .await?;
        }
        ResetAction::ClearPageBlends => {
            clear_page_fields(
                store,
                book,
                &[
                    ("ocr_markdown", Value::Null),
                    ("headings", Value::Null),
                    ("header", Value::Null),
                    ("footer", Value::Null),
                    ("blend_complete", json!(false)),
                ],
            )
            .await?;
        }
        ResetAction::DeleteOcrResults => {
            let page_doc_ids: Vec<String> = read_book(book, |b| {
                b.pages()
                    .map(|(_, p)| p.page_doc_id.clone())
                    .filter(|id| !id.is_empty())
                    .collect()
            });
            for page_doc_id in &page_doc_ids {
                let query = Query::new("OcrResult")
                    .select(["_docID"])
                    .filter_eq("page_id", json!(page_doc_id));
                let response = store.execute(&query).await?;
                for doc in response.get("OcrResult").cloned().unwrap_or_default() {
                    if let Some(doc_id) = extract::doc_id(&doc) {
                        store.send_sync(WriteOp::delete("OcrResult", doc_id)).await?;
                    }
                }
            }
            clear_page_fields(store, book, &[("ocr_complete", json!(false))]).await?;
        }
        ResetAction::ClearBookFinalizeCounters => {
            let doc_id = read_book(book, |b| b.book_doc_id.clone());
            if doc_id.is_empty() {
                return Ok(());
            }
            let mut doc = Map::new();
            for field in [
                "finalize_entries_complete",
                "finalize_entries_found",
                "finalize_gaps_complete",
                "finalize_gaps_fixes",
            ] {
                doc.insert(field.to_string(), json!(0));
            }
            let ack = store.send_sync(WriteOp::update("Book", doc_id, doc)).await?;
            with_book(book, |b| b.track_write("Book", &ack.doc_id, &ack.cid));
        }
    }
    Ok(())
}

async fn toc_entry_ids<S: StateStore>(
    store: &S,
    toc_doc_id: &str,
) -> Result<Vec<String>, EngineError> {
    let query = Query::new("TocEntry")
        .select(["_docID"])
        .filter_eq("toc_id", json!(toc_doc_id));
    let response = store.execute(&query).await?;
    Ok(response
        .get("TocEntry")
        .cloned()
        .unwrap_or_default()
        .iter()
        .filter_map(extract::doc_id)
        .collect())
}

async fn clear_page_fields<S: StateStore>(
    store: &S,
    book: &SharedBook,
    fields: &[(&str, Value)],
) -> Result<(), EngineError> {
    let page_doc_ids: Vec<String> = read_book(book, |b| {
        b.pages()
            .map(|(_, p)| p.page_doc_id.clone())
            .filter(|id| !id.is_empty())
            .collect()
    });
    for page_doc_id in page_doc_ids {
        let mut doc = Map::new();
        for (field, value) in fields {
            doc.insert(field.to_string(), value.clone());
        }
        let ack = store.send_sync(WriteOp::update("Page", page_doc_id, doc)).await?;
        with_book(book, |b| b.track_write("Page", &ack.doc_id, &ack.cid));
    }
    Ok(())
}

#[cfg(test)]
#[path = "reset_tests.rs"]
mod tests;
