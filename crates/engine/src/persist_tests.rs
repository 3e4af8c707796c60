// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{load, seed_book};
use bindery_storage::MemoryStore;
use serde_json::json;

#[tokio::test]
async fn happy_path_single_op() {
    let store = MemoryStore::new();
    let book_doc_id = seed_book(&store, "b1", 3).await;
    let (book, _) = load(&store, "b1").await;

    with_book(&book, |b| b.op_start(OpType::Metadata)).unwrap();
    persist_op_state_sync(&store, &book, OpType::Metadata)
        .await
        .unwrap();

    let doc = store.doc("Book", &book_doc_id).unwrap();
    assert_eq!(doc["metadata_started"], json!(true));
    assert_eq!(doc["metadata_complete"], json!(false));
    assert_eq!(doc["metadata_failed"], json!(false));
    assert_eq!(doc["metadata_retries"], json!(0));
    let started_cid = read_book(&book, |b| b.book_cid.clone());
    assert!(!started_cid.is_empty());

    with_book(&book, |b| b.op_complete(OpType::Metadata));
    persist_op_complete(&store, &book, OpType::Metadata)
        .await
        .unwrap();

    let doc = store.doc("Book", &book_doc_id).unwrap();
    assert_eq!(doc["metadata_started"], json!(false));
    assert_eq!(doc["metadata_complete"], json!(true));
    assert_eq!(doc["metadata_retries"], json!(0));

    let complete_cid = read_book(&book, |b| b.book_cid.clone());
    assert_ne!(complete_cid, started_cid);
    assert_eq!(
        read_book(&book, |b| b.op_cid(OpType::Metadata).map(str::to_string)),
        Some(complete_cid.clone())
    );
    assert_eq!(
        read_book(&book, |b| b
            .last_cid("Book", &book_doc_id)
            .map(str::to_string)),
        Some(complete_cid)
    );
}

#[tokio::test]
async fn missing_target_document_is_a_no_op() {
    let store = MemoryStore::new();
    seed_book(&store, "b1", 2).await;
    let (book, _) = load(&store, "b1").await;

    // No ToC record exists yet, so a ToC-level persist does nothing.
    with_book(&book, |b| b.op_start(OpType::TocFinder)).unwrap();
    persist_op_state_sync(&store, &book, OpType::TocFinder)
        .await
        .unwrap();
    assert!(store.docs("Toc").is_empty());
}

#[tokio::test]
async fn page_level_ops_have_no_single_document() {
    let store = MemoryStore::new();
    seed_book(&store, "b1", 2).await;
    let (book, _) = load(&store, "b1").await;

    with_book(&book, |b| b.op_start(OpType::Ocr)).unwrap();
    // Must not error and must not touch the book record's fields.
    persist_op_state_sync(&store, &book, OpType::Ocr)
        .await
        .unwrap();
    let book_doc_id = read_book(&book, |b| b.book_doc_id.clone());
    let doc = store.doc("Book", &book_doc_id).unwrap();
    assert!(doc.get("ocr_started").is_none());
}

#[tokio::test]
async fn status_label_round_trips() {
    let store = MemoryStore::new();
    let book_doc_id = seed_book(&store, "b1", 1).await;
    let (book, _) = load(&store, "b1").await;

    set_book_status(&store, &book, "processing:metadata");
    assert_eq!(
        read_book(&book, |b| b.status.clone()),
        "processing:metadata"
    );
    let doc = store.doc("Book", &book_doc_id).unwrap();
    assert_eq!(doc["status"], json!("processing:metadata"));
}

#[test]
fn op_state_doc_uses_the_prefix() {
    let mut state = bindery_core::OperationState::new();
    state.start(OpType::TocLink).unwrap();
    state.fail(3);
    let doc = op_state_doc(&state, "link");
    assert_eq!(doc["link_started"], json!(false));
    assert_eq!(doc["link_failed"], json!(true));
    assert_eq!(doc["link_retries"], json!(1));
}
