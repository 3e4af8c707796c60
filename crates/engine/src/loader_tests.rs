// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::PipelineConfig;
use crate::persist::{persist_op_complete, persist_op_state_sync};
use crate::test_helpers::{fields, load, seed_book, seed_toc};
use bindery_adapters::EmbeddedPrompts;
use bindery_core::{read_book, with_book, OpType};
use bindery_storage::{MemoryStore, StateStore, WriteOp};
use serde_json::json;

#[tokio::test]
async fn rejects_invalid_book_id() {
    let store = MemoryStore::new();
    let err = load_book(
        &store,
        &EmbeddedPrompts,
        &PipelineConfig::default(),
        "b1\"}) {",
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::State(_)));
}

#[tokio::test]
async fn missing_book_is_fatal() {
    let store = MemoryStore::new();
    let err = load_book(&store, &EmbeddedPrompts, &PipelineConfig::default(), "b1")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BookNotFound(_)));
}

#[tokio::test]
async fn zero_page_book_is_fatal() {
    let store = MemoryStore::new();
    store
        .send_sync(WriteOp::create(
            "Book",
            fields(json!({"book_id": "b1", "page_count": 0})),
        ))
        .await
        .unwrap();
    let err = load_book(&store, &EmbeddedPrompts, &PipelineConfig::default(), "b1")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EmptyBook(_)));
}

#[tokio::test]
async fn loads_pages_with_ocr_relations() {
    let store = MemoryStore::new();
    seed_book(&store, "b1", 2).await;
    let page_doc = store.docs("Page")[0]["_docID"].as_str().unwrap().to_string();
    store
        .send_sync(WriteOp::create(
            "OcrResult",
            fields(json!({"page_id": page_doc, "provider": "tesseract", "text": "CHAPTER I"})),
        ))
        .await
        .unwrap();
    store
        .send_sync(WriteOp::create(
            "OcrResult",
            fields(json!({"page_id": page_doc, "provider": "paddle", "text": ""})),
        ))
        .await
        .unwrap();

    let (book, _) = load(&store, "b1").await;
    read_book(&book, |b| {
        assert_eq!(b.total_pages, 2);
        assert_eq!(b.pages().count(), 2);
        let page = b.page(1).unwrap();
        assert_eq!(page.ocr_results["tesseract"], "CHAPTER I");
        // Blank results survive the round trip.
        assert_eq!(page.ocr_results["paddle"], "");
        assert!(!b.page(2).unwrap().has_provider("tesseract"));
    });
}

#[tokio::test]
async fn load_reload_round_trip() {
    let store = MemoryStore::new();
    let book_doc_id = seed_book(&store, "b2", 3).await;
    seed_toc(&store, &book_doc_id, json!({})).await;

    // First process: metadata completes, toc_finder starts.
    let (book, toc_doc_id) = load(&store, "b2").await;
    assert!(toc_doc_id.is_some());
    with_book(&book, |b| b.op_start(OpType::Metadata)).unwrap();
    with_book(&book, |b| b.op_complete(OpType::Metadata));
    persist_op_complete(&store, &book, OpType::Metadata)
        .await
        .unwrap();
    with_book(&book, |b| b.op_start(OpType::TocFinder)).unwrap();
    persist_op_state_sync(&store, &book, OpType::TocFinder)
        .await
        .unwrap();

    // Fresh process: the loader reconstructs the exact state.
    let (reloaded, _) = load(&store, "b2").await;
    read_book(&reloaded, |b| {
        assert!(b.op_is_complete(OpType::Metadata));
        assert!(b.op_is_started(OpType::TocFinder));
        assert!(!b.op_is_complete(OpType::TocFinder));
    });
}

#[tokio::test]
async fn persisted_retries_rebuild_permanence() {
    let store = MemoryStore::new();
    let book_doc_id = seed_book(&store, "b1", 1).await;
    seed_toc(
        &store,
        &book_doc_id,
        json!({"link_failed": true, "link_retries": 3}),
    )
    .await;

    let (book, _) = load(&store, "b1").await;
    read_book(&book, |b| {
        // Default max_retries is 3: the failure is permanent after reload.
        assert!(b.op_is_done(OpType::TocLink));
        assert!(!b.op_is_complete(OpType::TocLink));
        assert!(!b.op_can_start(OpType::TocLink));
        assert_eq!(b.op_retries(OpType::TocLink), 3);
    });
}

#[tokio::test]
async fn derives_page_level_ops_from_page_flags() {
    let store = MemoryStore::new();
    seed_book(&store, "b1", 2).await;
    for doc in store.docs("Page") {
        let doc_id = doc["_docID"].as_str().unwrap().to_string();
        store
            .send_sync(WriteOp::update(
                "Page",
                doc_id,
                fields(json!({"ocr_complete": true})),
            ))
            .await
            .unwrap();
    }

    let (book, _) = load(&store, "b1").await;
    read_book(&book, |b| {
        assert!(b.op_is_complete(OpType::Ocr));
        assert!(b.op_can_start(OpType::Blend));
    });
}

#[tokio::test]
async fn loads_unlinked_entries_as_the_link_work_set() {
    let store = MemoryStore::new();
    let book_doc_id = seed_book(&store, "b1", 4).await;
    let toc_doc_id = seed_toc(&store, &book_doc_id, json!({"toc_found": true})).await;
    store
        .send_sync(WriteOp::create(
            "TocEntry",
            fields(json!({
                "toc_id": toc_doc_id,
                "title": "Chapter One",
                "sort_order": 0,
                "printed_page_number": "1",
            })),
        ))
        .await
        .unwrap();
    store
        .send_sync(WriteOp::create(
            "TocEntry",
            fields(json!({
                "toc_id": toc_doc_id,
                "title": "Chapter Two",
                "sort_order": 1,
                "printed_page_number": "9",
                "actual_page": {"_docID": "page-doc"},
            })),
        ))
        .await
        .unwrap();

    let (book, _) = load(&store, "b1").await;
    read_book(&book, |b| {
        assert_eq!(b.toc_entries.len(), 2);
        let unlinked = b.unlinked_entries();
        assert_eq!(unlinked.len(), 1);
        assert_eq!(unlinked[0].title, "Chapter One");
    });
}

#[tokio::test]
async fn agent_state_rehydration() {
    let store = MemoryStore::new();
    seed_book(&store, "b1", 1).await;
    store
        .send_sync(WriteOp::create(
            "AgentState",
            fields(json!({
                "book_id": "b1",
                "agent_id": "agent-1",
                "agent_type": "toc_link",
                "entry_doc_id": "entry-1",
                "iteration": 2,
                "complete": false,
                "messages_json": "{\"action\":\"link_entry\"}",
            })),
        ))
        .await
        .unwrap();

    let (book, _) = load(&store, "b1").await;
    read_book(&book, |b| {
        let state = b.agent_state("agent-1").unwrap();
        assert_eq!(state.agent_type, "toc_link");
        assert_eq!(state.iteration, 2);
        assert!(!state.complete);
        assert!(!state.doc_id.is_empty());
    });
}

#[tokio::test]
async fn prompts_resolve_at_load() {
    let store = MemoryStore::new();
    seed_book(&store, "b1", 1).await;
    let (book, _) = load(&store, "b1").await;
    read_book(&book, |b| {
        assert!(b.prompts.contains_key("metadata"));
        assert!(b.prompts.contains_key("toc_link"));
        assert_eq!(b.prompt_cids["metadata"], "embedded");
    });
}

#[tokio::test]
async fn costs_and_runs_load_lazily() {
    let store = MemoryStore::new();
    seed_book(&store, "b1", 1).await;
    store
        .send_sync(WriteOp::create(
            "Metric",
            fields(json!({"book_id": "b1", "stage": "metadata", "cost_usd": 0.25})),
        ))
        .await
        .unwrap();
    store
        .send_sync(WriteOp::create(
            "Metric",
            fields(json!({"book_id": "b1", "stage": "metadata", "cost_usd": 0.50})),
        ))
        .await
        .unwrap();
    store
        .send_sync(WriteOp::create(
            "AgentRun",
            fields(json!({
                "book_id": "b1",
                "agent_type": "toc_link",
                "job_id": "job-1",
                "started_at_ms": 1000,
                "iterations": 4,
                "success": true,
            })),
        ))
        .await
        .unwrap();

    let (book, _) = load(&store, "b1").await;
    read_book(&book, |b| {
        assert!(!b.costs_loaded());
        assert!(b.agent_runs().is_none());
    });

    load_costs(&store, &book).await.unwrap();
    load_agent_runs(&store, &book).await.unwrap();
    read_book(&book, |b| {
        assert!((b.total_cost - 0.75).abs() < 1e-9);
        assert!((b.costs_by_stage().unwrap()["metadata"] - 0.75).abs() < 1e-9);
        let runs = b.agent_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].success);
    });
}

#[tokio::test]
async fn loads_chapters_when_structure_in_progress() {
    let store = MemoryStore::new();
    let book_doc_id = seed_book(&store, "b1", 10).await;
    store
        .send_sync(WriteOp::update(
            "Book",
            book_doc_id,
            fields(json!({"structure_started": true, "structure_phase": "extract"})),
        ))
        .await
        .unwrap();
    store
        .send_sync(WriteOp::create(
            "Chapter",
            fields(json!({
                "book_id": "b1",
                "unique_key": "key-1",
                "sort_order": 0,
                "title": "Chapter One",
                "start_page": 3,
                "end_page": 7,
            })),
        ))
        .await
        .unwrap();
    // Invalid span: skipped with a bug log, never loaded.
    store
        .send_sync(WriteOp::create(
            "Chapter",
            fields(json!({
                "book_id": "b1",
                "unique_key": "key-2",
                "sort_order": 1,
                "title": "Broken",
                "start_page": 9,
                "end_page": 4,
            })),
        ))
        .await
        .unwrap();

    let (book, _) = load(&store, "b1").await;
    read_book(&book, |b| {
        assert!(b.op_is_started(OpType::Structure));
        assert_eq!(b.structure_phase, "extract");
        assert_eq!(b.chapters().len(), 1);
        assert_eq!(b.chapters()[0].unique_key, "key-1");
    });
}
