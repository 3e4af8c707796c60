//! A crash between completions loses nothing: the loader reconstructs
//! the exact pre-crash state and the job resumes mid-stage.

use crate::prelude::*;
use bindery_core::{read_book, OpType};
use bindery_engine::Job;
use bindery_storage::MemoryStore;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn restart_mid_ocr_resumes_only_the_missing_pages() {
    let store = Arc::new(MemoryStore::new());
    seed_book(&store, "b1", 3).await;
    let dispatcher = scripted_dispatcher();

    // First process: finish metadata, then complete OCR for exactly one
    // page before "crashing".
    {
        let job = make_job(&store, "b1").await;
        let units = job.start().await.unwrap();
        dispatcher.submit(units).await.unwrap();

        let metadata_results = dispatcher.take_results();
        assert_eq!(metadata_results.len(), 1);
        for result in metadata_results {
            let follow_ups = job.on_complete(result).await.unwrap();
            dispatcher.submit(follow_ups).await.unwrap();
        }

        let mut ocr_results = dispatcher.take_results();
        assert_eq!(ocr_results.len(), 3, "one OCR unit per page");
        let first = ocr_results.remove(0);
        job.on_complete(first).await.unwrap();
        // The job (and its tracker) is dropped here with two units
        // outstanding; the store keeps the durable truth.
    }

    // Sanity: one page durable, two not.
    let durable: usize = store
        .docs("Page")
        .iter()
        .filter(|p| p["ocr_complete"] == json!(true))
        .count();
    assert_eq!(durable, 1);

    // Second process: fresh dispatcher, fresh load, same store.
    let dispatcher = scripted_dispatcher();
    let job = make_job(&store, "b1").await;
    let units = job.start().await.unwrap();
    // Only the two unfinished pages are re-emitted.
    assert_eq!(units.len(), 2);
    dispatcher.submit(units).await.unwrap();

    while !job.done() {
        let results = dispatcher.take_results();
        if results.is_empty() {
            break;
        }
        for result in results {
            let follow_ups = job.on_complete(result).await.unwrap();
            dispatcher.submit(follow_ups).await.unwrap();
        }
    }

    assert!(job.done());
    read_book(job.book(), |b| {
        assert!(b.op_is_complete(OpType::Metadata));
        assert!(b.op_is_complete(OpType::Structure));
        assert_eq!(b.meta.title, "A Field Guide to Bindings");
    });
    // No page was OCRed twice.
    assert_eq!(store.docs("OcrResult").len(), 3);
}

#[tokio::test]
async fn restart_mid_link_resumes_the_persisted_agents() {
    let store = Arc::new(MemoryStore::new());
    let book_doc_id = seed_book(&store, "b1", 3).await;
    // Fast-forward the durable state to "toc_link in progress": earlier
    // stages complete, two entries, one already linked by an agent that
    // survived, one with a live agent mid-loop.
    store
        .send_sync(bindery_storage::WriteOp::update(
            "Book",
            book_doc_id.clone(),
            fields(json!({
                "metadata_complete": true,
                "pattern_analysis_complete": true,
            })),
        ))
        .await
        .unwrap();
    for doc in store.docs("Page") {
        let doc_id = doc["_docID"].as_str().unwrap().to_string();
        store
            .send_sync(bindery_storage::WriteOp::update(
                "Page",
                doc_id,
                fields(json!({
                    "ocr_complete": true,
                    "blend_complete": true,
                    "label_complete": true,
                })),
            ))
            .await
            .unwrap();
    }
    let toc_ack = store
        .send_sync(bindery_storage::WriteOp::create(
            "Toc",
            fields(json!({
                "book_id": book_doc_id,
                "toc_found": true,
                "start_page": 1,
                "end_page": 1,
                "finder_complete": true,
                "extract_complete": true,
                "link_started": true,
            })),
        ))
        .await
        .unwrap();
    let page_doc = store.docs("Page")[1]["_docID"].as_str().unwrap().to_string();
    store
        .send_sync(bindery_storage::WriteOp::create(
            "TocEntry",
            fields(json!({
                "toc_id": toc_ack.doc_id,
                "title": "Linked already",
                "printed_page_number": "2",
                "sort_order": 0,
                "actual_page": {"_docID": page_doc},
            })),
        ))
        .await
        .unwrap();
    let entry_ack = store
        .send_sync(bindery_storage::WriteOp::create(
            "TocEntry",
            fields(json!({
                "toc_id": toc_ack.doc_id,
                "title": "Still unlinked",
                "printed_page_number": "3",
                "sort_order": 1,
            })),
        ))
        .await
        .unwrap();
    store
        .send_sync(bindery_storage::WriteOp::create(
            "AgentState",
            fields(json!({
                "book_id": "b1",
                "agent_id": "agent-survivor",
                "agent_type": "toc_link",
                "entry_doc_id": entry_ack.doc_id,
                "iteration": 1,
                "complete": false,
                "messages_json": json!({
                    "action": "link_entry",
                    "entry": {"printed_page_number": "3"},
                }).to_string(),
            })),
        ))
        .await
        .unwrap();

    let dispatcher = scripted_dispatcher();
    let job = make_job(&store, "b1").await;
    let units = job.start().await.unwrap();
    // Exactly one unit: the surviving agent's current iteration, not a
    // fresh agent (which would re-spend its work).
    assert_eq!(units.len(), 1);
    read_book(job.book(), |b| {
        let state = b.agent_state("agent-survivor").unwrap();
        assert_eq!(state.iteration, 1);
    });

    dispatcher.submit(units).await.unwrap();
    while !job.done() {
        let results = dispatcher.take_results();
        if results.is_empty() {
            break;
        }
        for result in results {
            let follow_ups = job.on_complete(result).await.unwrap();
            dispatcher.submit(follow_ups).await.unwrap();
        }
    }

    assert!(job.done());
    read_book(job.book(), |b| {
        assert!(b.op_is_complete(OpType::TocLink));
        assert!(b.toc_entries.iter().all(|e| e.is_linked()));
        // No duplicate agent was spawned for the surviving entry.
        let link_agents: Vec<_> = b
            .all_agent_states()
            .into_iter()
            .filter(|s| s.agent_type == "toc_link")
            .collect();
        assert_eq!(link_agents.len(), 1);
    });
}
