//! Resetting an operation cascades downstream, cleans the store, and
//! leaves the book rerunnable.

use crate::prelude::*;
use bindery_core::{is_valid_reset_operation, read_book, OpType};
use bindery_engine::{reset_from, Job};
use bindery_storage::MemoryStore;
use std::sync::Arc;

#[test]
fn reset_operation_names_are_validated() {
    for name in [
        "metadata",
        "toc_finder",
        "toc_extract",
        "pattern_analysis",
        "toc_link",
        "toc_finalize",
        "structure",
        "labels",
        "blend",
        "ocr",
    ] {
        assert!(is_valid_reset_operation(name), "{name} should validate");
    }
    assert!(!is_valid_reset_operation("everything"));
    assert!(!is_valid_reset_operation("toc_finder; drop table"));
}

#[tokio::test]
async fn reset_after_a_full_run_allows_a_clean_rerun() {
    let store = Arc::new(MemoryStore::new());
    seed_book(&store, "b1", 3).await;
    let dispatcher = scripted_dispatcher();
    let job = make_job(&store, "b1").await;
    run_pipeline(&job, &dispatcher).await;
    assert!(job.done());

    let toc_doc_id = read_book(job.book(), |b| b.toc_doc_id.clone());
    reset_from(
        store.as_ref(),
        job.book(),
        Some(&toc_doc_id),
        OpType::TocExtract,
    )
    .await
    .unwrap();

    read_book(job.book(), |b| {
        // The cascade: extract, link, finalize, structure all restartable.
        for op in [
            OpType::TocExtract,
            OpType::TocLink,
            OpType::TocFinalize,
            OpType::Structure,
        ] {
            assert!(b.op_can_start(op), "{op} should be startable");
        }
        // Upstream stages keep their results.
        assert!(b.op_is_complete(OpType::TocFinder));
        assert!(b.op_is_complete(OpType::Metadata));
        assert!(b.toc_found);
        assert!(b.toc_entries.is_empty());
        assert!(b.chapters().is_empty());
    });
    assert!(store.docs("TocEntry").is_empty());
    assert!(store.docs("Chapter").is_empty());
    // Agent records for the reset stages are gone from the store.
    assert!(store.docs("AgentState").is_empty());

    // A fresh job over the same store runs the reset stages again.
    let dispatcher = scripted_dispatcher();
    let rerun = make_job(&store, "b1").await;
    run_pipeline(&rerun, &dispatcher).await;

    assert!(rerun.done());
    read_book(rerun.book(), |b| {
        for op in OpType::ALL {
            assert!(b.op_is_complete(op), "{op} should be complete after rerun");
        }
        assert_eq!(b.toc_entries.len(), 2);
        assert_eq!(b.chapters().len(), 2);
    });
    assert_eq!(store.docs("TocEntry").len(), 2);
    assert_eq!(store.docs("Chapter").len(), 2);
}
