// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{load, seed_book};
use bindery_core::{chapter_key, read_book, BookId, ChapterState};
use bindery_storage::MemoryStore;
use std::sync::Arc;

fn skeleton(book_id: &BookId, count: usize) -> Vec<ChapterState> {
    (0..count)
        .map(|index| ChapterState {
            unique_key: chapter_key(book_id, &format!("entry-{index}")),
            entry_id: format!("entry-{index}"),
            sort_order: index as u32,
            title: format!("Chapter {index}"),
            start_page: index as u32 + 1,
            end_page: index as u32 + 1,
            ..Default::default()
        })
        .collect()
}

#[tokio::test]
async fn skeleton_batch_is_atomic_in_memory() {
    let store = Arc::new(MemoryStore::new());
    seed_book(&store, "b1", 10).await;
    let (book, _) = load(&store, "b1").await;
    let book_id = read_book(&book, |b| b.id.clone());

    let mut chapters = skeleton(&book_id, 5);
    chapters[2].title = "boom-chapter".to_string();
    store.fail_writes_containing("boom-chapter");

    let err = write_chapter_skeleton(&store, &book, chapters.clone(), 5)
        .await
        .unwrap_err();
    match err {
        EngineError::ChapterBatch { failed, total } => {
            assert_eq!(failed, 1);
            assert_eq!(total, 5);
        }
        other => panic!("unexpected error: {other}"),
    }
    // Memory is untouched: no chapters, no counters, no CIDs.
    read_book(&book, |b| {
        assert!(b.chapters().is_empty());
        assert_eq!(b.structure.chapters_total, 0);
    });

    // A rerun with the injector cleared succeeds and records every CID.
    store.clear_write_failures();
    write_chapter_skeleton(&store, &book, chapters, 5)
        .await
        .unwrap();
    read_book(&book, |b| {
        assert_eq!(b.chapters().len(), 5);
        assert_eq!(b.structure.chapters_total, 5);
        for chapter in b.chapters() {
            assert!(!chapter.doc_id.is_empty());
            assert!(chapter.cid.starts_with("bafy"));
            assert_eq!(
                b.last_cid("Chapter", &chapter.doc_id),
                Some(chapter.cid.as_str())
            );
        }
    });
    assert_eq!(store.docs("Chapter").len(), 5);
}

#[tokio::test]
async fn upserts_converge_on_unique_key() {
    let store = Arc::new(MemoryStore::new());
    seed_book(&store, "b1", 10).await;
    let (book, _) = load(&store, "b1").await;
    let book_id = read_book(&book, |b| b.id.clone());

    let chapters = skeleton(&book_id, 3);
    write_chapter_skeleton(&store, &book, chapters.clone(), 2)
        .await
        .unwrap();
    let first_cids: Vec<String> =
        read_book(&book, |b| b.chapters().iter().map(|c| c.cid.clone()).collect());

    // Second run updates the same rows: same count, fresh CIDs.
    write_chapter_skeleton(&store, &book, chapters, 2)
        .await
        .unwrap();
    assert_eq!(store.docs("Chapter").len(), 3);
    read_book(&book, |b| {
        for (chapter, old_cid) in b.chapters().iter().zip(first_cids) {
            assert_ne!(chapter.cid, old_cid);
        }
    });
}

#[tokio::test]
async fn invalid_span_rejected_before_any_write() {
    let store = Arc::new(MemoryStore::new());
    seed_book(&store, "b1", 10).await;
    let (book, _) = load(&store, "b1").await;
    let book_id = read_book(&book, |b| b.id.clone());

    let mut chapters = skeleton(&book_id, 2);
    chapters[1].start_page = 8;
    chapters[1].end_page = 3;
    assert!(write_chapter_skeleton(&store, &book, chapters, 5)
        .await
        .is_err());
    assert!(store.docs("Chapter").is_empty());
}
