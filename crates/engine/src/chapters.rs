// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chapter-skeleton batch writer.
//!
//! Upserts run concurrently under a bounded semaphore, but the in-memory
//! chapter list is only updated after the whole batch succeeds: a partial
//! failure surfaces an aggregated error and leaves memory untouched, so a
//! rerun starts from the same state.

use crate::error::EngineError;
use bindery_core::{read_book, with_book, ChapterState, SharedBook};
use bindery_storage::{Cond, StateStore, WriteAck};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::warn;

fn chapter_doc(book_id: &str, chapter: &ChapterState) -> Map<String, Value> {
    let mut doc = Map::new();
    doc.insert("book_id".to_string(), json!(book_id));
    doc.insert("unique_key".to_string(), json!(chapter.unique_key));
    doc.insert("entry_id".to_string(), json!(chapter.entry_id));
    doc.insert("sort_order".to_string(), json!(chapter.sort_order));
    doc.insert("level".to_string(), json!(chapter.level));
    doc.insert("level_name".to_string(), json!(chapter.level_name));
    doc.insert("entry_number".to_string(), json!(chapter.entry_number));
    doc.insert("title".to_string(), json!(chapter.title));
    doc.insert("start_page".to_string(), json!(chapter.start_page));
    doc.insert("end_page".to_string(), json!(chapter.end_page));
    doc.insert("word_count".to_string(), json!(chapter.word_count));
    doc.insert("extract_done".to_string(), json!(chapter.extract_done));
    doc.insert("polish_done".to_string(), json!(chapter.polish_done));
    doc.insert("polish_failed".to_string(), json!(chapter.polish_failed));
    if let Some(parent_id) = &chapter.parent_id {
        doc.insert("parent_id".to_string(), json!(parent_id));
    }
    doc
}

/// Write the chapter skeleton. On success, memory holds the chapters with
/// their doc ids and CIDs and `structure.chapters_total` is set; on
/// partial failure nothing in memory changes.
pub async fn write_chapter_skeleton<S: StateStore>(
    store: &Arc<S>,
    book: &SharedBook,
    chapters: Vec<ChapterState>,
    concurrency: usize,
) -> Result<(), EngineError> {
    for chapter in &chapters {
        chapter.validate_span()?;
    }
    let book_id = read_book(book, |b| b.id.clone());
    let total = chapters.len();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    let mut handles = Vec::with_capacity(total);
    for (index, chapter) in chapters.iter().enumerate() {
        let store = Arc::clone(store);
        let semaphore = Arc::clone(&semaphore);
        let doc = chapter_doc(book_id.as_str(), chapter);
        let unique_key = chapter.unique_key.clone();
        handles.push(tokio::spawn(async move {
            // Closed semaphore never happens here; treat it as a write error.
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|err| bindery_storage::StoreError::Write(err.to_string()))?;
            let filter = vec![Cond::Eq("unique_key".to_string(), json!(unique_key))];
            store
                .upsert_with_version("Chapter", filter, doc.clone(), doc)
                .await
                .map(|ack| (index, ack))
        }));
    }

    let mut acks: Vec<Option<WriteAck>> = vec![None; total];
    let mut failed = 0usize;
    for handle in handles {
        match handle.await {
            Ok(Ok((index, ack))) => acks[index] = Some(ack),
            Ok(Err(err)) => {
                warn!(book_id = %book_id, %err, "chapter upsert failed");
                failed += 1;
            }
            Err(err) => {
                warn!(book_id = %book_id, %err, "chapter upsert task panicked");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(EngineError::ChapterBatch { failed, total });
    }

    let mut written = chapters;
    for (chapter, ack) in written.iter_mut().zip(acks.into_iter()) {
        if let Some(ack) = ack {
            chapter.doc_id = ack.doc_id;
            chapter.cid = ack.cid;
        }
    }
    with_book(book, |b| {
        for chapter in &written {
            b.track_write("Chapter", &chapter.doc_id, &chapter.cid);
        }
        b.structure.chapters_total = written.len() as u32;
        b.set_chapters(written);
    });
    Ok(())
}

#[cfg(test)]
#[path = "chapters_tests.rs"]
mod tests;
