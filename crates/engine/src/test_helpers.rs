// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests

use crate::config::PipelineConfig;
use crate::loader::load_book;
use bindery_adapters::EmbeddedPrompts;
use bindery_core::SharedBook;
use bindery_storage::{MemoryStore, StateStore, WriteOp};
use serde_json::{json, Map, Value};

pub(crate) fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Seed a Book record plus its Page records; returns the book doc id.
pub(crate) async fn seed_book(store: &MemoryStore, book_id: &str, page_count: u32) -> String {
    let ack = store
        .send_sync(WriteOp::create(
            "Book",
            fields(json!({
                "book_id": book_id,
                "page_count": page_count,
                "status": "new",
            })),
        ))
        .await
        .unwrap();
    for page_num in 1..=page_count {
        store
            .send_sync(WriteOp::create(
                "Page",
                fields(json!({
                    "book_id": book_id,
                    "page_num": page_num,
                })),
            ))
            .await
            .unwrap();
    }
    ack.doc_id
}

/// Seed a Toc record linked to the book doc; returns the toc doc id.
pub(crate) async fn seed_toc(store: &MemoryStore, book_doc_id: &str, extra: Value) -> String {
    let mut doc = fields(json!({"book_id": book_doc_id}));
    for (key, value) in fields(extra) {
        doc.insert(key, value);
    }
    store
        .send_sync(WriteOp::create("Toc", doc))
        .await
        .unwrap()
        .doc_id
}

pub(crate) async fn load(store: &MemoryStore, book_id: &str) -> (SharedBook, Option<String>) {
    load_book(store, &EmbeddedPrompts, &PipelineConfig::default(), book_id)
        .await
        .unwrap()
}
