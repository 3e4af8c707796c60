// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metadata stage: one LLM call over sampled front-matter text.

use super::{best_page_text, PipelineJob, StageStep, UnitInfo};
use crate::error::EngineError;
use crate::extract;
use bindery_adapters::ImageSource;
use bindery_core::{read_book, with_book, BookMeta, IdGen, OpType, WorkUnit, WorkUnitKind};
use bindery_storage::StateStore;
use serde_json::{json, Map, Value};

impl<S, I, G> PipelineJob<S, I, G>
where
    S: StateStore,
    I: ImageSource,
    G: IdGen,
{
    pub(super) fn metadata_units(&self) -> Vec<WorkUnit> {
        vec![self.metadata_unit(UnitInfo::Metadata { retry_count: 0 })]
    }

    pub(super) fn metadata_unit(&self, info: UnitInfo) -> WorkUnit {
        let sample_pages = self.cfg.metadata_sample_pages as usize;
        let user = read_book(self.book(), |b| {
            b.pages()
                .take(sample_pages)
                .map(|(num, page)| format!("--- page {num} ---\n{}", best_page_text(page)))
                .collect::<Vec<_>>()
                .join("\n")
        });
        let call = self.llm_call(OpType::Metadata, "metadata", user);
        self.register_unit(WorkUnitKind::Llm(call), info)
    }

    pub(super) async fn handle_metadata(&self, payload: &Value) -> Result<StageStep, EngineError> {
        let meta = BookMeta {
            title: extract::get_str(payload, "title").unwrap_or_default(),
            author: extract::get_str(payload, "author").unwrap_or_default(),
            isbn: extract::get_str(payload, "isbn").unwrap_or_default(),
            lccn: extract::get_str(payload, "lccn").unwrap_or_default(),
            publisher: extract::get_str(payload, "publisher").unwrap_or_default(),
            publication_year: extract::get_u32(payload, "publication_year"),
            language: extract::get_str(payload, "language").unwrap_or_default(),
            description: extract::get_str(payload, "description").unwrap_or_default(),
        };

        let mut doc = Map::new();
        doc.insert("title".to_string(), json!(meta.title));
        doc.insert("author".to_string(), json!(meta.author));
        doc.insert("isbn".to_string(), json!(meta.isbn));
        doc.insert("lccn".to_string(), json!(meta.lccn));
        doc.insert("publisher".to_string(), json!(meta.publisher));
        if let Some(year) = meta.publication_year {
            doc.insert("publication_year".to_string(), json!(year));
        }
        doc.insert("language".to_string(), json!(meta.language));
        doc.insert("description".to_string(), json!(meta.description));

        let doc_id = with_book(self.book(), |b| {
            b.meta = meta;
            b.book_doc_id.clone()
        });
        if !doc_id.is_empty() {
            let ack = self.store.update_with_version("Book", &doc_id, doc).await?;
            with_book(self.book(), |b| b.track_write("Book", &ack.doc_id, &ack.cid));
        }
        Ok(StageStep::Done)
    }
}
