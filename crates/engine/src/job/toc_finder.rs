// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ToC-finder stage: locate the table of contents, creating the ToC
//! document on completion.

use super::{best_page_text, PipelineJob, StageStep, UnitInfo};
use crate::error::EngineError;
use crate::extract;
use bindery_adapters::ImageSource;
use bindery_core::{read_book, with_book, IdGen, OpType, WorkUnit, WorkUnitKind};
use bindery_storage::{Cond, StateStore};
use serde_json::{json, Map, Value};

impl<S, I, G> PipelineJob<S, I, G>
where
    S: StateStore,
    I: ImageSource,
    G: IdGen,
{
    pub(super) fn toc_finder_units(&self) -> Vec<WorkUnit> {
        vec![self.toc_finder_unit(UnitInfo::TocFinder { retry_count: 0 })]
    }

    pub(super) fn toc_finder_unit(&self, info: UnitInfo) -> WorkUnit {
        let sample_pages = self.cfg.finder_sample_pages as usize;
        let user = read_book(self.book(), |b| {
            b.pages()
                .take(sample_pages)
                .map(|(num, page)| format!("--- page {num} ---\n{}", best_page_text(page)))
                .collect::<Vec<_>>()
                .join("\n")
        });
        let call = self.llm_call(OpType::TocFinder, "toc_finder", user);
        self.register_unit(WorkUnitKind::Llm(call), info)
    }

    pub(super) async fn handle_toc_finder(
        &self,
        payload: &Value,
    ) -> Result<StageStep, EngineError> {
        let found = extract::get_bool(payload, "found").unwrap_or(false);
        let start_page = extract::get_u32(payload, "start_page").unwrap_or(0);
        let end_page = extract::get_u32(payload, "end_page").unwrap_or(0);

        let book_doc_id = read_book(self.book(), |b| b.book_doc_id.clone());
        if book_doc_id.is_empty() {
            with_book(self.book(), |b| {
                b.toc_found = found;
                b.toc_start_page = start_page;
                b.toc_end_page = end_page;
            });
            return Ok(StageStep::Done);
        }

        let mut doc = Map::new();
        doc.insert("book_id".to_string(), json!(book_doc_id));
        doc.insert("toc_found".to_string(), json!(found));
        doc.insert("start_page".to_string(), json!(start_page));
        doc.insert("end_page".to_string(), json!(end_page));
        let mut update = doc.clone();
        update.remove("book_id");

        let filter = vec![Cond::Eq("book_id".to_string(), json!(book_doc_id))];
        let ack = self
            .store
            .upsert_with_version("Toc", filter, doc, update)
            .await?;

        with_book(self.book(), |b| {
            b.toc_doc_id = ack.doc_id.clone();
            b.toc_found = found;
            b.toc_start_page = start_page;
            b.toc_end_page = end_page;
            b.track_write("Toc", &ack.doc_id, &ack.cid);
        });
        Ok(StageStep::Done)
    }
}
