// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ToC-extract stage: pull the entries out of the located ToC pages.

use super::{best_page_text, PipelineJob, StageStep, UnitInfo};
use crate::error::EngineError;
use crate::extract;
use bindery_adapters::ImageSource;
use bindery_core::{read_book, with_book, IdGen, OpType, TocEntry, WorkUnit, WorkUnitKind};
use bindery_storage::{StateStore, WriteOp};
use serde_json::{json, Map, Value};
use tracing::error;

impl<S, I, G> PipelineJob<S, I, G>
where
    S: StateStore,
    I: ImageSource,
    G: IdGen,
{
    pub(super) fn toc_extract_units(&self) -> Vec<WorkUnit> {
        let has_toc = read_book(self.book(), |b| b.toc_found && b.toc_start_page >= 1);
        if !has_toc {
            // No ToC: nothing to extract, the stage completes immediately.
            return Vec::new();
        }
        vec![self.toc_extract_unit(UnitInfo::TocExtract { retry_count: 0 })]
    }

    pub(super) fn toc_extract_unit(&self, info: UnitInfo) -> WorkUnit {
        let user = read_book(self.book(), |b| {
            let start = b.toc_start_page.max(1);
            let end = b.toc_end_page.max(start);
            (start..=end)
                .filter_map(|num| {
                    b.page(num)
                        .map(|page| format!("--- page {num} ---\n{}", best_page_text(page)))
                })
                .collect::<Vec<_>>()
                .join("\n")
        });
        let call = self.llm_call(OpType::TocExtract, "toc_extract", user);
        self.register_unit(WorkUnitKind::Llm(call), info)
    }

    pub(super) async fn handle_toc_extract(
        &self,
        info: &UnitInfo,
        payload: &Value,
    ) -> Result<StageStep, EngineError> {
        let Some(raw_entries) = payload.get("entries").and_then(Value::as_array) else {
            error!("BUG: toc_extract payload without entries array");
            return self.handle_failure(info, "malformed extraction payload").await;
        };

        let toc_doc_id = read_book(self.book(), |b| b.toc_doc_id.clone());
        let mut entries = Vec::with_capacity(raw_entries.len());
        let mut ops = Vec::with_capacity(raw_entries.len());
        for (index, raw) in raw_entries.iter().enumerate() {
            let entry = TocEntry {
                doc_id: String::new(),
                entry_number: extract::get_str(raw, "entry_number").unwrap_or_default(),
                title: extract::get_str(raw, "title").unwrap_or_default(),
                level: extract::get_u32(raw, "level").unwrap_or(0),
                level_name: extract::get_str(raw, "level_name").unwrap_or_default(),
                printed_page_number: extract::get_str(raw, "printed_page_number")
                    .unwrap_or_default(),
                sort_order: index as u32,
                actual_page_doc_id: None,
            };
            let mut doc = Map::new();
            doc.insert("toc_id".to_string(), json!(toc_doc_id));
            doc.insert("entry_number".to_string(), json!(entry.entry_number));
            doc.insert("title".to_string(), json!(entry.title));
            doc.insert("level".to_string(), json!(entry.level));
            doc.insert("level_name".to_string(), json!(entry.level_name));
            doc.insert(
                "printed_page_number".to_string(),
                json!(entry.printed_page_number),
            );
            doc.insert("sort_order".to_string(), json!(entry.sort_order));
            ops.push(WriteOp::create("TocEntry", doc));
            entries.push(entry);
        }

        let results = self.store.send_many_sync(ops).await?;
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            return self
                .handle_failure(info, &format!("{failed} entry writes failed"))
                .await;
        }
        for (entry, result) in entries.iter_mut().zip(results) {
            if let Ok(ack) = result {
                entry.doc_id = ack.doc_id.clone();
                with_book(self.book(), |b| {
                    b.track_write("TocEntry", &ack.doc_id, &ack.cid)
                });
            }
        }
        with_book(self.book(), |b| b.toc_entries = entries);
        Ok(StageStep::Done)
    }
}
