// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pattern-analysis stage: one LLM call over sampled headers and footers.

use super::{PipelineJob, StageStep, UnitInfo};
use crate::error::EngineError;
use bindery_adapters::ImageSource;
use bindery_core::{read_book, with_book, IdGen, OpType, WorkUnit, WorkUnitKind};
use bindery_storage::{StateStore, WriteOp};
use serde_json::{json, Map, Value};

impl<S, I, G> PipelineJob<S, I, G>
where
    S: StateStore,
    I: ImageSource,
    G: IdGen,
{
    pub(super) fn pattern_units(&self) -> Vec<WorkUnit> {
        vec![self.pattern_unit(UnitInfo::PatternAnalysis { retry_count: 0 })]
    }

    pub(super) fn pattern_unit(&self, info: UnitInfo) -> WorkUnit {
        let sample_pages = self.cfg.pattern_sample_pages as usize;
        let user = read_book(self.book(), |b| {
            b.pages()
                .take(sample_pages)
                .map(|(num, page)| {
                    format!(
                        "page {num}: header {:?}, footer {:?}",
                        page.header, page.footer
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        });
        let call = self.llm_call(OpType::PatternAnalysis, "pattern_analysis", user);
        self.register_unit(WorkUnitKind::Llm(call), info)
    }

    pub(super) async fn handle_pattern(&self, payload: &Value) -> Result<StageStep, EngineError> {
        let doc_id = with_book(self.book(), |b| {
            b.pattern_json = Some(payload.clone());
            b.book_doc_id.clone()
        });
        if !doc_id.is_empty() {
            let mut doc = Map::new();
            doc.insert(
                "page_pattern_analysis_json".to_string(),
                json!(payload.to_string()),
            );
            self.store.send(WriteOp::update("Book", doc_id, doc));
        }
        Ok(StageStep::Done)
    }
}
