// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blend stage: per-page merge of provider OCR texts into markdown.

use super::{PipelineJob, StageStep, UnitInfo};
use crate::error::EngineError;
use crate::extract;
use bindery_adapters::ImageSource;
use bindery_core::{read_book, with_book, IdGen, OpType, WorkUnit, WorkUnitKind};
use bindery_storage::{StateStore, WriteOp};
use serde_json::{json, Map, Value};
use tracing::error;

impl<S, I, G> PipelineJob<S, I, G>
where
    S: StateStore,
    I: ImageSource,
    G: IdGen,
{
    pub(super) fn blend_units(&self) -> Vec<WorkUnit> {
        let pages: Vec<u32> = read_book(self.book(), |b| {
            b.pages()
                .filter(|(_, page)| page.ocr_complete && !page.blend_done)
                .map(|(num, _)| num)
                .collect()
        });
        pages
            .into_iter()
            .filter_map(|page| {
                self.blend_unit(
                    page,
                    UnitInfo::Blend {
                        page,
                        retry_count: 0,
                    },
                )
            })
            .collect()
    }

    pub(super) fn blend_unit(&self, page: u32, info: UnitInfo) -> Option<WorkUnit> {
        let user = read_book(self.book(), |b| {
            b.page(page).map(|state| {
                state
                    .ocr_results
                    .iter()
                    .map(|(provider, text)| format!("--- {provider} ---\n{text}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        })?;
        let call = self.llm_call(OpType::Blend, "blend", user);
        Some(self.register_unit(WorkUnitKind::Llm(call), info))
    }

    pub(super) async fn handle_blend(
        &self,
        page: u32,
        payload: &Value,
    ) -> Result<StageStep, EngineError> {
        let markdown = extract::get_str(payload, "markdown").unwrap_or_default();
        let headings = extract::get_str_array(payload, "headings");
        let header = extract::get_str(payload, "header").unwrap_or_default();
        let footer = extract::get_str(payload, "footer").unwrap_or_default();

        let page_doc_id = with_book(self.book(), |b| {
            let Some(state) = b.page_mut(page) else {
                error!(page, "BUG: blend completion for unknown page");
                return String::new();
            };
            state.ocr_markdown = markdown.clone();
            state.headings = headings.clone();
            state.header = header.clone();
            state.footer = footer.clone();
            state.blend_done = true;
            state.page_doc_id.clone()
        });

        if !page_doc_id.is_empty() {
            let mut doc = Map::new();
            doc.insert("ocr_markdown".to_string(), json!(markdown));
            doc.insert("headings".to_string(), json!(headings));
            doc.insert("header".to_string(), json!(header));
            doc.insert("footer".to_string(), json!(footer));
            doc.insert("blend_complete".to_string(), json!(true));
            self.store.send(WriteOp::update("Page", page_doc_id, doc));
        }
        Ok(StageStep::Wait)
    }
}
