// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Label stage: per-page printed page-number and running-header labels.

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
    pub(super) fn labels_units(&self) -> Vec<WorkUnit> {
        let pages: Vec<u32> = read_book(self.book(), |b| {
            b.pages()
                .filter(|(_, page)| !page.label_done)
                .map(|(num, _)| num)
                .collect()
        });
        pages
            .into_iter()
            .filter_map(|page| {
                self.labels_unit(
                    page,
                    UnitInfo::Labels {
                        page,
                        retry_count: 0,
                    },
                )
            })
            .collect()
    }

    pub(super) fn labels_unit(&self, page: u32, info: UnitInfo) -> Option<WorkUnit> {
        let user = read_book(self.book(), |b| {
            let pattern = b
                .pattern_json
                .as_ref()
                .map(Value::to_string)
                .unwrap_or_default();
            b.page(page).map(|state| {
                format!(
                    "pattern: {pattern}\npage {page}: header {:?}, footer {:?}",
                    state.header, state.footer
                )
            })
        })?;
        let call = self.llm_call(OpType::Labels, "labels", user);
        Some(self.register_unit(WorkUnitKind::Llm(call), info))
    }

    pub(super) async fn handle_labels(
        &self,
        page: u32,
        payload: &Value,
    ) -> Result<StageStep, EngineError> {
        let label = extract::get_str(payload, "page_number_label").unwrap_or_default();
        let running_header = extract::get_str(payload, "running_header").unwrap_or_default();

        let page_doc_id = with_book(self.book(), |b| {
            let Some(state) = b.page_mut(page) else {
                error!(page, "BUG: label completion for unknown page");
                return String::new();
            };
            state.page_number_label = label.clone();
            state.running_header = running_header.clone();
            state.label_done = true;
            state.page_doc_id.clone()
        });

        if !page_doc_id.is_empty() {
            let mut doc = Map::new();
            doc.insert("page_number_label".to_string(), json!(label));
            doc.insert("running_header".to_string(), json!(running_header));
            doc.insert("label_complete".to_string(), json!(true));
            self.store.send(WriteOp::update("Page", page_doc_id, doc));
        }
        Ok(StageStep::Wait)
    }
}
