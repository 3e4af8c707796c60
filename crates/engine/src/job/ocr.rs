// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OCR stage: one unit per missing (page, provider) pair.

use super::{PipelineJob, StageStep, UnitInfo};
use crate::error::EngineError;
use crate::extract;
use bindery_adapters::ImageSource;
use bindery_core::{read_book, with_book, IdGen, OcrCall, WorkUnit, WorkUnitKind};
use bindery_storage::{StateStore, WriteOp};
use serde_json::{json, Map, Value};
use tracing::{error, warn};

/// Paddle output longer than this multiple of the best other provider's
/// output is treated as garbage and stored as a blank result.
const PADDLE_INFLATION_LIMIT: usize = 3;

impl<S, I, G> PipelineJob<S, I, G>
where
    S: StateStore,
    I: ImageSource,
    G: IdGen,
{
    pub(super) async fn ocr_units(&self) -> Result<Vec<WorkUnit>, EngineError> {
        let missing: Vec<(u32, String)> = read_book(self.book(), |b| {
            b.pages()
                .filter(|(_, page)| !page.ocr_complete)
                .flat_map(|(num, page)| {
                    self.cfg
                        .ocr_providers
                        .iter()
                        .filter(|provider| !page.has_provider(provider))
                        .map(move |provider| (num, provider.clone()))
                        .collect::<Vec<_>>()
                })
                .collect()
        });

        let mut units = Vec::with_capacity(missing.len());
        for (page, provider) in missing {
            let info = UnitInfo::Ocr {
                page,
                provider: provider.clone(),
                retry_count: 0,
            };
            if let Some(unit) = self.ocr_unit(page, provider, info).await? {
                units.push(unit);
            }
        }
        Ok(units)
    }

    pub(super) async fn ocr_unit(
        &self,
        page: u32,
        provider: String,
        info: UnitInfo,
    ) -> Result<Option<WorkUnit>, EngineError> {
        let book_id = read_book(self.book(), |b| b.id.clone());
        match self.images.page_image(&book_id, page).await {
            Ok(image) => Ok(Some(self.register_unit(
                WorkUnitKind::Ocr(OcrCall {
                    image,
                    page,
                    provider,
                }),
                info,
            ))),
            Err(err) => {
                warn!(book_id = %book_id, page, %err, "page image unavailable; skipping unit");
                Ok(None)
            }
        }
    }

    pub(super) async fn handle_ocr(
        &self,
        page: u32,
        provider: &str,
        payload: &Value,
    ) -> Result<StageStep, EngineError> {
        // A missing or empty text is a valid blank-page result.
        let text = extract::get_str(payload, "text").unwrap_or_default();

        let providers = self.cfg.ocr_providers.clone();
        let (page_doc_id, text, now_complete) = with_book(self.book(), |b| {
            let Some(state) = b.page_mut(page) else {
                error!(page, "BUG: ocr completion for unknown page");
                return (String::new(), text.clone(), false);
            };
            let text = if provider == "paddle" {
                filter_paddle(&state.ocr_results, text.clone())
            } else {
                text.clone()
            };
            state.set_ocr_result(provider, text.clone());
            let complete = providers.iter().all(|p| state.has_provider(p));
            if complete {
                state.ocr_complete = true;
            }
            (state.page_doc_id.clone(), text, complete)
        });

        if !page_doc_id.is_empty() {
            let mut doc = Map::new();
            doc.insert("page_id".to_string(), json!(page_doc_id));
            doc.insert("provider".to_string(), json!(provider));
            doc.insert("text".to_string(), json!(text));
            self.store.send(WriteOp::create("OcrResult", doc));

            if now_complete {
                let mut doc = Map::new();
                doc.insert("ocr_complete".to_string(), json!(true));
                self.store.send(WriteOp::update("Page", page_doc_id, doc));
            }
        }
        Ok(StageStep::Wait)
    }
}

/// Drop paddle output that dwarfs every other provider's result for the
/// same page. Other providers are stored unfiltered.
fn filter_paddle(
    existing: &std::collections::HashMap<String, String>,
    text: String,
) -> String {
    let longest_other = existing
        .iter()
        .filter(|(provider, _)| provider.as_str() != "paddle")
        .map(|(_, t)| t.chars().count())
        .max()
        .unwrap_or(0);
    if longest_other > 0 && text.chars().count() > PADDLE_INFLATION_LIMIT * longest_other {
        return String::new();
    }
    text
}

#[cfg(test)]
#[path = "ocr_tests.rs"]
mod tests;
