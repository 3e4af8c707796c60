// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structure stage: chapter skeleton, then per-chapter extract and polish.
//!
//! The skeleton is computed mechanically from the linked ToC entries and
//! written in one bounded-concurrency batch. Each chapter then gets an
//! agent whose first iteration extracts the mechanical text and whose
//! second polishes it; polish failures are recorded per chapter rather
//! than failing the stage.

use super::{best_page_text, PipelineJob, StageStep, UnitInfo};
use crate::chapters::write_chapter_skeleton;
use crate::error::EngineError;
use crate::extract;
use bindery_adapters::ImageSource;
use bindery_core::{
    chapter_key, read_book, with_book, AgentId, ChapterState, IdGen, OpType, WorkUnit,
};
use bindery_storage::{StateStore, WriteOp};
use serde_json::{json, Map, Value};
use tracing::error;

const AGENT_TYPE: &str = "structure";

const PHASE_EXTRACT: &str = "extract";
const PHASE_POLISH: &str = "polish";
const PHASE_COMPLETE: &str = "complete";

impl<S, I, G> PipelineJob<S, I, G>
where
    S: StateStore,
    I: ImageSource,
    G: IdGen,
{
    pub(super) async fn structure_units(&self) -> Result<Vec<WorkUnit>, EngineError> {
        let phase = read_book(self.book(), |b| b.structure_phase.clone());
        if phase == PHASE_COMPLETE {
            return Ok(Vec::new());
        }

        if phase.is_empty() {
            let skeleton = read_book(self.book(), |b| build_skeleton(b));
            if skeleton.is_empty() {
                // Nothing linked: the stage completes immediately.
                return Ok(Vec::new());
            }
            write_chapter_skeleton(
                &self.store,
                self.book(),
                skeleton,
                self.cfg.chapter_write_concurrency,
            )
            .await?;
            self.set_structure_phase(PHASE_EXTRACT).await?;
        }

        let resumed = self.resume_agent_units(OpType::Structure, AGENT_TYPE);
        if !resumed.is_empty() {
            return Ok(resumed);
        }

        // One agent per chapter still needing extract or polish.
        let pending: Vec<ChapterState> = read_book(self.book(), |b| {
            b.chapters()
                .iter()
                .filter(|c| !c.extract_done || !(c.polish_done || c.polish_failed))
                .cloned()
                .collect()
        });
        let mut units = Vec::with_capacity(pending.len());
        for chapter in pending {
            let payload = if chapter.extract_done {
                self.polish_payload(&chapter)
            } else {
                self.extract_payload(&chapter)
            };
            units.push(
                self.spawn_agent(OpType::Structure, AGENT_TYPE, &chapter.unique_key, payload)
                    .await?,
            );
        }
        Ok(units)
    }

    fn extract_payload(&self, chapter: &ChapterState) -> Value {
        let text = read_book(self.book(), |b| {
            let end = if chapter.end_page == 0 {
                b.total_pages
            } else {
                chapter.end_page
            };
            (chapter.start_page..=end)
                .filter_map(|num| b.page(num).map(|p| best_page_text(p).to_string()))
                .collect::<Vec<_>>()
                .join("\n")
        });
        json!({
            "action": "extract_chapter",
            "prompt": self.prompt("structure_extract"),
            "chapter": {"unique_key": chapter.unique_key, "title": chapter.title},
            "pages": text,
        })
    }

    fn polish_payload(&self, chapter: &ChapterState) -> Value {
        json!({
            "action": "polish_chapter",
            "prompt": self.prompt("structure_polish"),
            "chapter": {"unique_key": chapter.unique_key, "title": chapter.title},
            "text": chapter.mechanical_text,
        })
    }

    pub(super) async fn handle_structure(
        &self,
        info: &UnitInfo,
        payload: &Value,
    ) -> Result<StageStep, EngineError> {
        let UnitInfo::AgentStep {
            agent_id,
            entry_doc_id: unique_key,
            iteration,
            retry_count,
            ..
        } = info
        else {
            return Ok(StageStep::Wait);
        };
        self.record_agent_iteration(agent_id, payload).await?;

        if *iteration == 0 {
            self.apply_extract_result(agent_id, unique_key, *retry_count, payload)
                .await
        } else {
            self.apply_polish_result(agent_id, unique_key, payload).await
        }
    }

    async fn apply_extract_result(
        &self,
        agent_id: &AgentId,
        unique_key: &str,
        retry_count: u32,
        payload: &Value,
    ) -> Result<StageStep, EngineError> {
        let text = extract::get_str(payload, "text").unwrap_or_default();
        let word_count = text.split_whitespace().count() as u32;
        let kind = extract::get_str(payload, "kind").unwrap_or_default();
        let confidence = extract::get_f64(payload, "confidence").unwrap_or(0.0) as f32;

        let chapter_doc_id = with_book(self.book(), |b| {
            let Some(chapter) = b.chapter_mut(unique_key) else {
                error!(%unique_key, "BUG: extract result for unknown chapter");
                return String::new();
            };
            chapter.mechanical_text = text.clone();
            chapter.word_count = word_count;
            chapter.kind = kind.clone();
            chapter.confidence = confidence;
            chapter.extract_done = true;
            let doc_id = chapter.doc_id.clone();
            b.structure.chapters_extracted += 1;
            doc_id
        });
        if chapter_doc_id.is_empty() {
            return Ok(StageStep::Wait);
        }

        let mut doc = Map::new();
        doc.insert("mechanical_text".to_string(), json!(text));
        doc.insert("word_count".to_string(), json!(word_count));
        doc.insert("kind".to_string(), json!(kind));
        doc.insert("confidence".to_string(), json!(confidence));
        doc.insert("extract_done".to_string(), json!(true));
        self.store.send(WriteOp::update("Chapter", chapter_doc_id, doc));
        self.persist_structure_counters();

        let all_extracted = read_book(self.book(), |b| {
            b.chapters().iter().all(|c| c.extract_done)
        });
        if all_extracted {
            self.set_structure_phase(PHASE_POLISH).await?;
        }

        let chapter = read_book(self.book(), |b| {
            b.chapters()
                .iter()
                .find(|c| c.unique_key == unique_key)
                .cloned()
        });
        let Some(chapter) = chapter else {
            return Ok(StageStep::Wait);
        };
        let unit = self.agent_unit(
            OpType::Structure,
            agent_id,
            unique_key,
            1,
            retry_count,
            self.polish_payload(&chapter),
        );
        Ok(StageStep::Units(vec![unit]))
    }

    async fn apply_polish_result(
        &self,
        agent_id: &AgentId,
        unique_key: &str,
        payload: &Value,
    ) -> Result<StageStep, EngineError> {
        let text = extract::get_str(payload, "text").unwrap_or_default();

        let chapter_doc_id = with_book(self.book(), |b| {
            let Some(chapter) = b.chapter_mut(unique_key) else {
                error!(%unique_key, "BUG: polish result for unknown chapter");
                return String::new();
            };
            chapter.polished_text = text.clone();
            chapter.polish_done = true;
            let doc_id = chapter.doc_id.clone();
            b.structure.chapters_polished += 1;
            doc_id
        });
        if !chapter_doc_id.is_empty() {
            let mut doc = Map::new();
            doc.insert("polished_text".to_string(), json!(text));
            doc.insert("polish_done".to_string(), json!(true));
            self.store.send(WriteOp::update("Chapter", chapter_doc_id, doc));
            self.persist_structure_counters();
        }

        let result = payload.get("result").cloned().unwrap_or(Value::Null);
        self.finish_agent(agent_id, &result, true, None).await?;
        self.finish_structure_if_settled().await
    }

    /// A polish failure marks the chapter, not the stage.
    pub(super) async fn handle_polish_failure(
        &self,
        info: &UnitInfo,
        message: &str,
    ) -> Result<StageStep, EngineError> {
        let UnitInfo::AgentStep {
            agent_id,
            entry_doc_id: unique_key,
            ..
        } = info
        else {
            return Ok(StageStep::Wait);
        };

        let chapter_doc_id = with_book(self.book(), |b| {
            let Some(chapter) = b.chapter_mut(unique_key) else {
                return String::new();
            };
            chapter.polish_failed = true;
            let doc_id = chapter.doc_id.clone();
            b.structure.polish_failed += 1;
            doc_id
        });
        if !chapter_doc_id.is_empty() {
            let mut doc = Map::new();
            doc.insert("polish_failed".to_string(), json!(true));
            self.store.send(WriteOp::update("Chapter", chapter_doc_id, doc));
            self.persist_structure_counters();
        }

        self.finish_agent(agent_id, &Value::Null, false, Some(message))
            .await?;
        self.finish_structure_if_settled().await
    }

    async fn finish_structure_if_settled(&self) -> Result<StageStep, EngineError> {
        let settled = read_book(self.book(), |b| {
            !b.chapters().is_empty()
                && b.chapters()
                    .iter()
                    .all(|c| c.extract_done && (c.polish_done || c.polish_failed))
        });
        if settled {
            self.set_structure_phase(PHASE_COMPLETE).await?;
            return Ok(StageStep::Done);
        }
        Ok(StageStep::Wait)
    }

    fn persist_structure_counters(&self) {
        let (book_doc_id, progress) =
            read_book(self.book(), |b| (b.book_doc_id.clone(), b.structure));
        if book_doc_id.is_empty() {
            return;
        }
        let mut doc = Map::new();
        doc.insert(
            "structure_chapters_total".to_string(),
            json!(progress.chapters_total),
        );
        doc.insert(
            "structure_chapters_extracted".to_string(),
            json!(progress.chapters_extracted),
        );
        doc.insert(
            "structure_chapters_polished".to_string(),
            json!(progress.chapters_polished),
        );
        doc.insert(
            "structure_polish_failed".to_string(),
            json!(progress.polish_failed),
        );
        self.store.send(WriteOp::update("Book", book_doc_id, doc));
    }

    /// Persist the structure phase label (synchronously: restart recovery
    /// keys off it).
    async fn set_structure_phase(&self, phase: &str) -> Result<(), EngineError> {
        let book_doc_id = with_book(self.book(), |b| {
            b.structure_phase = phase.to_string();
            b.book_doc_id.clone()
        });
        if book_doc_id.is_empty() {
            return Ok(());
        }
        let mut doc = Map::new();
        doc.insert("structure_phase".to_string(), json!(phase));
        let ack = self
            .store
            .update_with_version("Book", &book_doc_id, doc)
            .await?;
        with_book(self.book(), |b| b.track_write("Book", &ack.doc_id, &ack.cid));
        Ok(())
    }
}

/// Compute the chapter skeleton from the linked ToC entries: spans run
/// from each entry's page to just before the next entry's page, the last
/// chapter running to the end of the book.
fn build_skeleton(book: &bindery_core::BookState) -> Vec<ChapterState> {
    let mut linked: Vec<(u32, &bindery_core::TocEntry)> = book
        .toc_entries
        .iter()
        .filter_map(|entry| {
            let page_doc = entry.actual_page_doc_id.as_deref()?;
            let page_num = book.page_number_for_doc(page_doc)?;
            Some((page_num, entry))
        })
        .collect();
    linked.sort_by_key(|(page, entry)| (*page, entry.sort_order));

    let mut chapters = Vec::with_capacity(linked.len());
    for (index, (start_page, entry)) in linked.iter().enumerate() {
        let end_page = match linked.get(index + 1) {
            Some((next_start, _)) if *next_start > *start_page => next_start - 1,
            Some(_) => *start_page,
            None => book.total_pages,
        };
        // Parent is the nearest preceding entry with a shallower level.
        let parent_id = linked[..index]
            .iter()
            .rev()
            .find(|(_, candidate)| candidate.level < entry.level)
            .map(|(_, parent)| chapter_key(&book.id, &parent.doc_id));
        chapters.push(ChapterState {
            unique_key: chapter_key(&book.id, &entry.doc_id),
            entry_id: entry.doc_id.clone(),
            parent_id,
            sort_order: entry.sort_order,
            level: entry.level,
            level_name: entry.level_name.clone(),
            entry_number: entry.entry_number.clone(),
            title: entry.title.clone(),
            start_page: *start_page,
            end_page,
            ..Default::default()
        });
    }
    chapters
}

#[cfg(test)]
#[path = "structure_tests.rs"]
mod tests;
