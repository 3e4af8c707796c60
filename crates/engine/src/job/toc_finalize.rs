// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ToC-finalize stage: verify the linked entries, then find and fix gaps.
//!
//! Two phases (`entries`, `gaps`), each driven by one persistent agent.
//! Counters are written to the book record as they move so progress is
//! visible and survives restarts.

use super::{PipelineJob, StageStep, UnitInfo};
use crate::error::EngineError;
use crate::extract;
use bindery_adapters::ImageSource;
use bindery_core::{read_book, with_book, IdGen, OpType, TocGap, WorkUnit};
use bindery_storage::{StateStore, WriteOp};
use serde_json::{json, Map, Value};

const AGENT_TYPE: &str = "toc_finalize";

const PHASE_ENTRIES: &str = "entries";
const PHASE_GAPS: &str = "gaps";
const PHASE_COMPLETE: &str = "complete";

impl<S, I, G> PipelineJob<S, I, G>
where
    S: StateStore,
    I: ImageSource,
    G: IdGen,
{
    pub(super) async fn toc_finalize_units(&self) -> Result<Vec<WorkUnit>, EngineError> {
        let (has_work, phase) = read_book(self.book(), |b| {
            (
                b.toc_found && !b.toc_entries.is_empty(),
                b.finalize_phase.clone(),
            )
        });
        if !has_work || phase == PHASE_COMPLETE {
            return Ok(Vec::new());
        }

        let resumed = self.resume_agent_units(OpType::TocFinalize, AGENT_TYPE);
        if !resumed.is_empty() {
            return Ok(resumed);
        }

        let phase = if phase.is_empty() {
            self.set_finalize_phase(PHASE_ENTRIES).await?;
            PHASE_ENTRIES.to_string()
        } else {
            phase
        };
        Ok(vec![self.spawn_finalize_agent(&phase).await?])
    }

    async fn spawn_finalize_agent(&self, phase: &str) -> Result<WorkUnit, EngineError> {
        let (prompt, entries) = read_book(self.book(), |b| {
            let entries: Vec<Value> = b
                .toc_entries
                .iter()
                .map(|e| {
                    json!({
                        "doc_id": e.doc_id,
                        "title": e.title,
                        "printed_page_number": e.printed_page_number,
                        "sort_order": e.sort_order,
                        "linked": e.is_linked(),
                    })
                })
                .collect();
            (
                b.prompts.get("toc_finalize").cloned().unwrap_or_default(),
                entries,
            )
        });
        let payload = json!({
            "action": "finalize",
            "phase": phase,
            "prompt": prompt,
            "entries": entries,
        });
        self.spawn_agent(OpType::TocFinalize, AGENT_TYPE, phase, payload)
            .await
    }

    pub(super) async fn handle_toc_finalize(
        &self,
        info: &UnitInfo,
        payload: &Value,
    ) -> Result<StageStep, EngineError> {
        let UnitInfo::AgentStep {
            agent_id,
            entry_doc_id: phase,
            iteration,
            retry_count,
            ..
        } = info
        else {
            return Ok(StageStep::Wait);
        };
        self.record_agent_iteration(agent_id, payload).await?;
        self.apply_finalize_counters(payload);

        if payload.get("done").and_then(Value::as_bool) != Some(true) {
            let next = json!({
                "action": "continue",
                "tool_calls": payload.get("tool_calls").cloned().unwrap_or(Value::Null),
            });
            let unit = self.agent_unit(
                OpType::TocFinalize,
                agent_id,
                phase,
                iteration + 1,
                *retry_count,
                next,
            );
            return Ok(StageStep::Units(vec![unit]));
        }

        let result = payload.get("result").cloned().unwrap_or(Value::Null);
        self.finish_agent(agent_id, &result, true, None).await?;

        if phase == PHASE_ENTRIES {
            self.set_finalize_phase(PHASE_GAPS).await?;
            let unit = self.spawn_finalize_agent(PHASE_GAPS).await?;
            return Ok(StageStep::Units(vec![unit]));
        }
        self.set_finalize_phase(PHASE_COMPLETE).await?;
        Ok(StageStep::Done)
    }

    /// Fold any reported counters and gaps into memory and the book
    /// record.
    fn apply_finalize_counters(&self, payload: &Value) {
        let gaps: Vec<TocGap> = payload
            .get("gaps")
            .and_then(Value::as_array)
            .map(|raw| {
                raw.iter()
                    .map(|gap| TocGap {
                        after_sort_order: extract::get_u32(gap, "after_sort_order").unwrap_or(0),
                        description: extract::get_str(gap, "description").unwrap_or_default(),
                        resolved: extract::get_bool(gap, "resolved").unwrap_or(false),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut doc = Map::new();
        let book_doc_id = with_book(self.book(), |b| {
            for (field, slot) in [
                ("finalize_entries_complete", &mut b.finalize.entries_complete),
                ("finalize_entries_found", &mut b.finalize.entries_found),
                ("finalize_gaps_complete", &mut b.finalize.gaps_complete),
                ("finalize_gaps_fixes", &mut b.finalize.gaps_fixes),
            ] {
                if let Some(value) = extract::get_u32(payload, field) {
                    *slot = value;
                    doc.insert(field.to_string(), json!(value));
                }
            }
            if !gaps.is_empty() {
                b.finalize.gaps = gaps;
            }
            b.book_doc_id.clone()
        });
        if !doc.is_empty() && !book_doc_id.is_empty() {
            self.store.send(WriteOp::update("Book", book_doc_id, doc));
        }
    }

    /// Persist the finalize phase on the ToC record (synchronously: the
    /// phase is what restart recovery keys off).
    async fn set_finalize_phase(&self, phase: &str) -> Result<(), EngineError> {
        let toc_doc_id = with_book(self.book(), |b| {
            b.finalize_phase = phase.to_string();
            b.toc_doc_id.clone()
        });
        if toc_doc_id.is_empty() {
            return Ok(());
        }
        let mut doc = Map::new();
        doc.insert("finalize_phase".to_string(), json!(phase));
        let ack = self
            .store
            .update_with_version("Toc", &toc_doc_id, doc)
            .await?;
        with_book(self.book(), |b| b.track_write("Toc", &ack.doc_id, &ack.cid));
        Ok(())
    }
}
