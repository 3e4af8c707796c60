// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ToC-link stage: one agent per entry resolves the printed page number
//! to a physical page.

use super::{PipelineJob, StageStep, UnitInfo};
use crate::error::EngineError;
use bindery_adapters::ImageSource;
use bindery_core::{read_book, with_book, AgentId, IdGen, OpType, WorkUnit};
use bindery_storage::StateStore;
use serde_json::{json, Map, Value};

const AGENT_TYPE: &str = "toc_link";

impl<S, I, G> PipelineJob<S, I, G>
where
    S: StateStore,
    I: ImageSource,
    G: IdGen,
{
    pub(super) async fn toc_link_units(&self) -> Result<Vec<WorkUnit>, EngineError> {
        let (entries, page_labels, prompt) = read_book(self.book(), |b| {
            let labels: Vec<Value> = b
                .pages()
                .map(|(num, page)| json!({"page": num, "label": page.page_number_label}))
                .collect();
            (
                b.unlinked_entries(),
                labels,
                b.prompts.get("toc_link").cloned().unwrap_or_default(),
            )
        });
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut units = Vec::with_capacity(entries.len());
        for entry in entries {
            // Resume an existing agent for this entry if one survives from
            // before a restart; otherwise spawn fresh.
            let existing = read_book(self.book(), |b| {
                b.all_agent_states().into_iter().find(|s| {
                    s.agent_type == AGENT_TYPE && s.entry_doc_id == entry.doc_id && !s.complete
                })
            });
            let unit = match existing {
                Some(state) => self.agent_unit(
                    OpType::TocLink,
                    &AgentId::new(state.agent_id.clone()),
                    &entry.doc_id,
                    state.iteration,
                    0,
                    serde_json::from_str(&state.messages_json).unwrap_or_else(|_| json!({})),
                ),
                None => {
                    let payload = json!({
                        "action": "link_entry",
                        "prompt": prompt,
                        "entry": {
                            "doc_id": entry.doc_id,
                            "entry_number": entry.entry_number,
                            "title": entry.title,
                            "printed_page_number": entry.printed_page_number,
                        },
                        "page_labels": page_labels,
                    });
                    self.spawn_agent(OpType::TocLink, AGENT_TYPE, &entry.doc_id, payload)
                        .await?
                }
            };
            units.push(unit);
        }
        Ok(units)
    }

    pub(super) async fn handle_toc_link(
        &self,
        info: &UnitInfo,
        payload: &Value,
    ) -> Result<StageStep, EngineError> {
        let UnitInfo::AgentStep {
            agent_id,
            entry_doc_id,
            iteration,
            retry_count,
            ..
        } = info
        else {
            return Ok(StageStep::Wait);
        };
        self.record_agent_iteration(agent_id, payload).await?;

        if payload.get("done").and_then(Value::as_bool) != Some(true) {
            // Agent wants another tool-loop iteration.
            let next = json!({
                "action": "continue",
                "tool_calls": payload.get("tool_calls").cloned().unwrap_or(Value::Null),
            });
            let unit = self.agent_unit(
                OpType::TocLink,
                agent_id,
                entry_doc_id,
                iteration + 1,
                *retry_count,
                next,
            );
            return Ok(StageStep::Units(vec![unit]));
        }

        let page_num = payload
            .get("result")
            .and_then(|r| r.get("actual_page"))
            .and_then(Value::as_u64)
            .map(|v| v as u32);
        let page_doc_id =
            page_num.and_then(|num| read_book(self.book(), |b| b.page(num).map(|p| p.page_doc_id.clone())));
        let Some(page_doc_id) = page_doc_id.filter(|id| !id.is_empty()) else {
            return self
                .handle_failure(info, "link result names an unknown page")
                .await;
        };

        let mut doc = Map::new();
        doc.insert("actual_page".to_string(), json!({"_docID": page_doc_id}));
        let ack = self
            .store
            .update_with_version("TocEntry", entry_doc_id, doc)
            .await?;
        with_book(self.book(), |b| {
            b.track_write("TocEntry", &ack.doc_id, &ack.cid);
            b.link_entry(entry_doc_id, &page_doc_id);
        });

        let result = payload.get("result").cloned().unwrap_or(Value::Null);
        self.finish_agent(agent_id, &result, true, None).await?;
        Ok(StageStep::Wait)
    }
}
