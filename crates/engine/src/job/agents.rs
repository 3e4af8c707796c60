// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent plumbing shared by the link, finalize, and structure stages.
//!
//! Each agent is a persistent tool-using loop over many work units. The
//! agent's state record is written after every iteration, so a crash
//! resumes the loop at the last persisted step instead of re-spending the
//! work that led up to it.

use super::{PipelineJob, UnitInfo};
use crate::error::EngineError;
use bindery_adapters::ImageSource;
use bindery_core::{
    read_book, with_book, AgentId, AgentState, IdGen, OpType, ToolCall, WorkUnit, WorkUnitKind,
};
use bindery_storage::{Cond, StateStore, WriteOp};
use serde_json::{json, Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

pub(super) fn epoch_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl<S, I, G> PipelineJob<S, I, G>
where
    S: StateStore,
    I: ImageSource,
    G: IdGen,
{
    /// Create a fresh agent for one work item, persist its state, record
    /// its run, and return the first tool unit.
    pub(super) async fn spawn_agent(
        &self,
        op: OpType,
        agent_type: &str,
        entry_doc_id: &str,
        payload: Value,
    ) -> Result<WorkUnit, EngineError> {
        let agent_id = AgentId::new(self.ids.next());
        let state = AgentState {
            agent_id: agent_id.to_string(),
            agent_type: agent_type.to_string(),
            entry_doc_id: entry_doc_id.to_string(),
            iteration: 0,
            complete: false,
            messages_json: payload.to_string(),
            ..Default::default()
        };
        self.save_agent_state(state).await?;
        self.record_agent_run_start(&agent_id, agent_type).await;
        Ok(self.agent_unit(op, &agent_id, entry_doc_id, 0, 0, payload))
    }

    /// Build and register one tool unit for an agent iteration.
    pub(super) fn agent_unit(
        &self,
        op: OpType,
        agent_id: &AgentId,
        entry_doc_id: &str,
        iteration: u32,
        retry_count: u32,
        payload: Value,
    ) -> WorkUnit {
        let info = UnitInfo::AgentStep {
            op,
            agent_id: agent_id.clone(),
            entry_doc_id: entry_doc_id.to_string(),
            iteration,
            retry_count,
        };
        self.register_unit(
            WorkUnitKind::Tool(ToolCall {
                agent_id: agent_id.to_string(),
                payload,
            }),
            info,
        )
    }

    /// Re-emit the current iteration of an existing agent (crash resume
    /// and retry paths). Returns `None` for complete or unknown agents.
    pub(super) fn resume_agent_unit(&self, agent_id: &AgentId, info: UnitInfo) -> Option<WorkUnit> {
        let state = read_book(self.book(), |b| b.agent_state(agent_id.as_str()).cloned())?;
        if state.complete {
            return None;
        }
        let payload = agent_payload(&state);
        Some(self.register_unit(
            WorkUnitKind::Tool(ToolCall {
                agent_id: agent_id.to_string(),
                payload,
            }),
            info,
        ))
    }

    /// Units resuming every incomplete agent of `agent_type`.
    pub(super) fn resume_agent_units(&self, op: OpType, agent_type: &str) -> Vec<WorkUnit> {
        let states: Vec<AgentState> = read_book(self.book(), |b| {
            b.all_agent_states()
                .into_iter()
                .filter(|s| s.agent_type == agent_type && !s.complete)
                .collect()
        });
        states
            .iter()
            .map(|state| {
                self.agent_unit(
                    op,
                    &AgentId::new(state.agent_id.clone()),
                    &state.entry_doc_id,
                    state.iteration,
                    0,
                    agent_payload(state),
                )
            })
            .collect()
    }

    /// Persist an agent state record (one document per agent id) and
    /// refresh the in-memory copy with the returned doc id and CID.
    pub(super) async fn save_agent_state(&self, mut state: AgentState) -> Result<(), EngineError> {
        let book_id = read_book(self.book(), |b| b.id.to_string());
        let mut doc = Map::new();
        doc.insert("book_id".to_string(), json!(book_id));
        doc.insert("agent_id".to_string(), json!(state.agent_id));
        doc.insert("agent_type".to_string(), json!(state.agent_type));
        doc.insert("entry_doc_id".to_string(), json!(state.entry_doc_id));
        doc.insert("iteration".to_string(), json!(state.iteration));
        doc.insert("complete".to_string(), json!(state.complete));
        doc.insert("messages_json".to_string(), json!(state.messages_json));
        doc.insert(
            "pending_tool_calls".to_string(),
            json!(state.pending_tool_calls),
        );
        doc.insert("tool_results".to_string(), json!(state.tool_results));
        doc.insert("result_json".to_string(), json!(state.result_json));

        let filter = vec![Cond::Eq("agent_id".to_string(), json!(state.agent_id))];
        let ack = self
            .store
            .upsert_with_version("AgentState", filter, doc.clone(), doc)
            .await?;
        state.doc_id = ack.doc_id.clone();
        state.cid = ack.cid.clone();
        with_book(self.book(), |b| {
            b.track_write("AgentState", &ack.doc_id, &ack.cid);
            b.set_agent_state(state);
        });
        Ok(())
    }

    /// Record one iteration's result on the agent state.
    pub(super) async fn record_agent_iteration(
        &self,
        agent_id: &AgentId,
        payload: &Value,
    ) -> Result<AgentState, EngineError> {
        let Some(mut state) =
            read_book(self.book(), |b| b.agent_state(agent_id.as_str()).cloned())
        else {
            warn!(agent_id = %agent_id, "iteration for unknown agent");
            return Ok(AgentState {
                agent_id: agent_id.to_string(),
                ..Default::default()
            });
        };
        state.iteration += 1;
        state.tool_results = payload.to_string();
        state.pending_tool_calls = payload
            .get("tool_calls")
            .map(Value::to_string)
            .unwrap_or_default();
        self.save_agent_state(state.clone()).await?;
        Ok(state)
    }

    /// Mark an agent done, persist its result, and close out its run
    /// record.
    pub(super) async fn finish_agent(
        &self,
        agent_id: &AgentId,
        result: &Value,
        success: bool,
        error: Option<&str>,
    ) -> Result<(), EngineError> {
        let Some(mut state) =
            read_book(self.book(), |b| b.agent_state(agent_id.as_str()).cloned())
        else {
            warn!(agent_id = %agent_id, "finish for unknown agent");
            return Ok(());
        };
        state.complete = true;
        state.result_json = result.to_string();
        state.pending_tool_calls = String::new();
        let iterations = state.iteration;
        self.save_agent_state(state).await?;

        let run_doc_id = self.run_docs.lock().remove(agent_id.as_str());
        if let Some(run_doc_id) = run_doc_id {
            let mut doc = Map::new();
            doc.insert("completed_at_ms".to_string(), json!(epoch_ms_now()));
            doc.insert("iterations".to_string(), json!(iterations));
            doc.insert("success".to_string(), json!(success));
            if let Some(error) = error {
                doc.insert("error".to_string(), json!(error));
            }
            self.store.send(WriteOp::update("AgentRun", run_doc_id, doc));
        }
        Ok(())
    }

    async fn record_agent_run_start(&self, agent_id: &AgentId, agent_type: &str) {
        let book_id = read_book(self.book(), |b| b.id.to_string());
        let mut doc = Map::new();
        doc.insert("book_id".to_string(), json!(book_id));
        doc.insert("agent_type".to_string(), json!(agent_type));
        doc.insert("job_id".to_string(), json!(self.base.record_id()));
        doc.insert("started_at_ms".to_string(), json!(epoch_ms_now()));
        doc.insert("iterations".to_string(), json!(0));
        doc.insert("success".to_string(), json!(false));
        // Run history is best-effort; losing it never blocks the stage.
        match self.store.send_sync(WriteOp::create("AgentRun", doc)).await {
            Ok(ack) => {
                self.run_docs
                    .lock()
                    .insert(agent_id.to_string(), ack.doc_id);
            }
            Err(err) => warn!(agent_id = %agent_id, %err, "agent run record failed"),
        }
    }
}

/// The payload to re-send for an agent's current iteration: pending tool
/// calls when the loop is mid-flight, the original messages otherwise.
fn agent_payload(state: &AgentState) -> Value {
    if !state.pending_tool_calls.is_empty() {
        if let Ok(value) = serde_json::from_str::<Value>(&state.pending_tool_calls) {
            return json!({"action": "continue", "tool_calls": value});
        }
    }
    serde_json::from_str::<Value>(&state.messages_json).unwrap_or_else(|_| json!({}))
}
