// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent agent state and run history

use serde::{Deserialize, Serialize};

/// Durable record of one long-running tool-using agent.
///
/// Exactly one record exists per `agent_id`; every update bumps the CID.
/// The message and tool-call payloads are opaque JSON owned by the stage
/// that runs the agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub doc_id: String,
    pub cid: String,
    pub agent_id: String,
    pub agent_type: String,
    /// ToC entry (or other work item) this agent is working on.
    pub entry_doc_id: String,
    pub iteration: u32,
    pub complete: bool,
    pub messages_json: String,
    pub pending_tool_calls: String,
    pub tool_results: String,
    pub result_json: String,
}

/// One completed or in-flight agent run, for history queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRun {
    pub doc_id: String,
    pub agent_type: String,
    pub job_id: String,
    pub started_at_ms: u64,
    pub completed_at_ms: Option<u64>,
    pub iterations: u32,
    pub success: bool,
    pub error: Option<String>,
}
