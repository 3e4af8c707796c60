// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work units — the atomic tasks handed to the external dispatcher

use crate::id::BookId;
use serde_json::Value;
use std::collections::HashMap;

/// An LLM request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmCall {
    pub system: String,
    pub user: String,
    /// JSON schema the response must conform to, when structured output
    /// is required.
    pub response_schema: Option<Value>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub provider: String,
    /// Metric tags (stage, page, ...) attached to the completion.
    pub tags: HashMap<String, String>,
}

/// An OCR request for one page image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrCall {
    pub image: Vec<u8>,
    pub page: u32,
    pub provider: String,
}

/// An opaque agent-scoped tool invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCall {
    pub agent_id: String,
    pub payload: Value,
}

/// The kind of task a work unit carries.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkUnitKind {
    Llm(LlmCall),
    Ocr(OcrCall),
    Tool(ToolCall),
}

/// One unit of work for the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit {
    /// Opaque unique id; the tracker keys completion context off it.
    pub id: String,
    pub book_id: BookId,
    pub kind: WorkUnitKind,
}

impl WorkUnit {
    pub fn new(id: impl Into<String>, book_id: BookId, kind: WorkUnitKind) -> Self {
        Self {
            id: id.into(),
            book_id,
            kind,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            WorkUnitKind::Llm(_) => "llm",
            WorkUnitKind::Ocr(_) => "ocr",
            WorkUnitKind::Tool(_) => "tool",
        }
    }
}

/// Completion record delivered by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnitResult {
    pub unit_id: String,
    pub book_id: BookId,
    /// Parsed payload on success, provider error text on failure.
    pub outcome: Result<Value, String>,
    pub cost_usd: f64,
    pub provider: String,
}

impl WorkUnitResult {
    pub fn ok(unit_id: impl Into<String>, book_id: BookId, payload: Value) -> Self {
        Self {
            unit_id: unit_id.into(),
            book_id,
            outcome: Ok(payload),
            cost_usd: 0.0,
            provider: String::new(),
        }
    }

    pub fn err(unit_id: impl Into<String>, book_id: BookId, message: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            book_id,
            outcome: Err(message.into()),
            cost_usd: 0.0,
            provider: String::new(),
        }
    }
}
