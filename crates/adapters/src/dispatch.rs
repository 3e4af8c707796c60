// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work-unit dispatcher contract and a scripted fake

use async_trait::async_trait;
use bindery_core::{WorkUnit, WorkUnitKind, WorkUnitResult};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

/// Errors from dispatcher submission
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher unavailable: {0}")]
    Unavailable(String),
    #[error("rejected unit {0}")]
    Rejected(String),
}

/// The external work-unit scheduler.
///
/// The coordinator pushes units and receives [`WorkUnitResult`]s back
/// through whatever channel the embedding process wires up; the contract
/// here covers only the submission side.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn submit(&self, units: Vec<WorkUnit>) -> Result<(), DispatchError>;
}

type Handler = Box<dyn Fn(&WorkUnit) -> Result<Value, String> + Send + Sync>;

struct FakeDispatcherState {
    pending: Vec<WorkUnit>,
    submitted: Vec<WorkUnit>,
    llm: Handler,
    ocr: Handler,
    tool: Handler,
    unit_cost: f64,
    submit_error: Option<String>,
}

/// Fake dispatcher for deterministic testing.
///
/// Records every submitted unit and produces completions on demand from
/// programmable per-kind handlers.
#[derive(Clone)]
pub struct FakeDispatcher {
    inner: Arc<Mutex<FakeDispatcherState>>,
}

impl Default for FakeDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeDispatcherState {
                pending: Vec::new(),
                submitted: Vec::new(),
                llm: Box::new(|_| Ok(json!({}))),
                ocr: Box::new(|_| Ok(json!({"text": ""}))),
                tool: Box::new(|_| Ok(json!({"done": true}))),
                unit_cost: 0.0,
                submit_error: None,
            })),
        }
    }

    /// Script the response for LLM units.
    pub fn on_llm(&self, handler: impl Fn(&WorkUnit) -> Result<Value, String> + Send + Sync + 'static) {
        self.inner.lock().llm = Box::new(handler);
    }

    /// Script the response for OCR units.
    pub fn on_ocr(&self, handler: impl Fn(&WorkUnit) -> Result<Value, String> + Send + Sync + 'static) {
        self.inner.lock().ocr = Box::new(handler);
    }

    /// Script the response for tool units.
    pub fn on_tool(&self, handler: impl Fn(&WorkUnit) -> Result<Value, String> + Send + Sync + 'static) {
        self.inner.lock().tool = Box::new(handler);
    }

    /// Cost attached to every produced completion.
    pub fn set_unit_cost(&self, cost_usd: f64) {
        self.inner.lock().unit_cost = cost_usd;
    }

    /// Make the next submit call fail.
    pub fn set_submit_error(&self, message: impl Into<String>) {
        self.inner.lock().submit_error = Some(message.into());
    }

    /// All units ever submitted.
    pub fn submitted(&self) -> Vec<WorkUnit> {
        self.inner.lock().submitted.clone()
    }

    /// Number of units awaiting completion.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Run every pending unit through its handler and return the
    /// completions, oldest first.
    pub fn take_results(&self) -> Vec<WorkUnitResult> {
        let mut inner = self.inner.lock();
        let cost = inner.unit_cost;
        let units: Vec<WorkUnit> = inner.pending.drain(..).collect();
        units
            .iter()
            .map(|unit| {
                let (outcome, provider) = match &unit.kind {
                    WorkUnitKind::Llm(call) => ((inner.llm)(unit), call.provider.clone()),
                    WorkUnitKind::Ocr(call) => ((inner.ocr)(unit), call.provider.clone()),
                    WorkUnitKind::Tool(_) => ((inner.tool)(unit), String::new()),
                };
                WorkUnitResult {
                    unit_id: unit.id.clone(),
                    book_id: unit.book_id.clone(),
                    outcome,
                    cost_usd: cost,
                    provider,
                }
            })
            .collect()
    }
}

#[async_trait]
impl Dispatcher for FakeDispatcher {
    async fn submit(&self, units: Vec<WorkUnit>) -> Result<(), DispatchError> {
        let mut inner = self.inner.lock();
        if let Some(message) = inner.submit_error.take() {
            return Err(DispatchError::Unavailable(message));
        }
        inner.submitted.extend(units.iter().cloned());
        inner.pending.extend(units);
        Ok(())
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
