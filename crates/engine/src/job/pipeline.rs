// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-book pipeline job.
//!
//! Stage sequencing: the first startable operation in registry order is
//! started (persisted before its units go out), completions are routed by
//! the tracker entry, and when a stage reports done its completion is
//! persisted before the next stage starts inline. A permanently failed
//! stage blocks everything downstream.

use super::{BaseJob, Job, StageStep, UnitInfo};
use crate::config::PipelineConfig;
use crate::error::EngineError;
use crate::persist::{persist_op_state, persist_op_state_sync, persist_op_complete, set_book_status};
use crate::status::JobStatus;
use async_trait::async_trait;
use bindery_adapters::ImageSource;
use bindery_core::{
    read_book, with_book, IdGen, LlmCall, OpConfig, OpType, SharedBook, WorkUnit, WorkUnitKind,
    WorkUnitResult, WorkUnitTracker,
};
use bindery_storage::{StateStore, WriteOp};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};

enum Decision {
    Start(OpType),
    InFlight(OpType),
    Blocked(OpType),
    AllDone,
}

pub struct PipelineJob<S, I, G> {
    pub(super) base: BaseJob,
    pub(super) store: Arc<S>,
    pub(super) images: I,
    pub(super) ids: G,
    pub(super) cfg: PipelineConfig,
    pub(super) tracker: WorkUnitTracker<UnitInfo>,
    /// Serializes start/on_complete; never held across the book lock.
    gate: tokio::sync::Mutex<()>,
    /// agent_id → AgentRun doc id, for completion updates.
    pub(super) run_docs: Mutex<HashMap<String, String>>,
}

impl<S, I, G> PipelineJob<S, I, G>
where
    S: StateStore,
    I: ImageSource,
    G: IdGen,
{
    pub fn new(store: Arc<S>, images: I, ids: G, cfg: PipelineConfig, book: SharedBook) -> Self {
        Self {
            base: BaseJob::new(book),
            store,
            images,
            ids,
            cfg,
            tracker: WorkUnitTracker::new(),
            gate: tokio::sync::Mutex::new(()),
            run_docs: Mutex::new(HashMap::new()),
        }
    }

    pub fn book(&self) -> &SharedBook {
        self.base.book()
    }

    pub(super) fn in_flight(&self, op: OpType) -> usize {
        self.tracker
            .values()
            .iter()
            .filter(|info| info.op() == op)
            .count()
    }

    /// Build a work unit and register its completion context.
    pub(super) fn register_unit(&self, kind: WorkUnitKind, info: UnitInfo) -> WorkUnit {
        let id = self.ids.next();
        let book_id = read_book(self.book(), |b| b.id.clone());
        self.tracker.register(id.clone(), info);
        WorkUnit::new(id, book_id, kind)
    }

    pub(super) fn prompt(&self, name: &str) -> String {
        match read_book(self.book(), |b| b.prompts.get(name).cloned()) {
            Some(text) => text,
            None => {
                error!(prompt = %name, "BUG: prompt missing from resolved set");
                String::new()
            }
        }
    }

    pub(super) fn llm_call(&self, op: OpType, prompt_name: &str, user: String) -> LlmCall {
        let book_id = read_book(self.book(), |b| b.id.to_string());
        let mut tags = HashMap::new();
        tags.insert("stage".to_string(), op.name().to_string());
        tags.insert("book_id".to_string(), book_id);
        LlmCall {
            system: self.prompt(prompt_name),
            user,
            response_schema: Some(json!({"type": "object"})),
            temperature: 0.0,
            max_tokens: 4096,
            provider: self.cfg.llm_provider.clone(),
            tags,
        }
    }

    async fn advance(&self, resume: bool) -> Result<Vec<WorkUnit>, EngineError> {
        let mut units = Vec::new();
        loop {
            let decision = read_book(self.book(), |b| {
                for op in OpType::ALL {
                    if self.cfg.is_skipped(op) {
                        continue;
                    }
                    let state = b.op_state(op);
                    if state.is_complete() {
                        continue;
                    }
                    if state.is_started() {
                        return Decision::InFlight(op);
                    }
                    if state.is_done() {
                        return Decision::Blocked(op);
                    }
                    return Decision::Start(op);
                }
                Decision::AllDone
            });

            match decision {
                Decision::InFlight(op) => {
                    if resume && self.in_flight(op) == 0 {
                        // Crash recovery: the stage was started before the
                        // restart; re-emit the remaining work from
                        // persisted state.
                        let resumed = self.stage_units(op).await?;
                        if resumed.is_empty() {
                            self.complete_stage(op).await?;
                            continue;
                        }
                        units.extend(resumed);
                    }
                    return Ok(units);
                }
                Decision::Blocked(op) => {
                    warn!(op = %op, "downstream stages blocked by permanent failure");
                    if self.tracker.count() == 0 {
                        self.base.set_done();
                    }
                    return Ok(units);
                }
                Decision::AllDone => {
                    set_book_status(self.store.as_ref(), self.book(), "complete");
                    self.base.set_done();
                    return Ok(units);
                }
                Decision::Start(op) => {
                    with_book(self.book(), |b| b.op_start(op))?;
                    self.persist_stage_state(op).await?;
                    set_book_status(
                        self.store.as_ref(),
                        self.book(),
                        &format!("processing:{}", op.name()),
                    );
                    let new_units = self.stage_units(op).await?;
                    if new_units.is_empty() {
                        self.complete_stage(op).await?;
                        continue;
                    }
                    units.extend(new_units);
                    return Ok(units);
                }
            }
        }
    }

    /// Persist the current state of `op` — synchronously for the stages
    /// whose restart would re-spend provider money.
    pub(super) async fn persist_stage_state(&self, op: OpType) -> Result<(), EngineError> {
        if OpConfig::of(op).sync_start {
            persist_op_state_sync(self.store.as_ref(), self.book(), op).await
        } else {
            persist_op_state(self.store.as_ref(), self.book(), op);
            Ok(())
        }
    }

    async fn complete_stage(&self, op: OpType) -> Result<(), EngineError> {
        with_book(self.book(), |b| b.op_complete(op));
        persist_op_complete(self.store.as_ref(), self.book(), op).await
    }

    async fn stage_units(&self, op: OpType) -> Result<Vec<WorkUnit>, EngineError> {
        match op {
            OpType::Metadata => Ok(self.metadata_units()),
            OpType::Ocr => self.ocr_units().await,
            OpType::Blend => Ok(self.blend_units()),
            OpType::PatternAnalysis => Ok(self.pattern_units()),
            OpType::Labels => Ok(self.labels_units()),
            OpType::TocFinder => Ok(self.toc_finder_units()),
            OpType::TocExtract => Ok(self.toc_extract_units()),
            OpType::TocLink => self.toc_link_units().await,
            OpType::TocFinalize => self.toc_finalize_units().await,
            OpType::Structure => self.structure_units().await,
        }
    }

    /// Whether `op` still has unfinished work, judged from book state
    /// alone. Single-unit stages complete through their handlers instead.
    fn stage_work_left(&self, op: OpType) -> bool {
        read_book(self.book(), |b| match op {
            OpType::Metadata
            | OpType::PatternAnalysis
            | OpType::TocFinder
            | OpType::TocExtract => false,
            OpType::Ocr => b.pages().any(|(_, p)| !p.ocr_complete),
            OpType::Blend => b.pages().any(|(_, p)| !p.blend_done),
            OpType::Labels => b.pages().any(|(_, p)| !p.label_done),
            OpType::TocLink => b.toc_found && !b.unlinked_entries().is_empty(),
            OpType::TocFinalize => {
                b.toc_found && !b.toc_entries.is_empty() && b.finalize_phase != "complete"
            }
            OpType::Structure => !b.chapters().is_empty() && b.structure_phase != "complete",
        })
    }

    async fn handle_success(
        &self,
        info: &UnitInfo,
        payload: &Value,
    ) -> Result<StageStep, EngineError> {
        match info {
            UnitInfo::Metadata { .. } => self.handle_metadata(payload).await,
            UnitInfo::Ocr { page, provider, .. } => {
                self.handle_ocr(*page, provider, payload).await
            }
            UnitInfo::Blend { page, .. } => self.handle_blend(*page, payload).await,
            UnitInfo::PatternAnalysis { .. } => self.handle_pattern(payload).await,
            UnitInfo::Labels { page, .. } => self.handle_labels(*page, payload).await,
            UnitInfo::TocFinder { .. } => self.handle_toc_finder(payload).await,
            UnitInfo::TocExtract { .. } => self.handle_toc_extract(info, payload).await,
            UnitInfo::AgentStep { op, .. } => match op {
                OpType::TocLink => self.handle_toc_link(info, payload).await,
                OpType::TocFinalize => self.handle_toc_finalize(info, payload).await,
                OpType::Structure => self.handle_structure(info, payload).await,
                other => {
                    error!(op = %other, "BUG: agent step for non-agent stage");
                    Ok(StageStep::Wait)
                }
            },
        }
    }

    pub(super) async fn handle_failure(
        &self,
        info: &UnitInfo,
        message: &str,
    ) -> Result<StageStep, EngineError> {
        let op = info.op();

        // Polish failures are recorded per chapter, not retried at the
        // stage level.
        if let UnitInfo::AgentStep {
            op: OpType::Structure,
            iteration,
            ..
        } = info
        {
            if *iteration >= 1 {
                return self.handle_polish_failure(info, message).await;
            }
        }

        let book_id = read_book(self.book(), |b| b.id.clone());
        warn!(
            book_id = %book_id,
            op = %op,
            retry = info.retry_count(),
            %message,
            "work unit failed"
        );

        let max_retries = self.cfg.max_retries_for(op);
        let permanent = with_book(self.book(), |b| b.op_fail(op, max_retries));
        persist_op_state_sync(self.store.as_ref(), self.book(), op).await?;

        if permanent {
            set_book_status(
                self.store.as_ref(),
                self.book(),
                &format!("failed:{}", op.name()),
            );
            return Ok(StageStep::Failed);
        }

        // Retries remain: restart the op and emit a retry unit with a
        // fresh id and a bumped retry count.
        with_book(self.book(), |b| b.op_start(op))?;
        self.persist_stage_state(op).await?;
        match self.rebuild_unit(info).await? {
            Some(unit) => Ok(StageStep::Units(vec![unit])),
            None => Ok(StageStep::Wait),
        }
    }

    /// Rebuild the work unit described by `info` under a fresh id.
    async fn rebuild_unit(&self, info: &UnitInfo) -> Result<Option<WorkUnit>, EngineError> {
        let bumped = info.bump_retry();
        match &bumped {
            UnitInfo::Metadata { .. } => Ok(Some(self.metadata_unit(bumped.clone()))),
            UnitInfo::Ocr { page, provider, .. } => {
                self.ocr_unit(*page, provider.clone(), bumped.clone()).await
            }
            UnitInfo::Blend { page, .. } => Ok(self.blend_unit(*page, bumped.clone())),
            UnitInfo::PatternAnalysis { .. } => Ok(Some(self.pattern_unit(bumped.clone()))),
            UnitInfo::Labels { page, .. } => Ok(self.labels_unit(*page, bumped.clone())),
            UnitInfo::TocFinder { .. } => Ok(Some(self.toc_finder_unit(bumped.clone()))),
            UnitInfo::TocExtract { .. } => Ok(Some(self.toc_extract_unit(bumped.clone()))),
            UnitInfo::AgentStep { agent_id, .. } => Ok(self.resume_agent_unit(agent_id, bumped.clone())),
        }
    }

    async fn apply_step(&self, op: OpType, step: StageStep) -> Result<Vec<WorkUnit>, EngineError> {
        match step {
            StageStep::Units(units) => Ok(units),
            StageStep::Done => {
                self.complete_stage(op).await?;
                self.advance(false).await
            }
            StageStep::Failed => {
                if self.tracker.count() == 0 {
                    self.base.set_done();
                }
                Ok(Vec::new())
            }
            StageStep::Wait => {
                if self.in_flight(op) > 0 {
                    return Ok(Vec::new());
                }
                if !read_book(self.book(), |b| b.op_is_started(op)) {
                    // The op failed permanently while other units drained.
                    if self.tracker.count() == 0 {
                        self.base.set_done();
                    }
                    return Ok(Vec::new());
                }
                if self.stage_work_left(op) {
                    let units = self.stage_units(op).await?;
                    if !units.is_empty() {
                        return Ok(units);
                    }
                    error!(op = %op, "BUG: stage reports work left but produced no units");
                    return Ok(Vec::new());
                }
                self.complete_stage(op).await?;
                self.advance(false).await
            }
        }
    }

    fn record_metric(&self, op: OpType, result: &WorkUnitResult) {
        if result.cost_usd <= 0.0 {
            return;
        }
        let book_id = with_book(self.book(), |b| {
            b.add_cost(op.name(), result.cost_usd);
            b.id.to_string()
        });
        let mut doc = Map::new();
        doc.insert("book_id".to_string(), json!(book_id));
        doc.insert("stage".to_string(), json!(op.name()));
        doc.insert("cost_usd".to_string(), json!(result.cost_usd));
        self.store.send(WriteOp::create("Metric", doc));
    }
}

#[async_trait]
impl<S, I, G> Job for PipelineJob<S, I, G>
where
    S: StateStore,
    I: ImageSource,
    G: IdGen,
{
    async fn start(&self) -> Result<Vec<WorkUnit>, EngineError> {
        let _gate = self.gate.lock().await;
        self.advance(true).await
    }

    async fn on_complete(&self, result: WorkUnitResult) -> Result<Vec<WorkUnit>, EngineError> {
        let _gate = self.gate.lock().await;
        let Some(info) = self.tracker.get_and_remove(&result.unit_id) else {
            error!(unit_id = %result.unit_id, "BUG: completion for unknown work unit");
            return Ok(Vec::new());
        };
        let op = info.op();
        self.record_metric(op, &result);
        let step = match &result.outcome {
            Ok(payload) => self.handle_success(&info, payload).await?,
            Err(message) => self.handle_failure(&info, message).await?,
        };
        self.apply_step(op, step).await
    }

    fn done(&self) -> bool {
        self.base.done()
    }

    fn record_id(&self) -> String {
        self.base.record_id()
    }

    fn set_record_id(&self, id: String) {
        self.base.set_record_id(id);
    }

    fn status(&self) -> JobStatus {
        JobStatus::snapshot(self.book(), self.tracker.count())
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
