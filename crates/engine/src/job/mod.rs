// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-book job substrate.
//!
//! A job owns one book's progress through the pipeline: it emits work
//! units for the external dispatcher, routes completions back to stage
//! handlers, and starts the next stage inline when one finishes. Handlers
//! are serialized by the job's gate; the book lock is never held across
//! store I/O.

mod agents;
mod blend;
mod labels;
mod metadata;
mod ocr;
mod pattern;
mod pipeline;
mod structure;
mod toc_extract;
mod toc_finalize;
mod toc_finder;
mod toc_link;

pub use pipeline::PipelineJob;

use crate::error::EngineError;
use crate::status::JobStatus;
use async_trait::async_trait;
use bindery_core::{AgentId, OpType, SharedBook, WorkUnit, WorkUnitResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Common per-job state embedded by every job type.
pub struct BaseJob {
    record_id: Mutex<String>,
    done: AtomicBool,
    book: SharedBook,
}

impl BaseJob {
    pub fn new(book: SharedBook) -> Self {
        Self {
            record_id: Mutex::new(String::new()),
            done: AtomicBool::new(false),
            book,
        }
    }

    pub fn book(&self) -> &SharedBook {
        &self.book
    }

    pub fn record_id(&self) -> String {
        self.record_id.lock().clone()
    }

    pub fn set_record_id(&self, id: String) {
        *self.record_id.lock() = id;
    }

    pub fn done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    pub(crate) fn set_done(&self) {
        self.done.store(true, Ordering::SeqCst);
    }
}

/// Contract between the coordinator and the dispatcher loop.
#[async_trait]
pub trait Job: Send + Sync {
    /// Begin (or resume) work. The first startable stage is persisted as
    /// started before its initial units are returned.
    async fn start(&self) -> Result<Vec<WorkUnit>, EngineError>;

    /// Handle one completion; returns any follow-up units, including the
    /// initial units of the next stage when this completion finished one.
    async fn on_complete(&self, result: WorkUnitResult) -> Result<Vec<WorkUnit>, EngineError>;

    fn done(&self) -> bool;

    fn record_id(&self) -> String;

    fn set_record_id(&self, id: String);

    fn status(&self) -> JobStatus;
}

/// Completion context registered per work unit. The tracker entry is the
/// only routing state a completion needs.
#[derive(Debug, Clone)]
pub(crate) enum UnitInfo {
    Metadata {
        retry_count: u32,
    },
    Ocr {
        page: u32,
        provider: String,
        retry_count: u32,
    },
    Blend {
        page: u32,
        retry_count: u32,
    },
    PatternAnalysis {
        retry_count: u32,
    },
    Labels {
        page: u32,
        retry_count: u32,
    },
    TocFinder {
        retry_count: u32,
    },
    TocExtract {
        retry_count: u32,
    },
    AgentStep {
        op: OpType,
        agent_id: AgentId,
        entry_doc_id: String,
        iteration: u32,
        retry_count: u32,
    },
}

impl UnitInfo {
    pub(crate) fn op(&self) -> OpType {
        match self {
            UnitInfo::Metadata { .. } => OpType::Metadata,
            UnitInfo::Ocr { .. } => OpType::Ocr,
            UnitInfo::Blend { .. } => OpType::Blend,
            UnitInfo::PatternAnalysis { .. } => OpType::PatternAnalysis,
            UnitInfo::Labels { .. } => OpType::Labels,
            UnitInfo::TocFinder { .. } => OpType::TocFinder,
            UnitInfo::TocExtract { .. } => OpType::TocExtract,
            UnitInfo::AgentStep { op, .. } => *op,
        }
    }

    pub(crate) fn retry_count(&self) -> u32 {
        match self {
            UnitInfo::Metadata { retry_count }
            | UnitInfo::Ocr { retry_count, .. }
            | UnitInfo::Blend { retry_count, .. }
            | UnitInfo::PatternAnalysis { retry_count }
            | UnitInfo::Labels { retry_count, .. }
            | UnitInfo::TocFinder { retry_count }
            | UnitInfo::TocExtract { retry_count }
            | UnitInfo::AgentStep { retry_count, .. } => *retry_count,
        }
    }

    /// Same context with the retry count bumped, for retry units.
    pub(crate) fn bump_retry(&self) -> UnitInfo {
        let mut info = self.clone();
        match &mut info {
            UnitInfo::Metadata { retry_count }
            | UnitInfo::Ocr { retry_count, .. }
            | UnitInfo::Blend { retry_count, .. }
            | UnitInfo::PatternAnalysis { retry_count }
            | UnitInfo::Labels { retry_count, .. }
            | UnitInfo::TocFinder { retry_count }
            | UnitInfo::TocExtract { retry_count }
            | UnitInfo::AgentStep { retry_count, .. } => *retry_count += 1,
        }
        info
    }
}

/// Best available text for a page: blended markdown when present,
/// otherwise the longest raw OCR result.
pub(crate) fn best_page_text(page: &bindery_core::PageState) -> &str {
    if !page.ocr_markdown.is_empty() {
        return &page.ocr_markdown;
    }
    page.ocr_results
        .values()
        .max_by_key(|text| text.len())
        .map(String::as_str)
        .unwrap_or("")
}

/// What a stage handler decided after one completion.
pub(crate) enum StageStep {
    /// Emit these follow-up units (already registered with the tracker).
    Units(Vec<WorkUnit>),
    /// Nothing new; the stage continues on other in-flight units.
    Wait,
    /// The stage finished.
    Done,
    /// The stage failed permanently; downstream stages must not start.
    Failed,
}
