// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table-driven description of every pipeline operation.
//!
//! The registry is the single source of truth for pipeline shape: which
//! collection an operation's state lives on, how its fields are prefixed,
//! what resets cascade where, and what extra cleanup a reset needs. The
//! generic operation methods on [`BookState`] and the engine's persist /
//! reset routines all read from this table instead of carrying per-stage
//! code.

use crate::book::BookState;
use crate::op::OpType;

/// Logical store collection an operation's state fields live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// Book-level fields on the `Book` record.
    Book,
    /// ToC-level fields on the linked `Toc` record.
    Toc,
    /// Page-level operations track per-page completion flags; there is no
    /// single document carrying their state.
    Page,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Book => "Book",
            Collection::Toc => "Toc",
            Collection::Page => "Page",
        }
    }
}

/// Store-side cleanup a reset must perform beyond zeroing state fields.
///
/// Kept as a closed enum so the registry stays a plain data table; the
/// engine's resetter interprets each action against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetAction {
    /// Delete every `TocEntry` row linked to the book's ToC.
    DeleteTocEntries,
    /// Null out `actual_page` on every `TocEntry` row.
    ClearEntryLinks,
    /// Delete every `Chapter` row for the book.
    DeleteChapters,
    /// Clear label fields and `label_complete` on every page record.
    ClearPageLabels,
    /// Clear blend artifacts and `blend_complete` on every page record.
    ClearPageBlends,
    /// Delete `OcrResult` rows and clear `ocr_complete` on every page.
    DeleteOcrResults,
    /// Zero the `finalize_*` counters on the book record.
    ClearBookFinalizeCounters,
}

/// Registry entry for one operation.
pub struct OpConfig {
    pub op: OpType,
    pub collection: Collection,
    /// Store fields are `<prefix>_started/_complete/_failed/_retries`.
    pub field_prefix: &'static str,
    /// Stages whose restart would re-spend provider money persist their
    /// start synchronously; the rest may fire-and-forget.
    pub sync_start: bool,
    /// Direct cascade targets; resets recurse through these.
    pub cascades_to: &'static [OpType],
    /// Agent-type labels whose agent states are cleared on reset.
    pub agent_types: &'static [&'static str],
    /// Extra fields zeroed on the op's own document during reset.
    pub reset_db_fields: &'static [&'static str],
    /// Store-side cleanup interpreted by the engine resetter.
    pub reset_actions: &'static [ResetAction],
    /// In-memory cleanup, run under the book's write lock.
    pub reset_memory: Option<fn(&mut BookState)>,
}

impl OpConfig {
    /// Document id the op's state fields are written to, or `None` when the
    /// document does not exist yet (persisting is then a no-op) or the op
    /// is page-level.
    pub fn doc_id(&self, book: &BookState) -> Option<String> {
        let id = match self.collection {
            Collection::Book => book.book_doc_id.as_str(),
            Collection::Toc => book.toc_doc_id.as_str(),
            Collection::Page => return None,
        };
        if id.is_empty() {
            None
        } else {
            Some(id.to_string())
        }
    }
}

fn reset_metadata_memory(book: &mut BookState) {
    book.meta = Default::default();
}

fn reset_ocr_memory(book: &mut BookState) {
    book.pages_mut().for_each(|p| p.clear_ocr());
}

fn reset_blend_memory(book: &mut BookState) {
    book.pages_mut().for_each(|p| p.clear_blend());
}

fn reset_labels_memory(book: &mut BookState) {
    book.pages_mut().for_each(|p| p.clear_labels());
}

fn reset_pattern_memory(book: &mut BookState) {
    book.pattern_json = None;
}

fn reset_toc_finder_memory(book: &mut BookState) {
    book.toc_found = false;
    book.toc_start_page = 0;
    book.toc_end_page = 0;
}

fn reset_toc_extract_memory(book: &mut BookState) {
    book.clear_toc_entries();
}

fn reset_toc_link_memory(book: &mut BookState) {
    book.clear_entry_links();
}

fn reset_toc_finalize_memory(book: &mut BookState) {
    book.finalize = Default::default();
    book.finalize_phase.clear();
}

fn reset_structure_memory(book: &mut BookState) {
    book.clear_chapters();
    book.structure = Default::default();
    book.structure_phase.clear();
}

static METADATA: OpConfig = OpConfig {
    op: OpType::Metadata,
    collection: Collection::Book,
    field_prefix: "metadata",
    sync_start: true,
    cascades_to: &[],
    agent_types: &[],
    reset_db_fields: &[],
    reset_actions: &[],
    reset_memory: Some(reset_metadata_memory),
};

static OCR: OpConfig = OpConfig {
    op: OpType::Ocr,
    collection: Collection::Page,
    field_prefix: "ocr",
    sync_start: false,
    cascades_to: &[OpType::Blend],
    agent_types: &[],
    reset_db_fields: &[],
    reset_actions: &[ResetAction::DeleteOcrResults],
    reset_memory: Some(reset_ocr_memory),
};

static BLEND: OpConfig = OpConfig {
    op: OpType::Blend,
    collection: Collection::Page,
    field_prefix: "blend",
    sync_start: false,
    // Resets both directly and through pattern_analysis; the resetter's
    // visited set keeps the double reach idempotent.
    cascades_to: &[OpType::PatternAnalysis, OpType::Labels],
    agent_types: &[],
    reset_db_fields: &[],
    reset_actions: &[ResetAction::ClearPageBlends],
    reset_memory: Some(reset_blend_memory),
};

static PATTERN_ANALYSIS: OpConfig = OpConfig {
    op: OpType::PatternAnalysis,
    collection: Collection::Book,
    field_prefix: "pattern_analysis",
    sync_start: false,
    cascades_to: &[OpType::Labels, OpType::TocLink],
    agent_types: &[],
    reset_db_fields: &["page_pattern_analysis_json"],
    reset_actions: &[],
    reset_memory: Some(reset_pattern_memory),
};

static LABELS: OpConfig = OpConfig {
    op: OpType::Labels,
    collection: Collection::Page,
    field_prefix: "label",
    sync_start: false,
    cascades_to: &[OpType::TocLink],
    agent_types: &[],
    reset_db_fields: &[],
    reset_actions: &[ResetAction::ClearPageLabels],
    reset_memory: Some(reset_labels_memory),
};

static TOC_FINDER: OpConfig = OpConfig {
    op: OpType::TocFinder,
    collection: Collection::Toc,
    field_prefix: "finder",
    sync_start: false,
    cascades_to: &[OpType::TocExtract],
    agent_types: &[],
    reset_db_fields: &["toc_found", "start_page", "end_page"],
    reset_actions: &[],
    reset_memory: Some(reset_toc_finder_memory),
};

static TOC_EXTRACT: OpConfig = OpConfig {
    op: OpType::TocExtract,
    collection: Collection::Toc,
    field_prefix: "extract",
    sync_start: false,
    cascades_to: &[OpType::TocLink],
    agent_types: &[],
    reset_db_fields: &[],
    reset_actions: &[ResetAction::DeleteTocEntries],
    reset_memory: Some(reset_toc_extract_memory),
};

static TOC_LINK: OpConfig = OpConfig {
    op: OpType::TocLink,
    collection: Collection::Toc,
    field_prefix: "link",
    sync_start: true,
    cascades_to: &[OpType::TocFinalize],
    agent_types: &["toc_link"],
    reset_db_fields: &[],
    reset_actions: &[ResetAction::ClearEntryLinks],
    reset_memory: Some(reset_toc_link_memory),
};

static TOC_FINALIZE: OpConfig = OpConfig {
    op: OpType::TocFinalize,
    collection: Collection::Toc,
    field_prefix: "finalize",
    sync_start: true,
    cascades_to: &[OpType::Structure],
    agent_types: &["toc_finalize"],
    reset_db_fields: &["finalize_phase"],
    reset_actions: &[ResetAction::ClearBookFinalizeCounters],
    reset_memory: Some(reset_toc_finalize_memory),
};

static STRUCTURE: OpConfig = OpConfig {
    op: OpType::Structure,
    collection: Collection::Book,
    field_prefix: "structure",
    sync_start: true,
    cascades_to: &[],
    agent_types: &["structure"],
    reset_db_fields: &[
        "structure_phase",
        "structure_chapters_total",
        "structure_chapters_extracted",
        "structure_chapters_polished",
        "structure_polish_failed",
    ],
    reset_actions: &[ResetAction::DeleteChapters],
    reset_memory: Some(reset_structure_memory),
};

impl OpConfig {
    /// Registry entry for `op`. Total over the closed [`OpType`] enum.
    pub fn of(op: OpType) -> &'static OpConfig {
        match op {
            OpType::Metadata => &METADATA,
            OpType::Ocr => &OCR,
            OpType::Blend => &BLEND,
            OpType::PatternAnalysis => &PATTERN_ANALYSIS,
            OpType::Labels => &LABELS,
            OpType::TocFinder => &TOC_FINDER,
            OpType::TocExtract => &TOC_EXTRACT,
            OpType::TocLink => &TOC_LINK,
            OpType::TocFinalize => &TOC_FINALIZE,
            OpType::Structure => &STRUCTURE,
        }
    }

    /// All registry entries in pipeline order.
    pub fn all() -> impl Iterator<Item = &'static OpConfig> {
        OpType::ALL.iter().map(|op| OpConfig::of(*op))
    }

    /// The transitive cascade set of `op`, excluding `op` itself, in
    /// pipeline order.
    pub fn transitive_cascade(op: OpType) -> Vec<OpType> {
        let mut seen = Vec::new();
        let mut stack: Vec<OpType> = OpConfig::of(op).cascades_to.to_vec();
        while let Some(next) = stack.pop() {
            if seen.contains(&next) {
                continue;
            }
            seen.push(next);
            stack.extend_from_slice(OpConfig::of(next).cascades_to);
        }
        let mut ordered: Vec<OpType> = OpType::ALL
            .iter()
            .copied()
            .filter(|o| seen.contains(o))
            .collect();
        ordered.dedup();
        ordered
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
