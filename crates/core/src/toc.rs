// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ToC entries and the finalize / structure progress tuples

use serde::{Deserialize, Serialize};

/// One extracted table-of-contents entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TocEntry {
    pub doc_id: String,
    pub entry_number: String,
    pub title: String,
    pub level: u32,
    pub level_name: String,
    /// Page number as printed in the book; may differ from the physical page.
    pub printed_page_number: String,
    pub sort_order: u32,
    /// Doc id of the physical page this entry resolves to, once linked.
    pub actual_page_doc_id: Option<String>,
}

impl TocEntry {
    pub fn is_linked(&self) -> bool {
        self.actual_page_doc_id.is_some()
    }
}

/// A run of entries the finalize stage found missing between two known ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TocGap {
    pub after_sort_order: u32,
    pub description: String,
    pub resolved: bool,
}

/// Finalize-stage progress, read and written as one tuple so partial
/// updates are impossible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinalizeProgress {
    pub entries_complete: u32,
    pub entries_found: u32,
    pub gaps_complete: u32,
    pub gaps_fixes: u32,
    pub gaps: Vec<TocGap>,
}

/// Structure-stage progress counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StructureProgress {
    pub chapters_total: u32,
    pub chapters_extracted: u32,
    pub chapters_polished: u32,
    pub polish_failed: u32,
}
