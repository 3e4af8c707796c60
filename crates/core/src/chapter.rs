// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structural chapters extracted during the structure stage

use crate::error::StateError;
use crate::id::BookId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable identity for a chapter, derived from the book and the ToC entry
/// it came from. Survives re-runs, so upserts converge instead of
/// duplicating rows.
pub fn chapter_key(book_id: &BookId, entry_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(book_id.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(entry_id.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for byte in digest.iter().take(16) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// One structural chapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterState {
    pub unique_key: String,
    pub entry_id: String,
    pub doc_id: String,
    pub cid: String,
    // Tree shape
    pub parent_id: Option<String>,
    pub sort_order: u32,
    pub level: u32,
    pub level_name: String,
    pub entry_number: String,
    pub title: String,
    // Page span
    pub start_page: u32,
    pub end_page: u32,
    // Content
    pub mechanical_text: String,
    pub polished_text: String,
    pub word_count: u32,
    pub kind: String,
    pub confidence: f32,
    // Flags
    pub extract_done: bool,
    pub polish_done: bool,
    pub polish_failed: bool,
}

impl ChapterState {
    /// Validate the page span: `1 <= start` and, when an end is known,
    /// `end >= start`.
    pub fn validate_span(&self) -> Result<(), StateError> {
        if self.start_page < 1 || (self.end_page > 0 && self.end_page < self.start_page) {
            return Err(StateError::InvalidChapterSpan {
                start: self.start_page,
                end: self.end_page,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "chapter_tests.rs"]
mod tests;
