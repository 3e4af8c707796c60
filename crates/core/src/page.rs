// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-page state

use std::collections::HashMap;

/// State of one physical page.
///
/// Lives inside [`BookState`](crate::book::BookState) and is protected by
/// the book's single lock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageState {
    pub page_doc_id: String,
    pub page_cid: String,
    /// OCR text per provider. An empty string is a valid "blank page" result.
    pub ocr_results: HashMap<String, String>,
    pub extract_done: bool,
    pub ocr_complete: bool,
    pub label_done: bool,
    pub blend_done: bool,
    /// Blended markdown produced from the raw OCR texts.
    pub ocr_markdown: String,
    pub headings: Vec<String>,
    pub header: String,
    pub footer: String,
    pub page_number_label: String,
    pub running_header: String,
}

impl PageState {
    /// Record an OCR result for `provider`, replacing any prior text.
    pub fn set_ocr_result(&mut self, provider: impl Into<String>, text: impl Into<String>) {
        self.ocr_results.insert(provider.into(), text.into());
    }

    pub fn has_provider(&self, provider: &str) -> bool {
        self.ocr_results.contains_key(provider)
    }

    /// True when every provider returned an empty string.
    pub fn is_blank(&self) -> bool {
        !self.ocr_results.is_empty() && self.ocr_results.values().all(|t| t.is_empty())
    }

    pub fn clear_ocr(&mut self) {
        self.ocr_results.clear();
        self.ocr_complete = false;
        self.extract_done = false;
    }

    pub fn clear_blend(&mut self) {
        self.ocr_markdown.clear();
        self.headings.clear();
        self.header.clear();
        self.footer.clear();
        self.blend_done = false;
    }

    pub fn clear_labels(&mut self) {
        self.page_number_label.clear();
        self.running_header.clear();
        self.label_done = false;
    }
}

#[cfg(test)]
#[path = "page_tests.rs"]
mod tests;
