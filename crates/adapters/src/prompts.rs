// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt resolution.
//!
//! Stages look prompts up by name from the book state; the resolver runs
//! once at load time. The embedded set ships with the binary; per-book
//! overrides (when a deployment stores any) are layered on top by the
//! loader.

use async_trait::async_trait;
use bindery_core::BookId;
use std::collections::HashMap;

/// A resolved prompt and the content id of its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrompt {
    pub text: String,
    pub cid: String,
}

/// Resolves the full prompt set for one book.
#[async_trait]
pub trait PromptResolver: Send + Sync {
    async fn resolve_all(&self, book_id: &BookId) -> HashMap<String, ResolvedPrompt>;
}

/// Prompt names every deployment must resolve.
pub const PROMPT_NAMES: [&str; 10] = [
    "metadata",
    "blend",
    "labels",
    "pattern_analysis",
    "toc_finder",
    "toc_extract",
    "toc_link",
    "toc_finalize",
    "structure_extract",
    "structure_polish",
];

const DEFAULTS: [(&str, &str); 10] = [
    (
        "metadata",
        "Extract bibliographic metadata (title, author, isbn, lccn, publisher, \
         publication year, language, description) from the sampled front-matter text.",
    ),
    (
        "blend",
        "Merge the per-provider OCR texts for this page into clean markdown; \
         report headings, running header, and footer separately.",
    ),
    (
        "labels",
        "Given the page-numbering pattern and this page's header and footer, \
         report the printed page-number label and running header.",
    ),
    (
        "pattern_analysis",
        "From the sampled headers and footers, describe the page-numbering \
         pattern of this book (roman/arabic ranges, offsets, unnumbered plates).",
    ),
    (
        "toc_finder",
        "Scan the sampled pages and report whether a table of contents exists \
         and its start and end pages.",
    ),
    (
        "toc_extract",
        "Extract every table-of-contents entry (number, title, level, printed \
         page number) from the given pages, in reading order.",
    ),
    (
        "toc_link",
        "Resolve this table-of-contents entry to the physical page where it \
         begins, using the page labels as a guide.",
    ),
    (
        "toc_finalize",
        "Verify the linked table of contents: confirm each entry's page, find \
         gaps between consecutive entries, and propose fixes.",
    ),
    (
        "structure_extract",
        "Extract the mechanical text of this chapter from its page span, \
         preserving paragraph breaks.",
    ),
    (
        "structure_polish",
        "Polish the mechanical chapter text: fix OCR artifacts and hyphenation \
         without changing wording.",
    ),
];

/// The compiled-in default prompt set.
#[derive(Clone, Default)]
pub struct EmbeddedPrompts;

#[async_trait]
impl PromptResolver for EmbeddedPrompts {
    async fn resolve_all(&self, _book_id: &BookId) -> HashMap<String, ResolvedPrompt> {
        DEFAULTS
            .iter()
            .map(|(name, text)| {
                (
                    name.to_string(),
                    ResolvedPrompt {
                        text: text.to_string(),
                        cid: "embedded".to_string(),
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "prompts_tests.rs"]
mod tests;
