// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline configuration

use crate::error::EngineError;
use bindery_core::OpType;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

fn default_max_retries() -> u32 {
    3
}

fn default_ocr_providers() -> Vec<String> {
    vec!["tesseract".to_string(), "paddle".to_string()]
}

fn default_llm_provider() -> String {
    "default".to_string()
}

fn default_chapter_write_concurrency() -> usize {
    5
}

fn default_sample_pages() -> u32 {
    8
}

fn default_pattern_sample_pages() -> u32 {
    20
}

fn default_finder_sample_pages() -> u32 {
    30
}

/// Pipeline configuration, toml-deserializable with defaults for every
/// field.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Retry budget applied to every operation unless overridden.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-operation retry overrides, keyed by operation name.
    #[serde(default)]
    pub retry_overrides: HashMap<String, u32>,
    /// OCR providers run against every page.
    #[serde(default = "default_ocr_providers")]
    pub ocr_providers: Vec<String>,
    /// Provider label attached to LLM work units.
    #[serde(default = "default_llm_provider")]
    pub llm_provider: String,
    /// Operation names to skip entirely.
    #[serde(default)]
    pub skip: Vec<String>,
    /// Concurrent chapter-skeleton writes.
    #[serde(default = "default_chapter_write_concurrency")]
    pub chapter_write_concurrency: usize,
    /// Front-matter pages sampled for the metadata stage.
    #[serde(default = "default_sample_pages")]
    pub metadata_sample_pages: u32,
    /// Pages sampled for pattern analysis.
    #[serde(default = "default_pattern_sample_pages")]
    pub pattern_sample_pages: u32,
    /// Pages scanned by the ToC finder.
    #[serde(default = "default_finder_sample_pages")]
    pub finder_sample_pages: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_overrides: HashMap::new(),
            ocr_providers: default_ocr_providers(),
            llm_provider: default_llm_provider(),
            skip: Vec::new(),
            chapter_write_concurrency: default_chapter_write_concurrency(),
            metadata_sample_pages: default_sample_pages(),
            pattern_sample_pages: default_pattern_sample_pages(),
            finder_sample_pages: default_finder_sample_pages(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| EngineError::Config(format!("read {}: {err}", path.display())))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, EngineError> {
        toml::from_str(raw).map_err(|err| EngineError::Config(err.to_string()))
    }

    /// Retry budget for `op`.
    pub fn max_retries_for(&self, op: OpType) -> u32 {
        self.retry_overrides
            .get(op.name())
            .copied()
            .unwrap_or(self.max_retries)
    }

    /// Whether `op` is toggled off.
    pub fn is_skipped(&self, op: OpType) -> bool {
        self.skip.iter().any(|name| name == op.name())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
