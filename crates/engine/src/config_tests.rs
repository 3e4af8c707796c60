// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn defaults() {
    let cfg = PipelineConfig::default();
    assert_eq!(cfg.max_retries, 3);
    assert_eq!(cfg.ocr_providers, vec!["tesseract", "paddle"]);
    assert_eq!(cfg.chapter_write_concurrency, 5);
    assert!(cfg.skip.is_empty());
}

#[test]
fn empty_toml_yields_defaults() {
    let cfg = PipelineConfig::from_toml("").unwrap();
    assert_eq!(cfg.max_retries, 3);
}

#[test]
fn toml_overrides() {
    let cfg = PipelineConfig::from_toml(
        r#"
max_retries = 5
ocr_providers = ["tesseract"]
skip = ["blend"]

[retry_overrides]
toc_link = 1
"#,
    )
    .unwrap();
    assert_eq!(cfg.max_retries, 5);
    assert_eq!(cfg.ocr_providers, vec!["tesseract"]);
    assert_eq!(cfg.max_retries_for(OpType::TocLink), 1);
    assert_eq!(cfg.max_retries_for(OpType::Metadata), 5);
    assert!(cfg.is_skipped(OpType::Blend));
    assert!(!cfg.is_skipped(OpType::Ocr));
}

#[test]
fn malformed_toml_is_a_config_error() {
    assert!(matches!(
        PipelineConfig::from_toml("max_retries = \"lots\""),
        Err(crate::error::EngineError::Config(_))
    ));
}

#[test]
fn load_reads_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.toml");
    std::fs::write(&path, "max_retries = 7\n").unwrap();
    let cfg = PipelineConfig::load(&path).unwrap();
    assert_eq!(cfg.max_retries, 7);
}
