// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine

use bindery_core::StateError;
use bindery_storage::StoreError;
use thiserror::Error;

/// Errors from loading, persistence, and job coordination
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("book not found: {0}")]
    BookNotFound(String),
    #[error("book {0} has no pages")]
    EmptyBook(String),
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("config error: {0}")]
    Config(String),
    #[error("chapter batch write failed: {failed} of {total}")]
    ChapterBatch { failed: usize, total: usize },
}
