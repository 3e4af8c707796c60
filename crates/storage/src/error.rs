// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the storage layer

use thiserror::Error;

/// Errors from state-store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid id: {0:?}")]
    InvalidId(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("document not found: {collection}/{doc_id}")]
    NotFound { collection: String, doc_id: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
