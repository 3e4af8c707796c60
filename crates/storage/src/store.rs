// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The state-store contract

use crate::error::StoreError;
use crate::op::{WriteAck, WriteOp};
use crate::query::{Cond, Query, Response};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Pluggable document-store abstraction.
///
/// The store is the system of record: every state transition the
/// coordinator acts on is persisted through one of these methods first.
/// Implementations must be internally thread-safe; concurrent writes to
/// the same document are serialized by the store.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Run a query. Fatal for mandatory data; callers may ignore failures
    /// for optional data (costs, run history).
    async fn execute(&self, query: &Query) -> Result<Response, StoreError>;

    /// Fire-and-forget write. Errors are handled internally (logged);
    /// only used where eventual persistence is acceptable.
    fn send(&self, op: WriteOp);

    /// Write and wait for durable confirmation.
    async fn send_sync(&self, op: WriteOp) -> Result<WriteAck, StoreError>;

    /// Write a batch; results are returned in input order. A non-`Ok`
    /// outer result means the batch was not attempted at all; otherwise
    /// each element carries its own per-op outcome.
    async fn send_many_sync(
        &self,
        ops: Vec<WriteOp>,
    ) -> Result<Vec<Result<WriteAck, StoreError>>, StoreError>;

    /// Atomic create-or-update keyed by `filter`; returns the post-write
    /// CID.
    async fn upsert_with_version(
        &self,
        collection: &str,
        filter: Vec<Cond>,
        create: Map<String, Value>,
        update: Map<String, Value>,
    ) -> Result<WriteAck, StoreError>;

    /// Update by document id; the CID changes on every successful update.
    async fn update_with_version(
        &self,
        collection: &str,
        doc_id: &str,
        input: Map<String, Value>,
    ) -> Result<WriteAck, StoreError>;
}
