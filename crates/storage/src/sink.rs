// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fire-and-forget write sink with group flush.
//!
//! Writes are buffered on a channel and drained by a background task in
//! small batches (~10ms windows) so bursts of cheap writes coalesce.
//! Errors are logged and dropped; anything that must not be lost goes
//! through the synchronous write path instead.

use crate::error::StoreError;
use crate::op::{WriteAck, WriteOp};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::warn;

/// Flush window for group commit.
const FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Maximum ops drained into one batch before flushing.
const FLUSH_THRESHOLD: usize = 100;

/// Handle to the background writer task.
#[derive(Clone)]
pub struct StoreSink {
    tx: mpsc::UnboundedSender<WriteOp>,
}

impl StoreSink {
    /// Spawn the writer task. `apply` performs one durable write.
    pub fn spawn<F, Fut>(apply: F) -> Self
    where
        F: Fn(WriteOp) -> Fut + Send + 'static,
        Fut: Future<Output = Result<WriteAck, StoreError>> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriteOp>();
        tokio::spawn(async move {
            while let Some(first) = rx.recv().await {
                let mut batch = vec![first];
                let deadline = Instant::now() + FLUSH_INTERVAL;
                while batch.len() < FLUSH_THRESHOLD {
                    match timeout_at(deadline, rx.recv()).await {
                        Ok(Some(op)) => batch.push(op),
                        _ => break,
                    }
                }
                for op in batch {
                    let collection = op.collection.clone();
                    let doc_id = op.doc_id.clone();
                    if let Err(err) = apply(op).await {
                        warn!(%collection, %doc_id, %err, "background write failed");
                    }
                }
            }
        });
        Self { tx }
    }

    /// Queue a write. Dropped (with a log line) if the writer task is gone.
    pub fn enqueue(&self, op: WriteOp) {
        if self.tx.send(op).is_err() {
            warn!("store sink task is gone; write dropped");
        }
    }
}
