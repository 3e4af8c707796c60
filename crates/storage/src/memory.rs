// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory state store for tests.
//!
//! Implements the full [`StateStore`] contract over `IndexMap`s so query
//! results are deterministic, with per-document version counters folded
//! into the CID (every successful update yields a fresh CID) and
//! programmable write failures for crash and partial-batch scenarios.

use crate::error::StoreError;
use crate::op::{WriteAck, WriteKind, WriteOp};
use crate::query::{Cond, FieldSel, Order, Query, Response};
use crate::store::StateStore;
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;

/// Child-relation wiring the memory store knows how to join:
/// (relation name on the parent, child collection, foreign key, to-many).
const RELATIONS: [(&str, &str, &str, bool); 2] = [
    ("ocr_results", "OcrResult", "page_id", true),
    ("toc", "Toc", "book_id", false),
];

#[derive(Default)]
struct MemInner {
    /// collection → doc id → document fields.
    collections: IndexMap<String, IndexMap<String, Map<String, Value>>>,
    /// doc id → version counter.
    versions: IndexMap<String, u64>,
    doc_seq: u64,
    /// Sync writes whose doc id or serialized document contains one of
    /// these needles fail with an injected error.
    fail_needles: Vec<String>,
}

impl MemInner {
    fn cid(collection: &str, doc_id: &str, version: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(collection.as_bytes());
        hasher.update(b":");
        hasher.update(doc_id.as_bytes());
        hasher.update(b":");
        hasher.update(version.to_be_bytes());
        let digest = hasher.finalize();
        let mut out = String::with_capacity(44);
        out.push_str("bafy");
        for byte in digest.iter().take(20) {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    fn check_injected_failure(&self, op: &WriteOp) -> Result<(), StoreError> {
        for needle in &self.fail_needles {
            let serialized = Value::Object(op.document.clone()).to_string();
            if op.doc_id.contains(needle.as_str()) || serialized.contains(needle.as_str()) {
                return Err(StoreError::Write(format!("injected failure: {needle}")));
            }
        }
        Ok(())
    }

    fn apply(&mut self, op: WriteOp) -> Result<WriteAck, StoreError> {
        self.check_injected_failure(&op)?;
        match op.kind {
            WriteKind::Create => {
                let doc_id = if op.doc_id.is_empty() {
                    self.doc_seq += 1;
                    format!("doc-{}", self.doc_seq)
                } else {
                    op.doc_id
                };
                let mut doc = op.document;
                doc.insert("_docID".to_string(), Value::String(doc_id.clone()));
                self.collections
                    .entry(op.collection.clone())
                    .or_default()
                    .insert(doc_id.clone(), doc);
                self.versions.insert(doc_id.clone(), 1);
                let cid = Self::cid(&op.collection, &doc_id, 1);
                Ok(WriteAck { doc_id, cid })
            }
            WriteKind::Update => {
                let doc = self
                    .collections
                    .entry(op.collection.clone())
                    .or_default()
                    .get_mut(&op.doc_id)
                    .ok_or_else(|| StoreError::NotFound {
                        collection: op.collection.clone(),
                        doc_id: op.doc_id.clone(),
                    })?;
                for (field, value) in op.document {
                    if value.is_null() {
                        doc.remove(&field);
                    } else {
                        doc.insert(field, value);
                    }
                }
                let version = self.versions.entry(op.doc_id.clone()).or_insert(0);
                *version += 1;
                let cid = Self::cid(&op.collection, &op.doc_id, *version);
                Ok(WriteAck {
                    doc_id: op.doc_id,
                    cid,
                })
            }
            WriteKind::Delete => {
                let removed = self
                    .collections
                    .entry(op.collection.clone())
                    .or_default()
                    .shift_remove(&op.doc_id);
                if removed.is_none() {
                    return Err(StoreError::NotFound {
                        collection: op.collection.clone(),
                        doc_id: op.doc_id.clone(),
                    });
                }
                self.versions.shift_remove(&op.doc_id);
                Ok(WriteAck {
                    doc_id: op.doc_id,
                    cid: String::new(),
                })
            }
        }
    }

    fn project(&self, collection: &str, doc_id: &str, doc: &Map<String, Value>, fields: &[FieldSel]) -> Map<String, Value> {
        let mut out = Map::new();
        for sel in fields {
            match sel {
                FieldSel::Name(name) => {
                    let value = doc.get(name).cloned().unwrap_or(Value::Null);
                    out.insert(name.clone(), value);
                }
                FieldSel::Relation { name, fields } if name == "_version" => {
                    let version = self.versions.get(doc_id).copied().unwrap_or(0);
                    let cid = Self::cid(collection, doc_id, version);
                    let mut version_obj = Map::new();
                    if fields.iter().any(|f| matches!(f, FieldSel::Name(n) if n == "cid")) {
                        version_obj.insert("cid".to_string(), Value::String(cid));
                    }
                    out.insert(name.clone(), Value::Object(version_obj));
                }
                FieldSel::Relation { name, fields } => {
                    out.insert(name.clone(), self.project_relation(name, fields, doc_id, doc));
                }
            }
        }
        out
    }

    fn project_relation(&self, name: &str, fields: &[FieldSel], parent_id: &str, doc: &Map<String, Value>) -> Value {
        if let Some((_, child, fk, many)) = RELATIONS.iter().find(|(n, ..)| *n == name) {
            let children: Vec<Value> = self
                .collections
                .get(*child)
                .map(|docs| {
                    docs.iter()
                        .filter(|(_, d)| {
                            d.get(*fk).and_then(Value::as_str) == Some(parent_id)
                        })
                        .map(|(id, d)| Value::Object(self.project(child, id, d, fields)))
                        .collect()
                })
                .unwrap_or_default();
            if *many {
                return Value::Array(children);
            }
            return children.into_iter().next().unwrap_or(Value::Null);
        }
        // Inline relation stored directly on the document (e.g. a page link).
        match doc.get(name) {
            Some(Value::Object(obj)) => {
                let mut projected = Map::new();
                for sel in fields {
                    if let FieldSel::Name(field) = sel {
                        projected.insert(
                            field.clone(),
                            obj.get(field).cloned().unwrap_or(Value::Null),
                        );
                    }
                }
                Value::Object(projected)
            }
            _ => Value::Null,
        }
    }
}

/// In-memory [`StateStore`] for tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any sync write whose doc id or serialized document contains
    /// `needle`, until cleared.
    pub fn fail_writes_containing(&self, needle: impl Into<String>) {
        self.inner.lock().fail_needles.push(needle.into());
    }

    pub fn clear_write_failures(&self) {
        self.inner.lock().fail_needles.clear();
    }

    /// All documents in a collection, for assertions.
    pub fn docs(&self, collection: &str) -> Vec<Value> {
        self.inner
            .lock()
            .collections
            .get(collection)
            .map(|docs| docs.values().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    /// One document by id, for assertions.
    pub fn doc(&self, collection: &str, doc_id: &str) -> Option<Value> {
        self.inner
            .lock()
            .collections
            .get(collection)
            .and_then(|docs| docs.get(doc_id))
            .cloned()
            .map(Value::Object)
    }

    /// Current CID of a document, for assertions.
    pub fn cid(&self, collection: &str, doc_id: &str) -> Option<String> {
        let inner = self.inner.lock();
        let version = *inner.versions.get(doc_id)?;
        Some(MemInner::cid(collection, doc_id, version))
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn execute(&self, query: &Query) -> Result<Response, StoreError> {
        let inner = self.inner.lock();
        let mut matches: Vec<(String, Map<String, Value>)> = inner
            .collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, doc)| query.filter.iter().all(|cond| cond.matches(doc)))
                    .map(|(id, doc)| (id.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, order)) = &query.order_by {
            matches.sort_by(|(_, a), (_, b)| {
                let left = a.get(field).cloned().unwrap_or(Value::Null);
                let right = b.get(field).cloned().unwrap_or(Value::Null);
                let ordering = compare_values(&left, &right);
                match order {
                    Order::Asc => ordering,
                    Order::Desc => ordering.reverse(),
                }
            });
        }

        let docs = matches
            .iter()
            .map(|(id, doc)| Value::Object(inner.project(&query.collection, id, doc, &query.fields)))
            .collect();

        let mut response = Response::new();
        response.insert(query.collection.clone(), docs);
        Ok(response)
    }

    fn send(&self, op: WriteOp) {
        let collection = op.collection.clone();
        if let Err(err) = self.inner.lock().apply(op) {
            warn!(%collection, %err, "fire-and-forget write dropped");
        }
    }

    async fn send_sync(&self, op: WriteOp) -> Result<WriteAck, StoreError> {
        self.inner.lock().apply(op)
    }

    async fn send_many_sync(
        &self,
        ops: Vec<WriteOp>,
    ) -> Result<Vec<Result<WriteAck, StoreError>>, StoreError> {
        let mut inner = self.inner.lock();
        Ok(ops.into_iter().map(|op| inner.apply(op)).collect())
    }

    async fn upsert_with_version(
        &self,
        collection: &str,
        filter: Vec<Cond>,
        create: Map<String, Value>,
        update: Map<String, Value>,
    ) -> Result<WriteAck, StoreError> {
        let mut inner = self.inner.lock();
        let existing = inner
            .collections
            .get(collection)
            .and_then(|docs| {
                docs.iter()
                    .find(|(_, doc)| filter.iter().all(|cond| cond.matches(doc)))
                    .map(|(id, _)| id.clone())
            });
        match existing {
            Some(doc_id) => inner.apply(WriteOp::update(collection, doc_id, update)),
            None => inner.apply(WriteOp::create(collection, create)),
        }
    }

    async fn update_with_version(
        &self,
        collection: &str,
        doc_id: &str,
        input: Map<String, Value>,
    ) -> Result<WriteAck, StoreError> {
        self.inner.lock().apply(WriteOp::update(collection, doc_id, input))
    }
}

fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a
            .as_str()
            .unwrap_or_default()
            .cmp(b.as_str().unwrap_or_default()),
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
