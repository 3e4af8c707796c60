// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Production store client: GraphQL over HTTP.
//!
//! Queries and mutations are rendered from the typed [`Query`] /
//! [`WriteOp`] values; every identifier is validated before it is
//! interpolated, so malformed ids fail with `InvalidId` before any
//! network call. Fire-and-forget writes go through a [`StoreSink`].

use crate::error::StoreError;
use crate::op::{WriteAck, WriteKind, WriteOp};
use crate::query::{Cond, FieldSel, Order, Query, Response};
use crate::sink::StoreSink;
use crate::store::StateStore;
use async_trait::async_trait;
use bindery_core::validate_id;
use serde_json::{json, Map, Value};
use std::sync::Arc;

struct DefraClient {
    http: reqwest::Client,
    endpoint: String,
}

impl DefraClient {
    async fn graphql(&self, query: String) -> Result<Value, StoreError> {
        let body: Value = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "query": query }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let messages: Vec<String> = errors
                    .iter()
                    .map(|e| {
                        e.get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown error")
                            .to_string()
                    })
                    .collect();
                return Err(StoreError::Query(messages.join("; ")));
            }
        }
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }

    async fn apply(&self, op: &WriteOp) -> Result<WriteAck, StoreError> {
        let mutation = render_mutation(op)?;
        let data = self.graphql(mutation).await?;
        let field = format!("{}_{}", mutation_verb(op.kind), op.collection);
        let doc = first_doc(data.get(&field).cloned().unwrap_or(Value::Null));
        let doc = doc.ok_or_else(|| {
            StoreError::Write(format!("{} returned no document", field))
        })?;
        Ok(WriteAck {
            doc_id: doc
                .get("_docID")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            cid: extract_cid(&doc).unwrap_or_default(),
        })
    }
}

/// GraphQL-over-HTTP [`StateStore`] implementation.
#[derive(Clone)]
pub struct DefraStore {
    client: Arc<DefraClient>,
    sink: StoreSink,
}

impl DefraStore {
    /// Connect to a store at `base_url` (e.g. `http://localhost:9181`).
    ///
    /// Must be called inside a tokio runtime; the fire-and-forget sink
    /// spawns its writer task immediately.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Arc::new(DefraClient {
            http: reqwest::Client::new(),
            endpoint: format!("{}/api/v0/graphql", base_url.into().trim_end_matches('/')),
        });
        let sink_client = Arc::clone(&client);
        let sink = StoreSink::spawn(move |op| {
            let client = Arc::clone(&sink_client);
            async move { client.apply(&op).await }
        });
        Self { client, sink }
    }
}

#[async_trait]
impl StateStore for DefraStore {
    async fn execute(&self, query: &Query) -> Result<Response, StoreError> {
        let rendered = render_query(query)?;
        let data = self.client.graphql(rendered).await?;
        let mut response = Response::new();
        if let Value::Object(map) = data {
            for (key, value) in map {
                let docs = match value {
                    Value::Array(items) => items,
                    Value::Null => Vec::new(),
                    other => vec![other],
                };
                response.insert(key, docs);
            }
        }
        Ok(response)
    }

    fn send(&self, op: WriteOp) {
        self.sink.enqueue(op);
    }

    async fn send_sync(&self, op: WriteOp) -> Result<WriteAck, StoreError> {
        self.client.apply(&op).await
    }

    async fn send_many_sync(
        &self,
        ops: Vec<WriteOp>,
    ) -> Result<Vec<Result<WriteAck, StoreError>>, StoreError> {
        let mut results = Vec::with_capacity(ops.len());
        for op in &ops {
            results.push(self.client.apply(op).await);
        }
        Ok(results)
    }

    async fn upsert_with_version(
        &self,
        collection: &str,
        filter: Vec<Cond>,
        create: Map<String, Value>,
        update: Map<String, Value>,
    ) -> Result<WriteAck, StoreError> {
        let probe = Query {
            collection: collection.to_string(),
            fields: vec![FieldSel::Name("_docID".to_string())],
            filter: filter.clone(),
            order_by: None,
        };
        let response = self.execute(&probe).await?;
        let existing = response
            .get(collection)
            .and_then(|docs| docs.first())
            .and_then(|doc| doc.get("_docID"))
            .and_then(Value::as_str)
            .map(str::to_string);
        match existing {
            Some(doc_id) => {
                self.client
                    .apply(&WriteOp::update(collection, doc_id, update))
                    .await
            }
            None => self.client.apply(&WriteOp::create(collection, create)).await,
        }
    }

    async fn update_with_version(
        &self,
        collection: &str,
        doc_id: &str,
        input: Map<String, Value>,
    ) -> Result<WriteAck, StoreError> {
        self.client
            .apply(&WriteOp::update(collection, doc_id, input))
            .await
    }
}

fn mutation_verb(kind: WriteKind) -> &'static str {
    match kind {
        WriteKind::Create => "create",
        WriteKind::Update => "update",
        WriteKind::Delete => "delete",
    }
}

/// Unwrap the array-or-object shapes mutations come back in.
fn first_doc(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Array(items) => items.into_iter().next().and_then(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        }),
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn extract_cid(doc: &Map<String, Value>) -> Option<String> {
    let version = doc.get("_version")?;
    let obj = match version {
        Value::Array(items) => items.first()?.as_object()?,
        Value::Object(map) => map,
        _ => return None,
    };
    obj.get("cid").and_then(Value::as_str).map(str::to_string)
}

fn check_id(id: &str) -> Result<(), StoreError> {
    validate_id(id).map_err(|_| StoreError::InvalidId(id.to_string()))
}

fn render_query(query: &Query) -> Result<String, StoreError> {
    let mut args = Vec::new();
    if !query.filter.is_empty() {
        let conds: Vec<String> = query
            .filter
            .iter()
            .map(render_cond)
            .collect::<Result<_, _>>()?;
        args.push(format!("filter: {{{}}}", conds.join(", ")));
    }
    if let Some((field, order)) = &query.order_by {
        let dir = match order {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        };
        args.push(format!("order: {{{field}: {dir}}}"));
    }
    let args = if args.is_empty() {
        String::new()
    } else {
        format!("({})", args.join(", "))
    };
    Ok(format!(
        "query {{ {}{} {{ {} }} }}",
        query.collection,
        args,
        render_fields(&query.fields)
    ))
}

fn render_cond(cond: &Cond) -> Result<String, StoreError> {
    match cond {
        Cond::Eq(field, value) => Ok(format!("{field}: {{_eq: {}}}", render_value(value)?)),
        Cond::Ne(field, value) => Ok(format!("{field}: {{_ne: {}}}", render_value(value)?)),
        Cond::IsNull(field) => Ok(format!("{field}: {{_eq: null}}")),
        Cond::NotNull(field) => Ok(format!("{field}: {{_ne: null}}")),
    }
}

fn render_fields(fields: &[FieldSel]) -> String {
    fields
        .iter()
        .map(|sel| match sel {
            FieldSel::Name(name) => name.clone(),
            FieldSel::Relation { name, fields } => {
                format!("{name} {{ {} }}", render_fields(fields))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render a JSON value as a GraphQL input literal. String values must be
/// valid ids — the only strings our queries ever filter on.
fn render_value(value: &Value) -> Result<String, StoreError> {
    match value {
        Value::String(s) => {
            check_id(s)?;
            Ok(format!("{:?}", s))
        }
        Value::Null => Ok("null".to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(StoreError::Query(format!(
            "unsupported filter value: {other}"
        ))),
    }
}

/// Render a document value for a mutation input (no id restriction:
/// document contents are data, not query structure, and are escaped).
fn render_input_value(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let fields: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{k}: {}", render_input_value(v)))
                .collect();
            format!("{{{}}}", fields.join(", "))
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(render_input_value).collect();
            format!("[{}]", rendered.join(", "))
        }
        // serde_json's Display for strings produces a quoted, escaped literal.
        other => other.to_string(),
    }
}

fn render_mutation(op: &WriteOp) -> Result<String, StoreError> {
    let verb = mutation_verb(op.kind);
    let selection = "_docID _version { cid }";
    match op.kind {
        WriteKind::Create => Ok(format!(
            "mutation {{ {verb}_{}(input: {}) {{ {selection} }} }}",
            op.collection,
            render_input_value(&Value::Object(op.document.clone())),
        )),
        WriteKind::Update => {
            check_id(&op.doc_id)?;
            Ok(format!(
                "mutation {{ {verb}_{}(docID: {:?}, input: {}) {{ {selection} }} }}",
                op.collection,
                op.doc_id,
                render_input_value(&Value::Object(op.document.clone())),
            ))
        }
        WriteKind::Delete => {
            check_id(&op.doc_id)?;
            Ok(format!(
                "mutation {{ {verb}_{}(docID: {:?}) {{ _docID }} }}",
                op.collection, op.doc_id,
            ))
        }
    }
}

#[cfg(test)]
#[path = "defra_tests.rs"]
mod tests;
