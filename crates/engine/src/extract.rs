// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Type-checked extraction from store result documents.
//!
//! Store responses are duck-typed JSON. Every read goes through these
//! helpers: a present-but-wrong-shaped value is logged as a bug and
//! skipped, never panicked on.

use serde_json::Value;
use tracing::error;

/// String field, or `None` (with a BUG log when the value exists but has
/// the wrong type).
pub fn get_str(doc: &Value, field: &str) -> Option<String> {
    match doc.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            error!(%field, value = %other, "BUG: expected string field");
            None
        }
    }
}

pub fn get_u32(doc: &Value, field: &str) -> Option<u32> {
    match doc.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_u64().map(|v| v as u32),
        Some(other) => {
            error!(%field, value = %other, "BUG: expected integer field");
            None
        }
    }
}

pub fn get_f64(doc: &Value, field: &str) -> Option<f64> {
    match doc.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(other) => {
            error!(%field, value = %other, "BUG: expected number field");
            None
        }
    }
}

pub fn get_bool(doc: &Value, field: &str) -> Option<bool> {
    match doc.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(other) => {
            error!(%field, value = %other, "BUG: expected boolean field");
            None
        }
    }
}

/// String-array field; non-string elements are dropped with a BUG log.
pub fn get_str_array(doc: &Value, field: &str) -> Vec<String> {
    match doc.get(field) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                other => {
                    error!(%field, value = %other, "BUG: expected string element");
                    None
                }
            })
            .collect(),
        Some(other) => {
            error!(%field, value = %other, "BUG: expected array field");
            Vec::new()
        }
    }
}

/// The `_docID` of a result document.
pub fn doc_id(doc: &Value) -> Option<String> {
    get_str(doc, "_docID")
}

/// The `_version.cid` of a result document (object or single-element
/// array shape).
pub fn cid(doc: &Value) -> Option<String> {
    let version = doc.get("_version")?;
    let obj = match version {
        Value::Array(items) => items.first()?,
        other => other,
    };
    match obj.get("cid") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            error!(value = %other, "BUG: expected string cid");
            None
        }
        None => None,
    }
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
