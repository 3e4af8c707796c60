// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed store queries.
//!
//! The engine builds [`Query`] values instead of raw query text: the
//! production store renders them to GraphQL (after id validation), the
//! memory store interprets them directly. Keeping the seam typed is what
//! makes query-injection impossible by construction — raw strings never
//! cross it.

use std::collections::HashMap;

use serde_json::Value;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// One filter condition on a top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    Eq(String, Value),
    Ne(String, Value),
    IsNull(String),
    NotNull(String),
}

impl Cond {
    /// Whether `doc` satisfies this condition. A missing field reads as
    /// `Null`.
    pub fn matches(&self, doc: &serde_json::Map<String, Value>) -> bool {
        let get = |field: &str| doc.get(field).cloned().unwrap_or(Value::Null);
        match self {
            Cond::Eq(field, value) => get(field) == *value,
            Cond::Ne(field, value) => get(field) != *value,
            Cond::IsNull(field) => get(field).is_null(),
            Cond::NotNull(field) => !get(field).is_null(),
        }
    }
}

/// One selected field, possibly a relation with its own selections.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSel {
    Name(String),
    Relation { name: String, fields: Vec<FieldSel> },
}

/// A query against one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub fields: Vec<FieldSel>,
    pub filter: Vec<Cond>,
    pub order_by: Option<(String, Order)>,
}

impl Query {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            fields: Vec::new(),
            filter: Vec::new(),
            order_by: None,
        }
    }

    /// Select plain fields by name.
    pub fn select<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields
            .extend(names.into_iter().map(|n| FieldSel::Name(n.into())));
        self
    }

    /// Select a relation with nested fields.
    pub fn relation<I, S>(mut self, name: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.push(FieldSel::Relation {
            name: name.into(),
            fields: names.into_iter().map(|n| FieldSel::Name(n.into())).collect(),
        });
        self
    }

    /// Select `_version { cid }`.
    pub fn select_version(self) -> Self {
        self.relation("_version", ["cid"])
    }

    pub fn filter_eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filter.push(Cond::Eq(field.into(), value));
        self
    }

    pub fn filter_null(mut self, field: impl Into<String>) -> Self {
        self.filter.push(Cond::IsNull(field.into()));
        self
    }

    pub fn filter_not_null(mut self, field: impl Into<String>) -> Self {
        self.filter.push(Cond::NotNull(field.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, order: Order) -> Self {
        self.order_by = Some((field.into(), order));
        self
    }
}

/// Query response: collection name → matching documents.
pub type Response = HashMap<String, Vec<Value>>;

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
