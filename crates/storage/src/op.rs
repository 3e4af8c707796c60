// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write operations and their acknowledgements

use serde_json::{Map, Value};

/// Kind of write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Create,
    Update,
    Delete,
}

/// One document write.
///
/// `document` maps field names to values; on update, a `Null` value
/// deletes the field from the document. `doc_id` is empty for creates
/// that let the store assign an id.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOp {
    pub collection: String,
    pub doc_id: String,
    pub document: Map<String, Value>,
    pub kind: WriteKind,
}

impl WriteOp {
    pub fn create(collection: impl Into<String>, document: Map<String, Value>) -> Self {
        Self {
            collection: collection.into(),
            doc_id: String::new(),
            document,
            kind: WriteKind::Create,
        }
    }

    /// Create with a caller-chosen document id.
    pub fn create_with_id(
        collection: impl Into<String>,
        doc_id: impl Into<String>,
        document: Map<String, Value>,
    ) -> Self {
        Self {
            collection: collection.into(),
            doc_id: doc_id.into(),
            document,
            kind: WriteKind::Create,
        }
    }

    pub fn update(
        collection: impl Into<String>,
        doc_id: impl Into<String>,
        document: Map<String, Value>,
    ) -> Self {
        Self {
            collection: collection.into(),
            doc_id: doc_id.into(),
            document,
            kind: WriteKind::Update,
        }
    }

    pub fn delete(collection: impl Into<String>, doc_id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            doc_id: doc_id.into(),
            document: Map::new(),
            kind: WriteKind::Delete,
        }
    }
}

/// Acknowledgement of a durable write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAck {
    pub doc_id: String,
    /// Content id of the new document version.
    pub cid: String,
}
