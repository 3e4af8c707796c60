// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bindery-storage: pluggable state-store abstraction.
//!
//! One production implementation ([`DefraStore`], GraphQL over HTTP with a
//! batching fire-and-forget sink) and one in-memory implementation
//! ([`MemoryStore`]) for tests. Both speak the same [`StateStore`]
//! contract; every successful write returns a content id (CID) that
//! uniquely identifies the resulting document version.

mod defra;
mod error;
mod memory;
mod op;
mod query;
mod sink;
mod store;

pub use defra::DefraStore;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use op::{WriteAck, WriteKind, WriteOp};
pub use query::{Cond, FieldSel, Order, Query, Response};
pub use sink::StoreSink;
pub use store::StateStore;
