//! Behavioral specifications for the bindery pipeline coordinator.
//!
//! These tests are black-box: they wire the engine to the in-memory
//! store and a scripted dispatcher, drive whole books through the
//! pipeline, and verify the durable state. See tests/specs/prelude.rs
//! for the shared fixtures.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/full_pipeline.rs"]
mod full_pipeline;

#[path = "specs/crash_recovery.rs"]
mod crash_recovery;

#[path = "specs/reset.rs"]
mod reset;
