// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thread-safe map from work-unit id to job-defined completion context

use parking_lot::RwLock;
use std::collections::HashMap;

/// Tracks in-flight work units for a job.
///
/// Ids are opaque unique strings chosen at unit creation; the tracker
/// never invents ids and never persists. `get_and_remove` is the primary
/// lookup for completion handlers: one atomic read-and-delete, so no two
/// handlers can claim the same unit.
#[derive(Debug, Default)]
pub struct WorkUnitTracker<T> {
    units: RwLock<HashMap<String, T>>,
}

impl<T: Clone> WorkUnitTracker<T> {
    pub fn new() -> Self {
        Self {
            units: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, id: impl Into<String>, info: T) {
        self.units.write().insert(id.into(), info);
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.units.read().get(id).cloned()
    }

    /// Atomically look up and remove the entry for `id`.
    pub fn get_and_remove(&self, id: &str) -> Option<T> {
        self.units.write().remove(id)
    }

    pub fn remove(&self, id: &str) {
        self.units.write().remove(id);
    }

    pub fn count(&self) -> usize {
        self.units.read().len()
    }

    /// Snapshot of every tracked info value.
    pub fn values(&self) -> Vec<T> {
        self.units.read().values().cloned().collect()
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
