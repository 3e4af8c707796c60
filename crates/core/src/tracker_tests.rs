// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;
use std::thread;

#[test]
fn register_get_remove() {
    let tracker = WorkUnitTracker::new();
    tracker.register("u1", 42u32);
    assert_eq!(tracker.get("u1"), Some(42));
    assert_eq!(tracker.count(), 1);

    tracker.remove("u1");
    assert_eq!(tracker.get("u1"), None);
    assert_eq!(tracker.count(), 0);
}

#[test]
fn get_and_remove_claims_exactly_once() {
    let tracker = WorkUnitTracker::new();
    tracker.register("u1", "info".to_string());
    assert_eq!(tracker.get_and_remove("u1"), Some("info".to_string()));
    assert_eq!(tracker.get_and_remove("u1"), None);
}

#[test]
fn register_overwrites_same_id() {
    let tracker = WorkUnitTracker::new();
    tracker.register("u1", 1u32);
    tracker.register("u1", 2u32);
    assert_eq!(tracker.count(), 1);
    assert_eq!(tracker.get("u1"), Some(2));
}

#[test]
fn concurrent_register_then_drain() {
    const THREADS: usize = 16;
    const PER_THREAD: usize = 1000 / THREADS;

    let tracker = Arc::new(WorkUnitTracker::new());

    let writers: Vec<_> = (0..THREADS)
        .map(|t| {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let id = t * PER_THREAD + i;
                    tracker.register(format!("unit-{id}"), id);
                }
            })
        })
        .collect();
    for handle in writers {
        handle.join().unwrap();
    }
    assert_eq!(tracker.count(), THREADS * PER_THREAD);

    // Drain from a different set of threads; every entry must come back
    // exactly once with the value that was registered.
    let drainers: Vec<_> = (0..THREADS)
        .map(|t| {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                let mut claimed = Vec::new();
                for i in 0..PER_THREAD {
                    let id = t * PER_THREAD + i;
                    if let Some(info) = tracker.get_and_remove(&format!("unit-{id}")) {
                        claimed.push((id, info));
                    }
                }
                claimed
            })
        })
        .collect();

    let mut total = 0;
    for handle in drainers {
        for (id, info) in handle.join().unwrap() {
            assert_eq!(id, info);
            total += 1;
        }
    }
    assert_eq!(total, THREADS * PER_THREAD);
    assert_eq!(tracker.count(), 0);
}
