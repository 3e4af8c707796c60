// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job status snapshots for observability

use bindery_core::{read_book, OpStatus, OpType, SharedBook, StructureProgress};

/// Progress of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpProgress {
    pub op: OpType,
    pub status: OpStatus,
    pub retries: u32,
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub book_id: String,
    /// Name of the first unfinished operation, or `done`.
    pub phase: String,
    pub ops: Vec<OpProgress>,
    pub pages_total: u32,
    pub pages_ocr_complete: u32,
    pub pages_blended: u32,
    pub pages_labeled: u32,
    pub entries_total: usize,
    pub entries_linked: usize,
    pub structure: StructureProgress,
    pub total_cost: f64,
    pub in_flight: usize,
}

impl JobStatus {
    pub fn snapshot(book: &SharedBook, in_flight: usize) -> Self {
        read_book(book, |b| {
            let ops: Vec<OpProgress> = OpType::ALL
                .iter()
                .map(|op| {
                    let state = b.op_state(*op);
                    OpProgress {
                        op: *op,
                        status: state.status(),
                        retries: state.retries(),
                    }
                })
                .collect();
            let phase = OpType::ALL
                .iter()
                .find(|op| !b.op_is_done(**op))
                .map(|op| op.name().to_string())
                .unwrap_or_else(|| "done".to_string());
            JobStatus {
                book_id: b.id.to_string(),
                phase,
                ops,
                pages_total: b.total_pages,
                pages_ocr_complete: b.pages().filter(|(_, p)| p.ocr_complete).count() as u32,
                pages_blended: b.pages().filter(|(_, p)| p.blend_done).count() as u32,
                pages_labeled: b.pages().filter(|(_, p)| p.label_done).count() as u32,
                entries_total: b.toc_entries.len(),
                entries_linked: b.toc_entries.iter().filter(|e| e.is_linked()).count(),
                structure: b.structure,
                total_cost: b.total_cost,
                in_flight,
            }
        })
    }
}
