// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The closed set of pipeline operations

use crate::error::StateError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One stage of the book pipeline.
///
/// `Metadata`, `PatternAnalysis` and `Structure` track their state on the
/// book record; `TocFinder`, `TocExtract`, `TocLink` and `TocFinalize` on
/// the linked ToC record; `Ocr`, `Blend` and `Labels` are page-level and
/// track per-page completion flags instead of a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    Metadata,
    Ocr,
    Blend,
    PatternAnalysis,
    Labels,
    TocFinder,
    TocExtract,
    TocLink,
    TocFinalize,
    Structure,
}

impl OpType {
    /// Every operation, in pipeline order. Jobs pick the first startable
    /// entry; cascades only ever point forward in this list.
    pub const ALL: [OpType; 10] = [
        OpType::Metadata,
        OpType::Ocr,
        OpType::Blend,
        OpType::PatternAnalysis,
        OpType::Labels,
        OpType::TocFinder,
        OpType::TocExtract,
        OpType::TocLink,
        OpType::TocFinalize,
        OpType::Structure,
    ];

    /// Canonical snake_case name, as used in store fields and reset commands.
    pub fn name(&self) -> &'static str {
        match self {
            OpType::Metadata => "metadata",
            OpType::Ocr => "ocr",
            OpType::Blend => "blend",
            OpType::PatternAnalysis => "pattern_analysis",
            OpType::Labels => "labels",
            OpType::TocFinder => "toc_finder",
            OpType::TocExtract => "toc_extract",
            OpType::TocLink => "toc_link",
            OpType::TocFinalize => "toc_finalize",
            OpType::Structure => "structure",
        }
    }

    /// Parse a canonical operation name.
    pub fn parse(s: &str) -> Result<OpType, StateError> {
        OpType::ALL
            .iter()
            .copied()
            .find(|op| op.name() == s)
            .ok_or_else(|| StateError::UnknownOp(s.to_string()))
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether `s` names an operation that may be reset from the outside.
pub fn is_valid_reset_operation(s: &str) -> bool {
    OpType::parse(s).is_ok()
}

#[cfg(test)]
#[path = "op_tests.rs"]
mod tests;
