// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::id::BookId;

fn book() -> BookState {
    BookState::new(BookId::parse("b1").unwrap())
}

#[test]
fn every_op_has_a_config() {
    for op in OpType::ALL {
        let cfg = OpConfig::of(op);
        assert_eq!(cfg.op, op);
        assert!(!cfg.field_prefix.is_empty());
    }
    assert_eq!(OpConfig::all().count(), OpType::ALL.len());
}

#[yare::parameterized(
    toc_finder = {
        OpType::TocFinder,
        &[OpType::TocExtract, OpType::TocLink, OpType::TocFinalize, OpType::Structure]
    },
    toc_extract = {
        OpType::TocExtract,
        &[OpType::TocLink, OpType::TocFinalize, OpType::Structure]
    },
    toc_link = { OpType::TocLink, &[OpType::TocFinalize, OpType::Structure] },
    toc_finalize = { OpType::TocFinalize, &[OpType::Structure] },
    labels = { OpType::Labels, &[OpType::TocLink, OpType::TocFinalize, OpType::Structure] },
    pattern_analysis = {
        OpType::PatternAnalysis,
        &[OpType::Labels, OpType::TocLink, OpType::TocFinalize, OpType::Structure]
    },
    metadata = { OpType::Metadata, &[] },
    structure = { OpType::Structure, &[] },
)]
fn transitive_cascades(op: OpType, expected: &[OpType]) {
    assert_eq!(OpConfig::transitive_cascade(op), expected);
}

#[test]
fn blend_cascade_reaches_labels_exactly_once() {
    // Labels is reachable both directly and through pattern_analysis.
    let cascade = OpConfig::transitive_cascade(OpType::Blend);
    assert_eq!(
        cascade
            .iter()
            .filter(|op| **op == OpType::Labels)
            .count(),
        1
    );
    assert!(cascade.contains(&OpType::PatternAnalysis));
}

#[test]
fn doc_id_resolution_follows_collection() {
    let mut book = book();
    assert_eq!(OpConfig::of(OpType::Metadata).doc_id(&book), None);
    assert_eq!(OpConfig::of(OpType::TocLink).doc_id(&book), None);

    book.book_doc_id = "book-doc".to_string();
    book.toc_doc_id = "toc-doc".to_string();
    assert_eq!(
        OpConfig::of(OpType::Metadata).doc_id(&book).as_deref(),
        Some("book-doc")
    );
    assert_eq!(
        OpConfig::of(OpType::TocLink).doc_id(&book).as_deref(),
        Some("toc-doc")
    );
    // Page-level operations never have a single doc.
    assert_eq!(OpConfig::of(OpType::Ocr).doc_id(&book), None);
}

#[test]
fn agent_stages_declare_their_agent_types() {
    assert_eq!(OpConfig::of(OpType::TocLink).agent_types, &["toc_link"]);
    assert_eq!(
        OpConfig::of(OpType::TocFinalize).agent_types,
        &["toc_finalize"]
    );
    assert_eq!(OpConfig::of(OpType::Structure).agent_types, &["structure"]);
    assert!(OpConfig::of(OpType::Metadata).agent_types.is_empty());
}

#[test]
fn sync_start_marks_the_expensive_stages() {
    let sync: Vec<OpType> = OpConfig::all()
        .filter(|c| c.sync_start)
        .map(|c| c.op)
        .collect();
    assert_eq!(
        sync,
        vec![
            OpType::Metadata,
            OpType::TocLink,
            OpType::TocFinalize,
            OpType::Structure
        ]
    );
}

#[test]
fn structure_memory_hook_clears_chapters_and_counters() {
    let mut book = book();
    book.set_chapters(vec![crate::chapter::ChapterState::default()]);
    book.structure.chapters_total = 4;
    book.structure_phase = "polish".to_string();

    let hook = OpConfig::of(OpType::Structure).reset_memory.unwrap();
    hook(&mut book);

    assert!(book.chapters().is_empty());
    assert_eq!(book.structure.chapters_total, 0);
    assert!(book.structure_phase.is_empty());
}

#[test]
fn toc_link_memory_hook_unlinks_entries() {
    let mut book = book();
    book.toc_entries = vec![crate::toc::TocEntry {
        doc_id: "e1".to_string(),
        actual_page_doc_id: Some("p1".to_string()),
        ..Default::default()
    }];
    let hook = OpConfig::of(OpType::TocLink).reset_memory.unwrap();
    hook(&mut book);
    assert!(book.toc_entries[0].actual_page_doc_id.is_none());
}
