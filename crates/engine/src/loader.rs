// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot rehydration of a book from the store.
//!
//! The store is the system of record: after a crash, rerunning
//! [`load_book`] reconstructs the exact pre-crash state. Mandatory data
//! (the book record, a positive page count) is fatal when missing; agent
//! states and history are loaded best-effort because losing them only
//! re-runs paid work.

use crate::config::PipelineConfig;
use crate::error::EngineError;
use crate::extract;
use bindery_core::{
    shared, AgentRun, AgentState, BookId, BookMeta, BookState, OpType, OperationState, PageState,
    SharedBook, TocEntry,
};
use bindery_adapters::PromptResolver;
use bindery_storage::{Order, Query, StateStore};
use serde_json::{json, Value};
use tracing::{error, warn};

const BOOK_FIELDS: [&str; 31] = [
    "_docID",
    "page_count",
    "title",
    "author",
    "isbn",
    "lccn",
    "publisher",
    "publication_year",
    "language",
    "description",
    "status",
    "metadata_started",
    "metadata_complete",
    "metadata_failed",
    "metadata_retries",
    "pattern_analysis_started",
    "pattern_analysis_complete",
    "pattern_analysis_failed",
    "pattern_analysis_retries",
    "structure_started",
    "structure_complete",
    "structure_failed",
    "structure_retries",
    "structure_phase",
    "structure_chapters_total",
    "structure_chapters_extracted",
    "structure_chapters_polished",
    "structure_polish_failed",
    "page_pattern_analysis_json",
    "finalize_entries_complete",
    "finalize_entries_found",
];

const TOC_FIELDS: [&str; 21] = [
    "_docID",
    "toc_found",
    "start_page",
    "end_page",
    "finder_started",
    "finder_complete",
    "finder_failed",
    "finder_retries",
    "extract_started",
    "extract_complete",
    "extract_failed",
    "extract_retries",
    "link_started",
    "link_complete",
    "link_failed",
    "link_retries",
    "finalize_started",
    "finalize_complete",
    "finalize_failed",
    "finalize_retries",
    "finalize_phase",
];

const PAGE_FIELDS: [&str; 13] = [
    "_docID",
    "page_num",
    "extract_complete",
    "ocr_complete",
    "ocr_markdown",
    "headings",
    "header",
    "footer",
    "blend_complete",
    "label_complete",
    "page_number_label",
    "running_header",
    "book_id",
];

const AGENT_FIELDS: [&str; 10] = [
    "_docID",
    "agent_id",
    "agent_type",
    "entry_doc_id",
    "iteration",
    "complete",
    "messages_json",
    "pending_tool_calls",
    "tool_results",
    "result_json",
];

const CHAPTER_FIELDS: [&str; 19] = [
    "_docID",
    "unique_key",
    "entry_id",
    "parent_id",
    "sort_order",
    "level",
    "level_name",
    "entry_number",
    "title",
    "start_page",
    "end_page",
    "mechanical_text",
    "polished_text",
    "word_count",
    "kind",
    "confidence",
    "extract_done",
    "polish_done",
    "polish_failed",
];

/// Load everything the coordinator needs for one book. Returns the shared
/// book state and the ToC document id, when one exists.
pub async fn load_book<S: StateStore>(
    store: &S,
    resolver: &dyn PromptResolver,
    cfg: &PipelineConfig,
    raw_book_id: &str,
) -> Result<(SharedBook, Option<String>), EngineError> {
    let book_id = BookId::parse(raw_book_id)?;
    let mut book = BookState::new(book_id.clone());

    load_book_record(store, cfg, &mut book).await?;
    let toc_doc_id = load_toc_record(store, cfg, &mut book).await?;
    load_pages(store, &mut book).await?;
    derive_page_level_ops(&mut book);
    if let Some(toc_doc_id) = &toc_doc_id {
        load_toc_entries(store, &mut book, toc_doc_id).await?;
    }

    let prompts = resolver.resolve_all(&book_id).await;
    for (name, resolved) in prompts {
        book.prompt_cids.insert(name.clone(), resolved.cid);
        book.prompts.insert(name, resolved.text);
    }

    // Losing agent states re-runs paid work, so failures here are loud
    // but not fatal.
    if let Err(err) = load_agent_states(store, &mut book).await {
        error!(book_id = %book.id, %err, "failed to rehydrate agent states");
    }

    if book.op_is_started(OpType::Structure) || book.op_is_complete(OpType::Structure) {
        load_chapters(store, &mut book).await?;
    }

    Ok((shared(book), toc_doc_id))
}

async fn load_book_record<S: StateStore>(
    store: &S,
    cfg: &PipelineConfig,
    book: &mut BookState,
) -> Result<(), EngineError> {
    let query = Query::new("Book")
        .select(BOOK_FIELDS)
        .select(["finalize_gaps_complete", "finalize_gaps_fixes"])
        .select_version()
        .filter_eq("book_id", json!(book.id.as_str()));
    let response = store.execute(&query).await?;
    let doc = response
        .get("Book")
        .and_then(|docs| docs.first())
        .ok_or_else(|| EngineError::BookNotFound(book.id.to_string()))?;

    let page_count = extract::get_u32(doc, "page_count").unwrap_or(0);
    if page_count == 0 {
        return Err(EngineError::EmptyBook(book.id.to_string()));
    }
    book.total_pages = page_count;
    book.book_doc_id = extract::doc_id(doc).unwrap_or_default();
    if let Some(cid) = extract::cid(doc) {
        book.book_cid = cid;
    }
    book.status = extract::get_str(doc, "status").unwrap_or_default();
    book.meta = BookMeta {
        title: extract::get_str(doc, "title").unwrap_or_default(),
        author: extract::get_str(doc, "author").unwrap_or_default(),
        isbn: extract::get_str(doc, "isbn").unwrap_or_default(),
        lccn: extract::get_str(doc, "lccn").unwrap_or_default(),
        publisher: extract::get_str(doc, "publisher").unwrap_or_default(),
        publication_year: extract::get_u32(doc, "publication_year"),
        language: extract::get_str(doc, "language").unwrap_or_default(),
        description: extract::get_str(doc, "description").unwrap_or_default(),
    };

    for (op, prefix) in [
        (OpType::Metadata, "metadata"),
        (OpType::PatternAnalysis, "pattern_analysis"),
        (OpType::Structure, "structure"),
    ] {
        book.set_op_state(op, op_state_from(doc, prefix, cfg.max_retries_for(op)));
    }

    book.structure_phase = extract::get_str(doc, "structure_phase").unwrap_or_default();
    book.structure.chapters_total = extract::get_u32(doc, "structure_chapters_total").unwrap_or(0);
    book.structure.chapters_extracted =
        extract::get_u32(doc, "structure_chapters_extracted").unwrap_or(0);
    book.structure.chapters_polished =
        extract::get_u32(doc, "structure_chapters_polished").unwrap_or(0);
    book.structure.polish_failed = extract::get_u32(doc, "structure_polish_failed").unwrap_or(0);

    book.finalize.entries_complete = extract::get_u32(doc, "finalize_entries_complete").unwrap_or(0);
    book.finalize.entries_found = extract::get_u32(doc, "finalize_entries_found").unwrap_or(0);
    book.finalize.gaps_complete = extract::get_u32(doc, "finalize_gaps_complete").unwrap_or(0);
    book.finalize.gaps_fixes = extract::get_u32(doc, "finalize_gaps_fixes").unwrap_or(0);

    if let Some(raw) = extract::get_str(doc, "page_pattern_analysis_json") {
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => book.pattern_json = Some(value),
            Err(err) => error!(book_id = %book.id, %err, "BUG: malformed pattern json"),
        }
    }

    Ok(())
}

async fn load_toc_record<S: StateStore>(
    store: &S,
    cfg: &PipelineConfig,
    book: &mut BookState,
) -> Result<Option<String>, EngineError> {
    let query = Query::new("Book")
        .select(["_docID"])
        .relation("toc", TOC_FIELDS)
        .filter_eq("book_id", json!(book.id.as_str()));
    let response = store.execute(&query).await?;
    let toc = response
        .get("Book")
        .and_then(|docs| docs.first())
        .and_then(|doc| doc.get("toc"))
        .cloned()
        .unwrap_or(Value::Null);
    if toc.is_null() {
        return Ok(None);
    }

    let toc_doc_id = extract::doc_id(&toc).unwrap_or_default();
    book.toc_doc_id = toc_doc_id.clone();
    book.toc_found = extract::get_bool(&toc, "toc_found").unwrap_or(false);
    book.toc_start_page = extract::get_u32(&toc, "start_page").unwrap_or(0);
    book.toc_end_page = extract::get_u32(&toc, "end_page").unwrap_or(0);
    book.finalize_phase = extract::get_str(&toc, "finalize_phase").unwrap_or_default();

    for (op, prefix) in [
        (OpType::TocFinder, "finder"),
        (OpType::TocExtract, "extract"),
        (OpType::TocLink, "link"),
        (OpType::TocFinalize, "finalize"),
    ] {
        book.set_op_state(op, op_state_from(&toc, prefix, cfg.max_retries_for(op)));
    }

    if toc_doc_id.is_empty() {
        Ok(None)
    } else {
        Ok(Some(toc_doc_id))
    }
}

fn op_state_from(doc: &Value, prefix: &str, max_retries: u32) -> OperationState {
    OperationState::from_persisted(
        extract::get_bool(doc, &format!("{prefix}_started")).unwrap_or(false),
        extract::get_bool(doc, &format!("{prefix}_complete")).unwrap_or(false),
        extract::get_bool(doc, &format!("{prefix}_failed")).unwrap_or(false),
        extract::get_u32(doc, &format!("{prefix}_retries")).unwrap_or(0),
        max_retries,
    )
}

async fn load_pages<S: StateStore>(store: &S, book: &mut BookState) -> Result<(), EngineError> {
    let query = Query::new("Page")
        .select(PAGE_FIELDS)
        .select_version()
        .relation("ocr_results", ["provider", "text"])
        .filter_eq("book_id", json!(book.id.as_str()))
        .order_by("page_num", Order::Asc);
    let response = store.execute(&query).await?;
    let docs = response.get("Page").cloned().unwrap_or_default();

    for doc in docs {
        let Some(page_num) = extract::get_u32(&doc, "page_num") else {
            error!(book_id = %book.id, "BUG: page record without page_num");
            continue;
        };
        let mut page = PageState {
            page_doc_id: extract::doc_id(&doc).unwrap_or_default(),
            page_cid: extract::cid(&doc).unwrap_or_default(),
            extract_done: extract::get_bool(&doc, "extract_complete").unwrap_or(false),
            ocr_complete: extract::get_bool(&doc, "ocr_complete").unwrap_or(false),
            ocr_markdown: extract::get_str(&doc, "ocr_markdown").unwrap_or_default(),
            headings: extract::get_str_array(&doc, "headings"),
            header: extract::get_str(&doc, "header").unwrap_or_default(),
            footer: extract::get_str(&doc, "footer").unwrap_or_default(),
            blend_done: extract::get_bool(&doc, "blend_complete").unwrap_or(false),
            label_done: extract::get_bool(&doc, "label_complete").unwrap_or(false),
            page_number_label: extract::get_str(&doc, "page_number_label").unwrap_or_default(),
            running_header: extract::get_str(&doc, "running_header").unwrap_or_default(),
            ..Default::default()
        };
        if let Some(results) = doc.get("ocr_results").and_then(Value::as_array) {
            for result in results {
                let Some(provider) = extract::get_str(result, "provider") else {
                    continue;
                };
                // Empty text is a valid blank-page result.
                let text = extract::get_str(result, "text").unwrap_or_default();
                page.set_ocr_result(provider, text);
            }
        }
        if let Err(err) = book.insert_page(page_num, page) {
            warn!(book_id = %book.id, %err, "skipping out-of-range page record");
        }
    }
    Ok(())
}

/// Page-level operations have no document of their own; their aggregate
/// state is derived from the per-page completion flags.
fn derive_page_level_ops(book: &mut BookState) {
    let total = book.total_pages as usize;
    let loaded = book.pages().count();
    let flags = [
        (OpType::Ocr, book.pages().filter(|(_, p)| p.ocr_complete).count()),
        (OpType::Blend, book.pages().filter(|(_, p)| p.blend_done).count()),
        (OpType::Labels, book.pages().filter(|(_, p)| p.label_done).count()),
    ];
    for (op, done) in flags {
        if total > 0 && loaded == total && done == total {
            let mut state = OperationState::new();
            state.complete();
            book.set_op_state(op, state);
        }
    }
}

async fn load_toc_entries<S: StateStore>(
    store: &S,
    book: &mut BookState,
    toc_doc_id: &str,
) -> Result<(), EngineError> {
    let query = Query::new("TocEntry")
        .select([
            "_docID",
            "entry_number",
            "title",
            "level",
            "level_name",
            "printed_page_number",
            "sort_order",
        ])
        .relation("actual_page", ["_docID"])
        .filter_eq("toc_id", json!(toc_doc_id))
        .order_by("sort_order", Order::Asc);
    let response = store.execute(&query).await?;
    let docs = response.get("TocEntry").cloned().unwrap_or_default();

    book.toc_entries = docs
        .iter()
        .filter_map(|doc| {
            let doc_id = extract::doc_id(doc)?;
            let actual_page_doc_id = doc
                .get("actual_page")
                .filter(|v| !v.is_null())
                .and_then(|page| extract::doc_id(page));
            Some(TocEntry {
                doc_id,
                entry_number: extract::get_str(doc, "entry_number").unwrap_or_default(),
                title: extract::get_str(doc, "title").unwrap_or_default(),
                level: extract::get_u32(doc, "level").unwrap_or(0),
                level_name: extract::get_str(doc, "level_name").unwrap_or_default(),
                printed_page_number: extract::get_str(doc, "printed_page_number")
                    .unwrap_or_default(),
                sort_order: extract::get_u32(doc, "sort_order").unwrap_or(0),
                actual_page_doc_id,
            })
        })
        .collect();
    Ok(())
}

async fn load_agent_states<S: StateStore>(
    store: &S,
    book: &mut BookState,
) -> Result<(), EngineError> {
    let query = Query::new("AgentState")
        .select(AGENT_FIELDS)
        .select_version()
        .filter_eq("book_id", json!(book.id.as_str()));
    let response = store.execute(&query).await?;
    for doc in response.get("AgentState").cloned().unwrap_or_default() {
        let Some(agent_id) = extract::get_str(&doc, "agent_id") else {
            error!(book_id = %book.id, "BUG: agent state without agent_id");
            continue;
        };
        book.set_agent_state(AgentState {
            doc_id: extract::doc_id(&doc).unwrap_or_default(),
            cid: extract::cid(&doc).unwrap_or_default(),
            agent_id,
            agent_type: extract::get_str(&doc, "agent_type").unwrap_or_default(),
            entry_doc_id: extract::get_str(&doc, "entry_doc_id").unwrap_or_default(),
            iteration: extract::get_u32(&doc, "iteration").unwrap_or(0),
            complete: extract::get_bool(&doc, "complete").unwrap_or(false),
            messages_json: extract::get_str(&doc, "messages_json").unwrap_or_default(),
            pending_tool_calls: extract::get_str(&doc, "pending_tool_calls").unwrap_or_default(),
            tool_results: extract::get_str(&doc, "tool_results").unwrap_or_default(),
            result_json: extract::get_str(&doc, "result_json").unwrap_or_default(),
        });
    }
    Ok(())
}

async fn load_chapters<S: StateStore>(store: &S, book: &mut BookState) -> Result<(), EngineError> {
    let query = Query::new("Chapter")
        .select(CHAPTER_FIELDS)
        .select_version()
        .filter_eq("book_id", json!(book.id.as_str()))
        .order_by("sort_order", Order::Asc);
    let response = store.execute(&query).await?;
    let mut chapters = Vec::new();
    for doc in response.get("Chapter").cloned().unwrap_or_default() {
        let chapter = bindery_core::ChapterState {
            doc_id: extract::doc_id(&doc).unwrap_or_default(),
            cid: extract::cid(&doc).unwrap_or_default(),
            unique_key: extract::get_str(&doc, "unique_key").unwrap_or_default(),
            entry_id: extract::get_str(&doc, "entry_id").unwrap_or_default(),
            parent_id: extract::get_str(&doc, "parent_id"),
            sort_order: extract::get_u32(&doc, "sort_order").unwrap_or(0),
            level: extract::get_u32(&doc, "level").unwrap_or(0),
            level_name: extract::get_str(&doc, "level_name").unwrap_or_default(),
            entry_number: extract::get_str(&doc, "entry_number").unwrap_or_default(),
            title: extract::get_str(&doc, "title").unwrap_or_default(),
            start_page: extract::get_u32(&doc, "start_page").unwrap_or(0),
            end_page: extract::get_u32(&doc, "end_page").unwrap_or(0),
            mechanical_text: extract::get_str(&doc, "mechanical_text").unwrap_or_default(),
            polished_text: extract::get_str(&doc, "polished_text").unwrap_or_default(),
            word_count: extract::get_u32(&doc, "word_count").unwrap_or(0),
            kind: extract::get_str(&doc, "kind").unwrap_or_default(),
            confidence: extract::get_f64(&doc, "confidence").unwrap_or(0.0) as f32,
            extract_done: extract::get_bool(&doc, "extract_done").unwrap_or(false),
            polish_done: extract::get_bool(&doc, "polish_done").unwrap_or(false),
            polish_failed: extract::get_bool(&doc, "polish_failed").unwrap_or(false),
        };
        if chapter.validate_span().is_err() {
            error!(book_id = %book.id, key = %chapter.unique_key, "BUG: chapter with invalid span");
            continue;
        }
        chapters.push(chapter);
    }
    book.set_chapters(chapters);
    Ok(())
}

/// Load per-stage costs from `Metric` rows. Non-fatal for callers that
/// treat costs as optional.
pub async fn load_costs<S: StateStore>(store: &S, book: &SharedBook) -> Result<(), EngineError> {
    let book_id = bindery_core::read_book(book, |b| b.id.clone());
    let query = Query::new("Metric")
        .select(["stage", "cost_usd"])
        .filter_eq("book_id", json!(book_id.as_str()));
    let response = store.execute(&query).await?;
    let mut by_stage = std::collections::HashMap::new();
    let mut total = 0.0;
    for doc in response.get("Metric").cloned().unwrap_or_default() {
        let Some(stage) = extract::get_str(&doc, "stage") else {
            continue;
        };
        let cost = extract::get_f64(&doc, "cost_usd").unwrap_or(0.0);
        *by_stage.entry(stage).or_insert(0.0) += cost;
        total += cost;
    }
    bindery_core::with_book(book, |b| b.set_costs(by_stage, total));
    Ok(())
}

/// Load agent-run history. Non-fatal for callers that treat history as
/// optional.
pub async fn load_agent_runs<S: StateStore>(
    store: &S,
    book: &SharedBook,
) -> Result<(), EngineError> {
    let book_id = bindery_core::read_book(book, |b| b.id.clone());
    let query = Query::new("AgentRun")
        .select([
            "_docID",
            "agent_type",
            "job_id",
            "started_at_ms",
            "completed_at_ms",
            "iterations",
            "success",
            "error",
        ])
        .filter_eq("book_id", json!(book_id.as_str()));
    let response = store.execute(&query).await?;
    let runs = response
        .get("AgentRun")
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|doc| AgentRun {
            doc_id: extract::doc_id(doc).unwrap_or_default(),
            agent_type: extract::get_str(doc, "agent_type").unwrap_or_default(),
            job_id: extract::get_str(doc, "job_id").unwrap_or_default(),
            started_at_ms: extract::get_f64(doc, "started_at_ms").unwrap_or(0.0) as u64,
            completed_at_ms: extract::get_f64(doc, "completed_at_ms").map(|v| v as u64),
            iterations: extract::get_u32(doc, "iterations").unwrap_or(0),
            success: extract::get_bool(doc, "success").unwrap_or(false),
            error: extract::get_str(doc, "error"),
        })
        .collect();
    bindery_core::with_book(book, |b| b.set_agent_runs(runs));
    Ok(())
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
