// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-book aggregate.
//!
//! All mutable pipeline state for one book lives here, behind a single
//! lock: callers go through [`read_book`] / [`with_book`] and the lock is
//! never held across I/O. Every method on [`BookState`] assumes the caller
//! holds that lock — including the registry's reset hooks, which run with
//! the write guard already taken.

use crate::agent::{AgentRun, AgentState};
use crate::chapter::ChapterState;
use crate::error::StateError;
use crate::id::BookId;
use crate::op::OpType;
use crate::op_state::OperationState;
use crate::page::PageState;
use crate::registry::Collection;
use crate::toc::{FinalizeProgress, StructureProgress, TocEntry};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Book metadata extracted by the metadata stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookMeta {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub lccn: String,
    pub publisher: String,
    pub publication_year: Option<u32>,
    pub language: String,
    pub description: String,
}

/// Process-wide state for one book.
#[derive(Debug)]
pub struct BookState {
    pub id: BookId,
    pub total_pages: u32,
    pub meta: BookMeta,
    /// Store-visible status label (`processing`, `failed:<op>`, ...).
    pub status: String,

    pages: BTreeMap<u32, PageState>,
    ops: HashMap<OpType, OperationState>,

    pub book_doc_id: String,
    pub toc_doc_id: String,
    pub book_cid: String,
    pub toc_cid: String,
    op_cids: HashMap<OpType, String>,
    /// (collection, doc_id) → CID of the most recent successful write.
    write_registry: HashMap<(String, String), String>,

    pub prompts: HashMap<String, String>,
    pub prompt_cids: HashMap<String, String>,

    agent_states: HashMap<String, AgentState>,

    // ToC discovery
    pub toc_found: bool,
    pub toc_start_page: u32,
    pub toc_end_page: u32,
    pub toc_entries: Vec<TocEntry>,

    pub pattern_json: Option<Value>,

    // Finalize phase
    pub finalize_phase: String,
    pub finalize: FinalizeProgress,

    // Structure phase
    pub structure_phase: String,
    pub structure: StructureProgress,
    chapters: Vec<ChapterState>,

    // Costs and run history, loaded lazily on first access.
    costs_by_stage: Option<HashMap<String, f64>>,
    pub total_cost: f64,
    agent_runs: Option<Vec<AgentRun>>,
}

impl BookState {
    /// Create a fresh book state with one [`OperationState`] per known
    /// operation.
    pub fn new(id: BookId) -> Self {
        let ops = OpType::ALL
            .iter()
            .map(|op| (*op, OperationState::new()))
            .collect();
        Self {
            id,
            total_pages: 0,
            meta: BookMeta::default(),
            status: String::new(),
            pages: BTreeMap::new(),
            ops,
            book_doc_id: String::new(),
            toc_doc_id: String::new(),
            book_cid: String::new(),
            toc_cid: String::new(),
            op_cids: HashMap::new(),
            write_registry: HashMap::new(),
            prompts: HashMap::new(),
            prompt_cids: HashMap::new(),
            agent_states: HashMap::new(),
            toc_found: false,
            toc_start_page: 0,
            toc_end_page: 0,
            toc_entries: Vec::new(),
            pattern_json: None,
            finalize_phase: String::new(),
            finalize: FinalizeProgress::default(),
            structure_phase: String::new(),
            structure: StructureProgress::default(),
            chapters: Vec::new(),
            costs_by_stage: None,
            total_cost: 0.0,
            agent_runs: None,
        }
    }

    fn op_mut(&mut self, op: OpType) -> &mut OperationState {
        self.ops.entry(op).or_default()
    }

    /// Current state of `op`.
    pub fn op_state(&self, op: OpType) -> OperationState {
        self.ops.get(&op).copied().unwrap_or_default()
    }

    /// Replace the state of `op` (used by the loader).
    pub fn set_op_state(&mut self, op: OpType, state: OperationState) {
        self.ops.insert(op, state);
    }

    pub fn op_start(&mut self, op: OpType) -> Result<(), StateError> {
        self.op_mut(op).start(op)
    }

    pub fn op_complete(&mut self, op: OpType) {
        self.op_mut(op).complete();
    }

    /// Record a failure of `op`; true iff the failure is permanent.
    pub fn op_fail(&mut self, op: OpType, max_retries: u32) -> bool {
        self.op_mut(op).fail(max_retries)
    }

    pub fn op_reset(&mut self, op: OpType) {
        self.op_mut(op).reset();
    }

    pub fn op_can_start(&self, op: OpType) -> bool {
        self.op_state(op).can_start()
    }

    pub fn op_is_started(&self, op: OpType) -> bool {
        self.op_state(op).is_started()
    }

    pub fn op_is_complete(&self, op: OpType) -> bool {
        self.op_state(op).is_complete()
    }

    pub fn op_is_done(&self, op: OpType) -> bool {
        self.op_state(op).is_done()
    }

    pub fn op_retries(&self, op: OpType) -> u32 {
        self.op_state(op).retries()
    }

    /// Insert a page state. Page numbers are 1-based and bounded by
    /// `total_pages`.
    pub fn insert_page(&mut self, number: u32, page: PageState) -> Result<(), StateError> {
        if number < 1 || number > self.total_pages {
            return Err(StateError::PageOutOfRange {
                page: number,
                total: self.total_pages,
            });
        }
        self.pages.insert(number, page);
        Ok(())
    }

    pub fn page(&self, number: u32) -> Option<&PageState> {
        self.pages.get(&number)
    }

    pub fn page_mut(&mut self, number: u32) -> Option<&mut PageState> {
        self.pages.get_mut(&number)
    }

    /// Pages in ascending page-number order.
    pub fn pages(&self) -> impl Iterator<Item = (u32, &PageState)> {
        self.pages.iter().map(|(n, p)| (*n, p))
    }

    pub fn pages_mut(&mut self) -> impl Iterator<Item = &mut PageState> {
        self.pages.values_mut()
    }

    /// Find a page by its store document id.
    pub fn page_number_for_doc(&self, doc_id: &str) -> Option<u32> {
        self.pages
            .iter()
            .find(|(_, p)| p.page_doc_id == doc_id)
            .map(|(n, _)| *n)
    }

    /// Record a successful write and refresh the dependent CID fields.
    pub fn track_write(&mut self, collection: &str, doc_id: &str, cid: &str) {
        self.write_registry
            .insert((collection.to_string(), doc_id.to_string()), cid.to_string());
        match collection {
            c if c == Collection::Book.name() && doc_id == self.book_doc_id => {
                self.book_cid = cid.to_string();
            }
            c if c == Collection::Toc.name() && doc_id == self.toc_doc_id => {
                self.toc_cid = cid.to_string();
            }
            c if c == Collection::Page.name() => {
                if let Some(page) = self.pages.values_mut().find(|p| p.page_doc_id == doc_id) {
                    page.page_cid = cid.to_string();
                }
            }
            _ => {}
        }
    }

    /// CID of the most recent successful write of (collection, doc_id).
    pub fn last_cid(&self, collection: &str, doc_id: &str) -> Option<&str> {
        self.write_registry
            .get(&(collection.to_string(), doc_id.to_string()))
            .map(String::as_str)
    }

    pub fn record_op_cid(&mut self, op: OpType, cid: &str) {
        self.op_cids.insert(op, cid.to_string());
    }

    pub fn op_cid(&self, op: OpType) -> Option<&str> {
        self.op_cids.get(&op).map(String::as_str)
    }

    /// Insert or replace the state record for an agent.
    pub fn set_agent_state(&mut self, state: AgentState) {
        self.agent_states.insert(state.agent_id.clone(), state);
    }

    pub fn agent_state(&self, agent_id: &str) -> Option<&AgentState> {
        self.agent_states.get(agent_id)
    }

    pub fn all_agent_states(&self) -> Vec<AgentState> {
        self.agent_states.values().cloned().collect()
    }

    pub fn remove_agent_state(&mut self, agent_id: &str) -> Option<AgentState> {
        self.agent_states.remove(agent_id)
    }

    /// Drop every agent record of the given type; returns the removed
    /// records so their store documents can be deleted too.
    pub fn clear_agent_states(&mut self, agent_type: &str) -> Vec<AgentState> {
        let ids: Vec<String> = self
            .agent_states
            .values()
            .filter(|a| a.agent_type == agent_type)
            .map(|a| a.agent_id.clone())
            .collect();
        ids.iter()
            .filter_map(|id| self.agent_states.remove(id))
            .collect()
    }

    pub fn clear_toc_entries(&mut self) {
        self.toc_entries.clear();
    }

    pub fn clear_entry_links(&mut self) {
        for entry in &mut self.toc_entries {
            entry.actual_page_doc_id = None;
        }
    }

    /// Entries still missing a physical-page link, in sort order.
    pub fn unlinked_entries(&self) -> Vec<TocEntry> {
        let mut entries: Vec<TocEntry> = self
            .toc_entries
            .iter()
            .filter(|e| !e.is_linked())
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.sort_order);
        entries
    }

    /// Resolve an entry to a physical page.
    pub fn link_entry(&mut self, entry_doc_id: &str, page_doc_id: &str) {
        if let Some(entry) = self
            .toc_entries
            .iter_mut()
            .find(|e| e.doc_id == entry_doc_id)
        {
            entry.actual_page_doc_id = Some(page_doc_id.to_string());
        }
    }

    pub fn chapters(&self) -> &[ChapterState] {
        &self.chapters
    }

    pub fn set_chapters(&mut self, chapters: Vec<ChapterState>) {
        self.chapters = chapters;
    }

    pub fn chapter_mut(&mut self, unique_key: &str) -> Option<&mut ChapterState> {
        self.chapters.iter_mut().find(|c| c.unique_key == unique_key)
    }

    pub fn clear_chapters(&mut self) {
        self.chapters.clear();
    }

    /// Whether costs have been loaded from the store yet.
    pub fn costs_loaded(&self) -> bool {
        self.costs_by_stage.is_some()
    }

    pub fn set_costs(&mut self, by_stage: HashMap<String, f64>, total: f64) {
        self.costs_by_stage = Some(by_stage);
        self.total_cost = total;
    }

    /// Fold one work-unit cost into the running totals.
    pub fn add_cost(&mut self, stage: &str, cost_usd: f64) {
        if cost_usd == 0.0 {
            return;
        }
        let by_stage = self.costs_by_stage.get_or_insert_with(HashMap::new);
        *by_stage.entry(stage.to_string()).or_insert(0.0) += cost_usd;
        self.total_cost += cost_usd;
    }

    pub fn costs_by_stage(&self) -> Option<&HashMap<String, f64>> {
        self.costs_by_stage.as_ref()
    }

    pub fn agent_runs(&self) -> Option<&[AgentRun]> {
        self.agent_runs.as_deref()
    }

    pub fn set_agent_runs(&mut self, runs: Vec<AgentRun>) {
        self.agent_runs = Some(runs);
    }

    pub fn push_agent_run(&mut self, run: AgentRun) {
        self.agent_runs.get_or_insert_with(Vec::new).push(run);
    }
}

/// Shared handle to a book: one lock over the whole aggregate.
pub type SharedBook = Arc<RwLock<BookState>>;

pub fn shared(book: BookState) -> SharedBook {
    Arc::new(RwLock::new(book))
}

/// Read under the book lock.
pub fn read_book<T>(book: &SharedBook, f: impl FnOnce(&BookState) -> T) -> T {
    let guard = book.read();
    f(&guard)
}

/// Mutate under the book lock.
pub fn with_book<T>(book: &SharedBook, f: impl FnOnce(&mut BookState) -> T) -> T {
    let mut guard = book.write();
    f(&mut guard)
}

#[cfg(test)]
#[path = "book_tests.rs"]
mod tests;
