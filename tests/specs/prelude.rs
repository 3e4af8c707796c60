//! Shared fixtures: seeded books, a scripted dispatcher covering every
//! stage, and the submit/complete loop a real embedding process runs.

pub use bindery_adapters::{Dispatcher, FakeDispatcher, FakeImageSource};
pub use bindery_core::{SequentialIdGen, WorkUnitKind};
pub use bindery_engine::{load_book, Job, PipelineConfig, PipelineJob};
pub use bindery_storage::{MemoryStore, StateStore, WriteOp};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub type TestJob = PipelineJob<MemoryStore, FakeImageSource, SequentialIdGen>;

pub fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Seed a book with its page records; returns the book doc id.
pub async fn seed_book(store: &MemoryStore, book_id: &str, page_count: u32) -> String {
    let ack = store
        .send_sync(WriteOp::create(
            "Book",
            fields(json!({
                "book_id": book_id,
                "page_count": page_count,
                "status": "new",
            })),
        ))
        .await
        .unwrap();
    for page_num in 1..=page_count {
        store
            .send_sync(WriteOp::create(
                "Page",
                fields(json!({"book_id": book_id, "page_num": page_num})),
            ))
            .await
            .unwrap();
    }
    ack.doc_id
}

pub async fn make_job(store: &Arc<MemoryStore>, book_id: &str) -> TestJob {
    make_job_with_cfg(store, book_id, config()).await
}

pub async fn make_job_with_cfg(
    store: &Arc<MemoryStore>,
    book_id: &str,
    cfg: PipelineConfig,
) -> TestJob {
    let (book, _) = load_book(
        store.as_ref(),
        &bindery_adapters::EmbeddedPrompts,
        &cfg,
        book_id,
    )
    .await
    .unwrap();
    PipelineJob::new(
        Arc::clone(store),
        FakeImageSource::new(),
        SequentialIdGen::new("unit"),
        cfg,
        book,
    )
}

/// One OCR provider keeps unit counts easy to reason about in specs.
pub fn config() -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.ocr_providers = vec!["tesseract".to_string()];
    cfg
}

/// A dispatcher scripted to carry a book through every stage:
/// three pages, a ToC on page 1 with two chapters starting on pages 2
/// and 3, single-iteration link agents, two-iteration finalize agents,
/// and extract+polish structure agents.
pub fn scripted_dispatcher() -> FakeDispatcher {
    let dispatcher = FakeDispatcher::new();

    dispatcher.on_ocr(|unit| {
        let WorkUnitKind::Ocr(call) = &unit.kind else {
            return Err("not an ocr unit".to_string());
        };
        Ok(json!({"text": format!("Raw text of page {}", call.page)}))
    });

    dispatcher.on_llm(|unit| {
        let WorkUnitKind::Llm(call) = &unit.kind else {
            return Err("not an llm unit".to_string());
        };
        let stage = call.tags.get("stage").map(String::as_str).unwrap_or("");
        let payload = match stage {
            "metadata" => json!({
                "title": "A Field Guide to Bindings",
                "author": "R. Quire",
                "language": "en",
                "publication_year": 1911,
            }),
            "blend" => json!({
                "markdown": "# Blended page",
                "headings": ["Blended page"],
                "header": "FIELD GUIDE",
                "footer": "7",
            }),
            "pattern_analysis" => json!({"numbering": "arabic", "offset": 0}),
            "labels" => json!({"page_number_label": "7", "running_header": "FIELD GUIDE"}),
            "toc_finder" => json!({"found": true, "start_page": 1, "end_page": 1}),
            "toc_extract" => json!({"entries": [
                {
                    "entry_number": "1",
                    "title": "Chapter One",
                    "level": 1,
                    "level_name": "chapter",
                    "printed_page_number": "2",
                },
                {
                    "entry_number": "2",
                    "title": "Chapter Two",
                    "level": 1,
                    "level_name": "chapter",
                    "printed_page_number": "3",
                },
            ]}),
            other => return Err(format!("unscripted stage {other}")),
        };
        Ok(payload)
    });

    dispatcher.on_tool(|unit| {
        let WorkUnitKind::Tool(call) = &unit.kind else {
            return Err("not a tool unit".to_string());
        };
        let action = call
            .payload
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("");
        let payload = match action {
            "link_entry" => {
                let printed = call
                    .payload
                    .get("entry")
                    .and_then(|e| e.get("printed_page_number"))
                    .and_then(Value::as_str)
                    .unwrap_or("0");
                let page: u32 = printed.parse().unwrap_or(0);
                json!({"done": true, "result": {"actual_page": page}})
            }
            // Finalize agents take one extra tool-loop iteration before
            // reporting done.
            "finalize" => json!({
                "done": false,
                "tool_calls": [{"name": "verify_entries"}],
            }),
            "continue" => json!({
                "done": true,
                "finalize_entries_complete": 2,
                "finalize_entries_found": 2,
                "finalize_gaps_complete": 1,
                "finalize_gaps_fixes": 0,
                "result": {"ok": true},
            }),
            "extract_chapter" => json!({"text": "Mechanical chapter text body."}),
            "polish_chapter" => json!({"text": "Polished chapter text body."}),
            other => return Err(format!("unscripted tool action {other}")),
        };
        Ok(payload)
    });

    dispatcher
}

/// The embedding process's loop: submit, drain completions, feed them
/// back, until the job reports done or work dries up.
pub async fn run_pipeline(job: &TestJob, dispatcher: &FakeDispatcher) {
    let units = job.start().await.unwrap();
    dispatcher.submit(units).await.unwrap();

    let mut rounds = 0;
    while !job.done() {
        let results = dispatcher.take_results();
        if results.is_empty() {
            break;
        }
        for result in results {
            let follow_ups = job.on_complete(result).await.unwrap();
            dispatcher.submit(follow_ups).await.unwrap();
        }
        rounds += 1;
        assert!(rounds < 1000, "pipeline did not converge");
    }
}
