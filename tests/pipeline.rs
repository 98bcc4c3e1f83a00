//! Integration tests for the conversion & publish pipeline.
//!
//! These drive the public API only, against the in-memory store and a local
//! "account" directory in a temp dir. No network, no vision model and no
//! pdfium library are needed.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use async_trait::async_trait;
use blob2md::event::event_stream;
use blob2md::{
    dispatch, handle_all, ConfigError, Converted, DispatchSummary, ErrorKind, Extractor, Failed,
    InvocationOutcome, MemoryStore, ObjectStore, Pipeline, PipelineConfig, PipelineObserver,
    Stage, StorageConnection, StorageError, StorageEvent,
};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use zip::write::SimpleFileOptions;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route library logs to the test harness; `RUST_LOG=debug` for detail.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn memory_pipeline() -> (Pipeline, MemoryStore, MemoryStore) {
    init_logging();
    let input = MemoryStore::new("input-files");
    let output = MemoryStore::new("output-files");
    let pipeline = Pipeline::with_stores(
        Arc::new(input.clone()),
        Arc::new(output.clone()),
        Extractor::default(),
    );
    (pipeline, input, output)
}

fn local_pipeline(root: &Path) -> Pipeline {
    init_logging();
    let connection = StorageConnection::parse(&root.display().to_string()).unwrap();
    let config = PipelineConfig::builder(connection)
        .vision_enabled(false)
        .build()
        .unwrap();
    Pipeline::new(&config).unwrap()
}

fn docx(document_xml: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("[Content_Types].xml", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"<Types/>").unwrap();
    writer
        .start_file("word/document.xml", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(document_xml.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

const ANNUAL_REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body>
<w:p><w:pPr><w:pStyle w:val="Title"/></w:pPr><w:r><w:t>Annual Report</w:t></w:r></w:p>
<w:p><w:r><w:t>Revenue grew across all regions.</w:t></w:r></w:p>
<w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="1"/></w:numPr></w:pPr><w:r><w:t>North</w:t></w:r></w:p>
<w:tbl>
  <w:tr><w:tc><w:p><w:r><w:t>Region</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Total</w:t></w:r></w:p></w:tc></w:tr>
  <w:tr><w:tc><w:p><w:r><w:t>North</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>42</w:t></w:r></w:p></w:tc></w:tr>
</w:tbl>
<w:sectPr/>
</w:body>
</w:document>"#;

/// Output location that refuses every write.
struct ReadOnlyStore;

#[async_trait]
impl ObjectStore for ReadOnlyStore {
    async fn read_all(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        Err(StorageError::NotFound {
            key: key.to_string(),
            location: self.describe(),
        })
    }

    async fn write(&self, key: &str, _bytes: Vec<u8>, _overwrite: bool) -> Result<(), StorageError> {
        Err(StorageError::PermissionDenied {
            key: key.to_string(),
            location: self.describe(),
            detail: "container is read-only".to_string(),
        })
    }

    fn describe(&self) -> String {
        "memory://locked-output".to_string()
    }
}

#[derive(Default)]
struct TerminalCounts {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl PipelineObserver for TerminalCounts {
    fn on_succeeded(&self, _converted: &Converted) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
    }

    fn on_failed(&self, _failed: &Failed) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

fn expect_failed(outcome: InvocationOutcome) -> blob2md::Failed {
    match outcome {
        InvocationOutcome::Failed(f) => f,
        other => panic!("expected a failure, got {other:?}"),
    }
}

// ── Local storage ────────────────────────────────────────────────────────────

#[tokio::test]
async fn docx_in_local_container_is_published_as_markdown() {
    let root = tempfile::tempdir().unwrap();
    let source = root.path().join("input-files/reports/2024");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(source.join("Annual Report.docx"), docx(ANNUAL_REPORT)).unwrap();

    let pipeline = local_pipeline(root.path());
    let outcome = pipeline
        .handle(&StorageEvent::new("reports/2024/Annual Report.docx"))
        .await;

    let converted = match outcome {
        InvocationOutcome::Succeeded(c) => c,
        other => panic!("expected success, got {other:?}"),
    };
    assert_eq!(converted.output, "Annual Report.md");
    assert_eq!(converted.elements, 4);

    let published =
        std::fs::read_to_string(root.path().join("output-files/Annual Report.md")).unwrap();
    assert_eq!(
        published,
        "Annual Report\n\nRevenue grew across all regions.\n\nNorth\n\nRegion | Total\nNorth | 42"
    );
    assert_eq!(converted.bytes, published.len());
}

#[tokio::test]
async fn missing_local_source_is_a_read_error() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = local_pipeline(root.path());

    let failed = expect_failed(pipeline.handle(&StorageEvent::new("nowhere/ghost.docx")).await);
    assert_eq!(failed.kind, ErrorKind::ReadError);
    assert_eq!(failed.stage, Stage::Reading);
    assert!(!root.path().join("output-files").exists());
}

#[test]
fn input_and_output_must_differ() {
    let root = tempfile::tempdir().unwrap();
    let connection = StorageConnection::parse(&root.path().display().to_string()).unwrap();
    let err = PipelineConfig::builder(connection)
        .output_container("input-files")
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::SameLocation(_)), "{err:?}");
}

// ── Naming and overwrite semantics ───────────────────────────────────────────

#[tokio::test]
async fn outputs_are_flat_and_keep_inner_dots() {
    let (pipeline, input, output) = memory_pipeline();
    input.insert("deep/dir/notes.v2.txt", "Version two of the notes.");
    input.insert("README", "No extension at all.");

    let keys = vec!["deep/dir/notes.v2.txt".to_string(), "README".to_string()];
    let outcomes = handle_all(&pipeline, &keys, 2).await;
    assert!(outcomes.iter().all(InvocationOutcome::is_success), "{outcomes:?}");

    let mut published = output.keys();
    published.sort();
    assert_eq!(published, vec!["README.md", "notes.v2.md"]);
}

#[tokio::test]
async fn same_base_name_last_write_wins() {
    let (pipeline, input, output) = memory_pipeline();
    input.insert("2023/report.txt", "Last year.");
    input.insert("2024/report.md", "This year.");

    pipeline.process("2023/report.txt").await.unwrap();
    assert_eq!(output.get_string("report.md").as_deref(), Some("Last year."));

    pipeline.process("2024/report.md").await.unwrap();
    assert_eq!(output.get_string("report.md").as_deref(), Some("This year."));
    assert_eq!(output.len(), 1);
}

#[tokio::test]
async fn failed_conversion_leaves_previous_output_untouched() {
    let (pipeline, input, output) = memory_pipeline();
    input.insert("report.txt", "Good content.");
    pipeline.process("report.txt").await.unwrap();

    input.insert("report.bin", vec![0u8, 255, 3, 0, 128, 7, 0, 0]);
    let failed = expect_failed(pipeline.handle(&StorageEvent::new("report.bin")).await);
    assert_eq!(failed.kind, ErrorKind::ExtractionError);
    assert_eq!(failed.stage, Stage::Extracting);

    assert_eq!(output.get_string("report.md").as_deref(), Some("Good content."));
}

#[tokio::test]
async fn empty_source_fails_without_output() {
    let (pipeline, input, output) = memory_pipeline();
    input.insert("blank.txt", Vec::<u8>::new());

    let failed = expect_failed(pipeline.handle(&StorageEvent::new("blank.txt")).await);
    assert_eq!(failed.kind, ErrorKind::ExtractionError);
    assert!(output.is_empty());
}

#[tokio::test]
async fn rejected_write_is_a_publish_error() {
    init_logging();
    let input = MemoryStore::new("input-files");
    input.insert("minutes/weekly.txt", "Weekly minutes.");
    let counts = Arc::new(TerminalCounts::default());
    let pipeline = Pipeline::with_stores(
        Arc::new(input.clone()),
        Arc::new(ReadOnlyStore),
        Extractor::default(),
    )
    .with_observer(counts.clone());

    let failed = expect_failed(pipeline.handle(&StorageEvent::new("minutes/weekly.txt")).await);
    assert_eq!(failed.kind, ErrorKind::PublishError);
    assert_eq!(failed.stage, Stage::Publishing);
    assert!(failed.message.contains("weekly.md"), "{}", failed.message);

    assert_eq!(input.get_string("minutes/weekly.txt").as_deref(), Some("Weekly minutes."));
    assert_eq!(input.len(), 1);
    assert_eq!(counts.failed.load(Ordering::SeqCst), 1);
    assert_eq!(counts.succeeded.load(Ordering::SeqCst), 0);
}

// ── Text encodings and content sniffing ──────────────────────────────────────

#[tokio::test]
async fn markdown_mentioning_pdf_header_converts() {
    let (pipeline, input, output) = memory_pipeline();
    input.insert(
        "notes/pdf-notes.md",
        "# PDF internals\n\nEvery PDF file begins with the header %PDF-1.7 followed by objects.\n",
    );

    let outcome = pipeline.handle(&StorageEvent::new("notes/pdf-notes.md")).await;
    assert!(outcome.is_success(), "{outcome:?}");
    let published = output.get_string("pdf-notes.md").unwrap();
    assert!(published.contains("PDF internals"), "{published}");
    assert!(published.contains("%PDF-1.7"), "{published}");
}

#[tokio::test]
async fn legacy_and_utf16_text_convert() {
    let (pipeline, input, output) = memory_pipeline();
    input.insert(
        "menu.txt",
        b"Caf\xe9 menu\n\nCr\xe8me br\xfbl\xe9e, cr\xeapes et g\xe2teau \xe0 la fran\xe7aise.".to_vec(),
    );
    let mut notepad = vec![0xFF, 0xFE];
    for unit in "Hello world.".encode_utf16() {
        notepad.extend_from_slice(&unit.to_le_bytes());
    }
    input.insert("notepad.txt", notepad);

    let keys = vec!["menu.txt".to_string(), "notepad.txt".to_string()];
    let outcomes = handle_all(&pipeline, &keys, 2).await;
    assert!(outcomes.iter().all(InvocationOutcome::is_success), "{outcomes:?}");

    let menu = output.get_string("menu.md").unwrap();
    assert!(menu.contains("Crème brûlée"), "{menu}");
    assert_eq!(output.get_string("notepad.md").as_deref(), Some("Hello world."));
}

#[tokio::test]
async fn outcomes_serialise_with_state_tag() {
    let (pipeline, _input, _output) = memory_pipeline();
    let outcome = pipeline.handle(&StorageEvent::new("ghost.txt")).await;

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["state"], "failed");
    assert_eq!(json["source"], "ghost.txt");
    assert_eq!(json["kind"], "ReadError");
}

// ── Event feed ───────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn event_feed_drives_concurrent_invocations() {
    let (pipeline, input, output) = memory_pipeline();
    input.insert("inbox/a.txt", "Alpha document.");
    input.insert("inbox/b.html", "<html><body><h1>Beta</h1><p>Second document.</p></body></html>");
    input.insert("inbox/c.csv", "name,qty\nwidget,3\n");

    let feed = concat!(
        "inbox/a.txt\n",
        r#"{"subject":"/blobServices/default/containers/input-files/blobs/inbox/b.html","eventType":"Microsoft.Storage.BlobCreated"}"#,
        "\n",
        r#"{"subject":"/blobServices/default/containers/input-files/blobs/inbox/old.txt","eventType":"Microsoft.Storage.BlobDeleted"}"#,
        "\n",
        "not json {\n",
        r#"[{"data":{"url":"https://acct.blob.core.windows.net/input-files/inbox/c.csv"}},{"key":"inbox/missing.txt"}]"#,
        "\n",
    );

    let events = event_stream(Cursor::new(feed.as_bytes().to_vec()));
    let summary = dispatch(&pipeline, events, 3).await;

    assert_eq!(summary, DispatchSummary { succeeded: 3, failed: 1 });
    assert_eq!(output.get_string("a.md").as_deref(), Some("Alpha document."));
    assert!(output.get_string("b.md").unwrap().contains("Beta"));
    assert!(output.get_string("c.md").unwrap().contains("widget"));
    assert!(output.get("missing.md").is_none());
}
