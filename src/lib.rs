//! # blob2md
//!
//! Convert every document that lands in a storage container into Markdown
//! and publish it to a second container.
//!
//! ## Why this crate?
//!
//! Search indexes, retrieval pipelines and LLM prompts want plain structured
//! text, while the documents people upload are PDFs, Word files, slide decks,
//! spreadsheets, web pages and photos of paper. This crate sits behind an
//! "object created" notification: it reads the new object, decomposes it into
//! typed elements (titles, paragraphs, list items, tables, code, text read
//! out of images) and writes one Markdown object next to it, named after the
//! source. Images and scanned PDF pages are read by a vision model when one
//! is configured.
//!
//! ## Pipeline Overview
//!
//! ```text
//! StorageEvent { key }
//!  │
//!  ├─ 1. Read     fetch the whole source object from the input container
//!  ├─ 2. Extract  detect the format, partition into elements
//!  │              (pdfium / OOXML / ODF / calamine / HTML / text / vision)
//!  ├─ 3. Render   elements → Markdown, separated by blank lines
//!  └─ 4. Publish  <base name>.md in the output container (last write wins)
//! ```
//!
//! Each event is one independent invocation; failures are logged and returned
//! as [`InvocationOutcome::Failed`], never retried here.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use blob2md::{Pipeline, PipelineConfig, StorageConnection, StorageEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = StorageConnection::parse("./storage")?;
//!     let config = PipelineConfig::builder(connection)
//!         .vision_enabled(false)
//!         .build()?;
//!     let pipeline = Pipeline::new(&config)?;
//!
//!     // input-files/reports/Q1.docx → output-files/Q1.md
//!     let outcome = pipeline.handle(&StorageEvent::new("reports/Q1.docx")).await;
//!     println!("{}", serde_json::to_string_pretty(&outcome)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `blob2md` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! blob2md = { version = "0.1", default-features = false }
//! ```
//!
//! ## Supported Formats
//!
//! | Format | Engine | Notes |
//! |--------|--------|-------|
//! | PDF | pdfium | text layer; pages without one go to the vision model |
//! | DOCX, PPTX | zip + quick-xml | headings, lists, tables, slide titles |
//! | ODT, ODP | zip + quick-xml | |
//! | XLSX, XLS, ODS | calamine | one title + table per sheet |
//! | HTML | scraper | |
//! | TXT, MD, CSV, JSON, XML | built-in | |
//! | PNG, JPEG, GIF, TIFF, BMP, WebP | vision model | requires a provider |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod event;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod storage;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ExtractionConfig, PipelineConfig, PipelineConfigBuilder, StorageConnection, StorageLocation,
};
pub use convert::{convert_bytes, Pipeline};
pub use document::{Element, ElementKind, SourceObject};
pub use error::{ConfigError, ErrorKind, EventError, ExtractionError, PipelineError, StorageError};
pub use event::StorageEvent;
pub use extract::{DocumentFormat, Extraction, Extractor};
pub use output::{Converted, Failed, InvocationOutcome, OutputObject, RenderedDocument, Stage};
pub use progress::{NoopObserver, PipelineObserver, SharedObserver};
pub use storage::{LocalStore, MemoryStore, ObjectStore};
pub use stream::{dispatch, handle_all, DispatchSummary};
