//! The conversion & publish pipeline: one storage event in, one Markdown
//! object (or one failure record) out.
//!
//! ## Why `handle` never returns `Err`
//!
//! Each event is handled exactly once and nothing upstream can act on a
//! failure: the event source has already delivered it and retry belongs to
//! that collaborator. So every error raised while reading, extracting or
//! publishing is caught here, logged with the source key, the error kind and
//! the cause, and returned as data ([`InvocationOutcome::Failed`]). Other
//! invocations are unaffected.
//!
//! ## State machine
//!
//! ```text
//! Received ─▶ Reading ─▶ Extracting ─▶ Rendering ─▶ Publishing ─▶ Succeeded
//!                 │            │                         │
//!                 └────────────┴─────────────────────────┴──────▶ Failed
//! ```
//!
//! Strictly linear. Nothing is written unless every earlier step succeeded.

use crate::config::PipelineConfig;
use crate::document::SourceObject;
use crate::error::{ConfigError, ExtractionError, PipelineError};
use crate::event::StorageEvent;
use crate::extract::{DocumentFormat, Extractor};
use crate::output::{Converted, Failed, InvocationOutcome, OutputObject, RenderedDocument, Stage};
use crate::pipeline::naming::output_name;
use crate::pipeline::render::render_markdown;
use crate::progress::{NoopObserver, SharedObserver};
use crate::storage::ObjectStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// What a successful run produced, beyond the output object itself.
struct Run {
    output: OutputObject,
    format: DocumentFormat,
    elements: usize,
}

/// Converts source objects into Markdown objects.
///
/// Holds no per-invocation state: clones share the stores, the extractor and
/// the observer, and any number of invocations may run concurrently.
#[derive(Clone)]
pub struct Pipeline {
    input: Arc<dyn ObjectStore>,
    output: Arc<dyn ObjectStore>,
    extractor: Extractor,
    observer: SharedObserver,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("input", &self.input.describe())
            .field("output", &self.output.describe())
            .field("extractor", &self.extractor)
            .finish()
    }
}

impl Pipeline {
    /// Build the storage backends and the extractor described by `config`.
    pub fn new(config: &PipelineConfig) -> Result<Self, ConfigError> {
        let timeout = Duration::from_secs(config.http_timeout_secs);
        let input = config.input.open(timeout)?;
        let output = config.output.open(timeout)?;
        let extractor = Extractor::new(&config.extraction)?;
        info!(
            "Pipeline ready: {} → {} (vision: {})",
            input.describe(),
            output.describe(),
            if extractor.has_vision() { "on" } else { "off" }
        );
        Ok(Self::with_stores(input, output, extractor))
    }

    /// Assemble a pipeline from ready-made parts.
    pub fn with_stores(
        input: Arc<dyn ObjectStore>,
        output: Arc<dyn ObjectStore>,
        extractor: Extractor,
    ) -> Self {
        Self {
            input,
            output,
            extractor,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    /// Convert and publish the object at `key`, returning the published
    /// object or the first error. Stage callbacks fire; terminal callbacks
    /// and outcome records are left to [`Pipeline::handle`].
    pub async fn process(&self, key: &str) -> Result<OutputObject, PipelineError> {
        let mut stage = Stage::Received;
        self.run(key, &mut stage).await.map(|run| run.output)
    }

    /// Handle one storage event end-to-end. Never fails: the outcome is
    /// logged, reported to the observer and returned.
    pub async fn handle(&self, event: &StorageEvent) -> InvocationOutcome {
        let key = event.key.as_str();
        let start = Instant::now();
        info!(source = %key, "invocation started");

        let mut stage = Stage::Received;
        let result = self.run(key, &mut stage).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(run) => {
                let converted = Converted {
                    source: key.to_string(),
                    output: run.output.key,
                    format: run.format,
                    elements: run.elements,
                    bytes: run.output.content.len(),
                    duration_ms,
                };
                info!(
                    source = %converted.source,
                    output = %converted.output,
                    format = %converted.format,
                    elements = converted.elements,
                    bytes = converted.bytes,
                    duration_ms,
                    "converted"
                );
                self.observer.on_succeeded(&converted);
                InvocationOutcome::Succeeded(converted)
            }
            Err(err) => {
                let failed = Failed::from_error(key, stage, &err, duration_ms);
                error!(
                    source = %failed.source,
                    error_kind = %failed.kind,
                    error = %failed.message,
                    stage = %failed.stage,
                    duration_ms,
                    "conversion failed"
                );
                self.observer.on_failed(&failed);
                InvocationOutcome::Failed(failed)
            }
        }
    }

    fn enter(&self, key: &str, stage: &mut Stage, next: Stage) {
        *stage = next;
        debug!(source = %key, stage = %next, "stage");
        self.observer.on_stage(key, next);
    }

    async fn run(&self, key: &str, stage: &mut Stage) -> Result<Run, PipelineError> {
        self.enter(key, stage, Stage::Received);

        // ── Step 1: Read ─────────────────────────────────────────────────
        self.enter(key, stage, Stage::Reading);
        let bytes = self
            .input
            .read_all(key)
            .await
            .map_err(|source| PipelineError::Read {
                key: key.to_string(),
                source,
            })?;
        let source = SourceObject::new(key, bytes);
        debug!(source = %key, bytes = source.len(), "source read");

        // ── Step 2: Extract ──────────────────────────────────────────────
        self.enter(key, stage, Stage::Extracting);
        let extraction = self
            .extractor
            .extract(Arc::clone(source.bytes()), source.base_name())
            .await
            .map_err(|source| PipelineError::Extraction {
                key: key.to_string(),
                source,
            })?;

        // ── Step 3: Render ───────────────────────────────────────────────
        self.enter(key, stage, Stage::Rendering);
        let rendered = render_markdown(&extraction.elements);
        let output = OutputObject {
            key: output_name(key),
            content: rendered.markdown,
        };

        // ── Step 4: Publish (last write wins) ────────────────────────────
        self.enter(key, stage, Stage::Publishing);
        self.output
            .write(&output.key, output.content.clone().into_bytes(), true)
            .await
            .map_err(|source| PipelineError::Publish {
                key: output.key.clone(),
                source,
            })?;

        Ok(Run {
            output,
            format: extraction.format,
            elements: rendered.element_count,
        })
    }
}

/// Extract and render bytes without any storage, e.g. for a local file.
pub async fn convert_bytes(
    extractor: &Extractor,
    bytes: impl Into<Arc<[u8]>>,
    name: &str,
) -> Result<(DocumentFormat, RenderedDocument), ExtractionError> {
    let extraction = extractor.extract(bytes.into(), name).await?;
    Ok((extraction.format, render_markdown(&extraction.elements)))
}
