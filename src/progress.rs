//! Observer trait for per-invocation pipeline events.
//!
//! Attach an [`Arc<dyn PipelineObserver>`] with
//! [`crate::Pipeline::with_observer`] to follow invocations as they move
//! through their states.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a channel, a metrics sink or a terminal spinner without
//! the library knowing how the host communicates. The trait is `Send + Sync`
//! because invocations for distinct events run concurrently on different
//! threads.
//!
//! # Ordering
//!
//! For one invocation, [`on_stage`](PipelineObserver::on_stage) is called with
//! `Received`, `Reading`, `Extracting`, `Rendering`, `Publishing` in that order
//! (stopping at the stage that failed), followed by exactly one of
//! [`on_succeeded`](PipelineObserver::on_succeeded) or
//! [`on_failed`](PipelineObserver::on_failed). Events of different
//! invocations interleave freely.
//!
//! # Example
//!
//! ```rust
//! use blob2md::output::Failed;
//! use blob2md::PipelineObserver;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! #[derive(Default)]
//! struct FailureCounter(AtomicUsize);
//!
//! impl PipelineObserver for FailureCounter {
//!     fn on_failed(&self, failed: &Failed) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} failed: {}", failed.source, failed.message);
//!     }
//! }
//! ```

use crate::output::{Converted, Failed, Stage};
use std::sync::Arc;

/// Receives state changes of pipeline invocations.
///
/// All methods have default no-op implementations so implementors only
/// override what they care about.
pub trait PipelineObserver: Send + Sync {
    /// An invocation for `source` entered a non-terminal `stage`.
    fn on_stage(&self, source: &str, stage: Stage) {
        let _ = (source, stage);
    }

    /// An invocation published its output.
    fn on_succeeded(&self, converted: &Converted) {
        let _ = converted;
    }

    /// An invocation ended without output.
    fn on_failed(&self, failed: &Failed) {
        let _ = failed;
    }
}

/// Observer that ignores every event. The default.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Shared observer handle, as stored by the pipeline.
pub type SharedObserver = Arc<dyn PipelineObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::extract::DocumentFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        stages: Mutex<Vec<Stage>>,
        succeeded: AtomicUsize,
        failed: AtomicUsize,
    }

    impl PipelineObserver for Recording {
        fn on_stage(&self, _source: &str, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_succeeded(&self, _converted: &Converted) {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        }

        fn on_failed(&self, _failed: &Failed) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let obs = NoopObserver;
        obs.on_stage("a.pdf", Stage::Reading);
        obs.on_failed(&Failed {
            source: "a.pdf".into(),
            kind: ErrorKind::ReadError,
            stage: Stage::Reading,
            message: "gone".into(),
            duration_ms: 1,
        });
    }

    #[test]
    fn recording_observer_through_arc_dyn() {
        let recording = Arc::new(Recording::default());
        let shared: SharedObserver = recording.clone();

        shared.on_stage("a.txt", Stage::Received);
        shared.on_stage("a.txt", Stage::Reading);
        shared.on_succeeded(&Converted {
            source: "a.txt".into(),
            output: "a.md".into(),
            format: DocumentFormat::Text,
            elements: 2,
            bytes: 10,
            duration_ms: 4,
        });

        assert_eq!(
            *recording.stages.lock().unwrap(),
            vec![Stage::Received, Stage::Reading]
        );
        assert_eq!(recording.succeeded.load(Ordering::SeqCst), 1);
        assert_eq!(recording.failed.load(Ordering::SeqCst), 0);
    }
}
