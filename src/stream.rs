//! Event dispatch: run one pipeline invocation per event, concurrently.
//!
//! ## Why spawn every invocation?
//!
//! Events are independent units of work. Each invocation runs as its own
//! tokio task, so on the multi-thread runtime distinct events are converted
//! in parallel, and a panic inside one invocation is contained by its
//! `JoinHandle` instead of tearing down the dispatcher. `buffer_unordered`
//! bounds how many invocations are in flight; outcomes are counted in
//! completion order.

use crate::convert::Pipeline;
use crate::event::StorageEvent;
use crate::output::InvocationOutcome;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;
use tracing::{error, info};

/// Totals for one dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl DispatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    fn record(&mut self, success: bool) {
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Handle every event of `events`, at most `concurrency` at a time, until
/// the stream ends. `concurrency` of 0 is treated as 1.
pub async fn dispatch<S>(pipeline: &Pipeline, events: S, concurrency: usize) -> DispatchSummary
where
    S: Stream<Item = StorageEvent> + Send,
{
    let concurrency = concurrency.max(1);
    info!("Dispatching events (concurrency {})", concurrency);

    let summary = events
        .map(|event| {
            let pipeline = pipeline.clone();
            async move {
                let key = event.key.clone();
                let handle = tokio::spawn(async move { pipeline.handle(&event).await });
                match handle.await {
                    Ok(outcome) => outcome.is_success(),
                    Err(e) => {
                        error!(source = %key, error = %e, "invocation aborted");
                        false
                    }
                }
            }
        })
        .buffer_unordered(concurrency)
        .fold(DispatchSummary::default(), |mut summary, success| async move {
            summary.record(success);
            summary
        })
        .await;

    info!(
        "Dispatch finished: {} succeeded, {} failed",
        summary.succeeded, summary.failed
    );
    summary
}

/// Handle a fixed list of keys, returning every outcome in input order.
///
/// ```
/// # use std::sync::Arc;
/// # use blob2md::{handle_all, Extractor, MemoryStore, Pipeline};
/// # tokio_test::block_on(async {
/// let input = MemoryStore::new("input-files");
/// input.insert("notes/todo.txt", "Buy milk.");
/// let output = MemoryStore::new("output-files");
/// let pipeline = Pipeline::with_stores(
///     Arc::new(input),
///     Arc::new(output.clone()),
///     Extractor::default(),
/// );
///
/// let outcomes = handle_all(&pipeline, &["notes/todo.txt".to_string()], 4).await;
/// assert!(outcomes[0].is_success());
/// assert_eq!(output.get_string("todo.md").as_deref(), Some("Buy milk."));
/// # });
/// ```
pub async fn handle_all(
    pipeline: &Pipeline,
    keys: &[String],
    concurrency: usize,
) -> Vec<InvocationOutcome> {
    futures::stream::iter(keys.iter().cloned().map(|key| {
        let pipeline = pipeline.clone();
        async move { pipeline.handle(&StorageEvent::new(key)).await }
    }))
    .buffered(concurrency.max(1))
    .collect()
    .await
}
