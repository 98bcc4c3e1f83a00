//! Output-side data model: the rendered Markdown, the object published for
//! it, and the per-invocation outcome records.

use crate::error::{ErrorKind, PipelineError};
use crate::extract::DocumentFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Markdown produced from one source object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedDocument {
    pub markdown: String,
    /// Number of elements that were joined.
    pub element_count: usize,
}

/// The artifact written to the output location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputObject {
    /// Derived key; a pure function of the source key.
    pub key: String,
    pub content: String,
}

/// Position of an invocation in its linear state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Received,
    Reading,
    Extracting,
    Rendering,
    Publishing,
    Succeeded,
    Failed,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Succeeded | Stage::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Reading => "reading",
            Stage::Extracting => "extracting",
            Stage::Rendering => "rendering",
            Stage::Publishing => "publishing",
            Stage::Succeeded => "succeeded",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Success record for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Converted {
    pub source: String,
    pub output: String,
    pub format: DocumentFormat,
    pub elements: usize,
    pub bytes: usize,
    pub duration_ms: u64,
}

/// Failure record for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failed {
    pub source: String,
    pub kind: ErrorKind,
    /// The stage that was running when the error surfaced.
    pub stage: Stage,
    pub message: String,
    pub duration_ms: u64,
}

impl Failed {
    pub(crate) fn from_error(source: &str, stage: Stage, err: &PipelineError, duration_ms: u64) -> Self {
        Self {
            source: source.to_string(),
            kind: err.kind(),
            stage,
            message: err.cause(),
            duration_ms,
        }
    }
}

/// Terminal state of one invocation. Never an `Err`: failures are data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InvocationOutcome {
    Succeeded(Converted),
    Failed(Failed),
}

impl InvocationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationOutcome::Succeeded(_))
    }

    pub fn source(&self) -> &str {
        match self {
            InvocationOutcome::Succeeded(c) => &c.source,
            InvocationOutcome::Failed(f) => &f.source,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            InvocationOutcome::Succeeded(_) => Stage::Succeeded,
            InvocationOutcome::Failed(_) => Stage::Failed,
        }
    }
}
