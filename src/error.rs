//! Error types for the blob2md library.
//!
//! Errors are layered the same way the pipeline is:
//!
//! * [`StorageError`] — a storage collaborator refused a read or a write.
//! * [`ExtractionError`] — the document could not be decomposed into
//!   elements (unknown format, corrupt bytes, no vision model for an image).
//! * [`PipelineError`] — what one invocation failed with. It wraps one of the
//!   two above and records *which step* failed, which is what the
//!   [`ErrorKind`] taxonomy reports in the failure log record.
//! * [`ConfigError`] — raised while building a [`crate::PipelineConfig`],
//!   before any event is handled.
//! * [`EventError`] — one line of an event feed was unusable; the line is
//!   skipped.
//!
//! A `PipelineError` never escapes [`crate::Pipeline::handle`]; it is turned
//! into a [`crate::output::Failed`] record for that event only.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by an [`crate::storage::ObjectStore`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// No object exists under this key.
    #[error("object '{key}' not found in {location}")]
    NotFound { key: String, location: String },

    /// Credentials were rejected or lack the required permission.
    #[error("access to '{key}' denied by {location}: {detail}")]
    PermissionDenied {
        key: String,
        location: String,
        detail: String,
    },

    /// A write with `overwrite = false` hit an existing object.
    #[error("object '{key}' already exists in {location}")]
    AlreadyExists { key: String, location: String },

    /// The key cannot name an object (empty, directory-like, escapes the root).
    #[error("invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// The storage service answered with an unexpected HTTP status.
    #[error("storage request for '{key}' failed with HTTP {status}: {detail}")]
    Http {
        key: String,
        status: u16,
        detail: String,
    },

    /// The request never got an answer (DNS, TLS, connection reset, timeout).
    #[error("storage transport error for '{key}': {detail}")]
    Transport { key: String, detail: String },

    /// Local filesystem error.
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures raised while turning bytes into [`crate::document::Element`]s.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Zero-length input.
    #[error("'{name}' is empty; there is no content to extract")]
    EmptyInput { name: String },

    /// Neither the content nor the filename identified a supported format.
    #[error("unsupported document format for '{name}'{}", hint_suffix(.hint))]
    UnsupportedFormat { name: String, hint: Option<String> },

    /// The format was recognised but the content could not be parsed.
    #[error("{format} content is corrupt or unparseable: {detail}")]
    Corrupt { format: String, detail: String },

    /// The document is password protected.
    #[error("{format} document is encrypted and cannot be read without a password")]
    Encrypted { format: String },

    /// The native pdfium library could not be bound.
    #[error(
        "failed to bind to the pdfium library: {0}\n\
Set PDFIUM_LIB_PATH to the directory containing libpdfium, or install it system-wide."
    )]
    PdfiumUnavailable(String),

    /// An image (or scanned page) needs a vision model but none is configured.
    #[error("{what} requires a vision model but no provider is configured")]
    VisionUnavailable { what: String },

    /// The vision model failed after all retries.
    #[error("vision model failed on {what} after {retries} retries: {detail}")]
    VisionFailed {
        what: String,
        retries: u32,
        detail: String,
    },

    /// Unexpected internal failure (blocking task panicked, etc.).
    #[error("internal extraction error: {0}")]
    Internal(String),
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(h) => format!(" ({h})"),
        None => String::new(),
    }
}

impl ExtractionError {
    pub(crate) fn corrupt(format: impl fmt::Display, detail: impl fmt::Display) -> Self {
        ExtractionError::Corrupt {
            format: format.to_string(),
            detail: detail.to_string(),
        }
    }
}

/// The error taxonomy reported in failure records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// The source object could not be read.
    ReadError,
    /// The format was undetectable or the content unparseable.
    ExtractionError,
    /// The output object could not be written.
    PublishError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ReadError => "ReadError",
            ErrorKind::ExtractionError => "ExtractionError",
            ErrorKind::PublishError => "PublishError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single invocation ended in the `Failed` state.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read source '{key}': {source}")]
    Read {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to extract content from '{key}': {source}")]
    Extraction {
        key: String,
        #[source]
        source: ExtractionError,
    },

    #[error("failed to publish '{key}': {source}")]
    Publish {
        key: String,
        #[source]
        source: StorageError,
    },
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Read { .. } => ErrorKind::ReadError,
            PipelineError::Extraction { .. } => ErrorKind::ExtractionError,
            PipelineError::Publish { .. } => ErrorKind::PublishError,
        }
    }

    /// The message of the underlying cause, without the step prefix.
    pub fn cause(&self) -> String {
        match self {
            PipelineError::Read { source, .. } | PipelineError::Publish { source, .. } => {
                source.to_string()
            }
            PipelineError::Extraction { source, .. } => source.to_string(),
        }
    }
}

/// Configuration was rejected before the pipeline was built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid storage connection '{input}': {reason}")]
    InvalidConnection { input: String, reason: String },

    #[error(
        "unsupported storage connection: {0}\n\
Use a container URL or a connection string carrying a SharedAccessSignature."
    )]
    UnsupportedConnection(String),

    #[error("input and output locations must differ (both are {0})")]
    SameLocation(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    /// A vision provider was named but could not be created.
    #[error("vision provider '{provider}' is not configured: {hint}")]
    VisionProvider { provider: String, hint: String },
}

/// A line on the event feed could not be turned into a storage event.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("invalid event JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event carries no object key (expected 'key', 'subject' or 'url')")]
    MissingKey,

    #[error("event {field} '{value}' does not name an object")]
    NotAnObject { field: &'static str, value: String },
}
