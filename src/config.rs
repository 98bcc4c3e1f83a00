//! Configuration types for the conversion pipeline.
//!
//! Everything the pipeline needs from its hosting environment is collected in
//! [`PipelineConfig`], built via [`PipelineConfigBuilder`] and handed to
//! [`crate::Pipeline::new`]. Nothing is read from the process environment
//! here; the binary maps its flags and environment variables onto the builder.

use crate::error::ConfigError;
use edgequake_llm::LLMProvider;
use reqwest::Url;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Container sources are read from by default.
pub const DEFAULT_INPUT_CONTAINER: &str = "input-files";
/// Container Markdown is published to by default.
pub const DEFAULT_OUTPUT_CONTAINER: &str = "output-files";

// ── Storage ──────────────────────────────────────────────────────────────

/// How to reach a storage account.
#[derive(Clone, PartialEq, Eq)]
pub enum StorageConnection {
    /// Containers are subdirectories of `root`.
    Local { root: PathBuf },
    /// Containers live under `endpoint`; `sas` is appended to every request.
    Http { endpoint: Url, sas: Option<String> },
}

impl fmt::Debug for StorageConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageConnection::Local { root } => {
                f.debug_struct("Local").field("root", root).finish()
            }
            StorageConnection::Http { endpoint, sas } => f
                .debug_struct("Http")
                .field("endpoint", &endpoint.as_str())
                .field("sas", &sas.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

impl StorageConnection {
    /// Parse a connection string.
    ///
    /// Accepted forms:
    /// * `/data/storage`, `./storage`, `file:///data/storage`
    /// * `https://acct.blob.core.windows.net/` (optionally `?<sas>`)
    /// * `BlobEndpoint=https://acct.blob.core.windows.net/;SharedAccessSignature=sv=...`
    ///
    /// Account-key connection strings need request signing and are rejected.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(ConfigError::InvalidConnection {
                input: String::new(),
                reason: "connection string is empty".to_string(),
            });
        }

        if let Some(path) = s.strip_prefix("file://") {
            return Ok(StorageConnection::Local {
                root: PathBuf::from(path),
            });
        }

        if s.starts_with("http://") || s.starts_with("https://") {
            let url = Url::parse(s).map_err(|e| ConfigError::InvalidConnection {
                input: redact(s),
                reason: e.to_string(),
            })?;
            let sas = url.query().map(str::to_string);
            let mut endpoint = url;
            endpoint.set_query(None);
            return Ok(StorageConnection::Http { endpoint, sas });
        }

        if (s.contains('=') && s.contains(';')) || s.starts_with("BlobEndpoint=") {
            return parse_account_string(s);
        }

        Ok(StorageConnection::Local {
            root: PathBuf::from(s),
        })
    }

    fn describe(&self) -> String {
        match self {
            StorageConnection::Local { root } => root.display().to_string(),
            StorageConnection::Http { endpoint, .. } => endpoint.to_string(),
        }
    }
}

fn parse_account_string(s: &str) -> Result<StorageConnection, ConfigError> {
    let mut endpoint = None;
    let mut sas = None;
    let mut has_key = false;

    for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((k, v)) = part.split_once('=') else {
            return Err(ConfigError::InvalidConnection {
                input: redact(s),
                reason: format!("segment without '=': {part}"),
            });
        };
        match k.trim().to_ascii_lowercase().as_str() {
            "blobendpoint" => endpoint = Some(v.trim().to_string()),
            "sharedaccesssignature" => sas = Some(v.trim().to_string()),
            "accountkey" => has_key = true,
            _ => {}
        }
    }

    let Some(sas) = sas else {
        return Err(if has_key {
            ConfigError::UnsupportedConnection("account-key connection strings".to_string())
        } else {
            ConfigError::InvalidConnection {
                input: redact(s),
                reason: "missing SharedAccessSignature".to_string(),
            }
        });
    };
    let Some(endpoint) = endpoint else {
        return Err(ConfigError::InvalidConnection {
            input: redact(s),
            reason: "missing BlobEndpoint".to_string(),
        });
    };

    let endpoint = Url::parse(&endpoint).map_err(|e| ConfigError::InvalidConnection {
        input: redact(s),
        reason: format!("BlobEndpoint: {e}"),
    })?;

    Ok(StorageConnection::Http {
        endpoint,
        sas: Some(sas.trim_start_matches('?').to_string()),
    })
}

/// Drop anything that looks like a credential before echoing input back.
fn redact(s: &str) -> String {
    let cut = [s.find('?'), s.find("SharedAccessSignature"), s.find("AccountKey")]
        .into_iter()
        .flatten()
        .min();
    match cut {
        Some(i) => format!("{}<redacted>", &s[..i]),
        None => s.to_string(),
    }
}

/// One container reachable through a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLocation {
    pub connection: StorageConnection,
    pub container: String,
}

impl StorageLocation {
    pub fn new(connection: StorageConnection, container: impl Into<String>) -> Self {
        Self {
            connection,
            container: container.into(),
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "{}/{}",
            self.connection.describe().trim_end_matches('/'),
            self.container
        )
    }
}

// ── Extraction ───────────────────────────────────────────────────────────

/// Settings for the content extractor.
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Use a vision model for images and scanned PDF pages. Default: true.
    pub vision_enabled: bool,

    /// Pre-built provider; takes priority over `provider_name`/`model`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Provider to instantiate (e.g. `"openai"`). `None` = auto-detect.
    pub provider_name: Option<String>,

    /// Vision model ID. Default (when a provider is named): `gpt-4.1-nano`.
    pub model: Option<String>,

    /// Retries per vision call. Default: 2.
    pub max_retries: u32,

    /// Base backoff between vision retries, doubled each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Sampling temperature for vision calls. Default: 0.1.
    pub temperature: f32,

    /// Maximum output tokens per vision call. Default: 4096.
    pub max_tokens: usize,

    /// Timeout per vision call in seconds. Default: 60.
    pub vision_timeout_secs: u64,

    /// Prompt override for reading text out of images.
    pub vision_prompt: Option<String>,

    /// Send PDF pages without a text layer to the vision model. Default: true.
    pub ocr_scanned_pages: bool,

    /// Longest edge, in pixels, of images sent to the vision model. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Directory containing the pdfium shared library. `None` = system library.
    pub pdfium_library_path: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            vision_enabled: true,
            provider: None,
            provider_name: None,
            model: None,
            max_retries: 2,
            retry_backoff_ms: 500,
            temperature: 0.1,
            max_tokens: 4096,
            vision_timeout_secs: 60,
            vision_prompt: None,
            ocr_scanned_pages: true,
            max_rendered_pixels: 2000,
            pdfium_library_path: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("vision_enabled", &self.vision_enabled)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("vision_timeout_secs", &self.vision_timeout_secs)
            .field("ocr_scanned_pages", &self.ocr_scanned_pages)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .finish()
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────

/// Configuration for a [`crate::Pipeline`].
///
/// # Example
/// ```rust
/// use blob2md::{PipelineConfig, StorageConnection};
///
/// let conn = StorageConnection::parse("/srv/storage").unwrap();
/// let config = PipelineConfig::builder(conn)
///     .input_container("incoming")
///     .output_container("markdown")
///     .vision_enabled(false)
///     .build()
///     .unwrap();
/// assert_eq!(config.input.container, "incoming");
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: StorageLocation,
    pub output: StorageLocation,
    pub extraction: ExtractionConfig,
    /// Timeout for each storage request in seconds. Default: 120.
    pub http_timeout_secs: u64,
}

impl PipelineConfig {
    /// Builder with both locations on `connection` and the default containers.
    pub fn builder(connection: StorageConnection) -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: PipelineConfig {
                input: StorageLocation::new(connection.clone(), DEFAULT_INPUT_CONTAINER),
                output: StorageLocation::new(connection, DEFAULT_OUTPUT_CONTAINER),
                extraction: ExtractionConfig::default(),
                http_timeout_secs: 120,
            },
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn input_container(mut self, container: impl Into<String>) -> Self {
        self.config.input.container = container.into();
        self
    }

    pub fn output_container(mut self, container: impl Into<String>) -> Self {
        self.config.output.container = container.into();
        self
    }

    /// Publish through a different connection than the one sources come from.
    pub fn output_connection(mut self, connection: StorageConnection) -> Self {
        self.config.output.connection = connection;
        self
    }

    pub fn extraction(mut self, extraction: ExtractionConfig) -> Self {
        self.config.extraction = extraction;
        self
    }

    pub fn vision_enabled(mut self, v: bool) -> Self {
        self.config.extraction.vision_enabled = v;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.extraction.provider = Some(provider);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.extraction.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.extraction.model = Some(model.into());
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.extraction.max_retries = n;
        self
    }

    pub fn ocr_scanned_pages(mut self, v: bool) -> Self {
        self.config.extraction.ocr_scanned_pages = v;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.extraction.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.extraction.pdfium_library_path = Some(path.into());
        self
    }

    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.config.http_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        let c = &self.config;
        for (which, loc) in [("input", &c.input), ("output", &c.output)] {
            if loc.container.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{which} container is empty")));
            }
        }
        if c.input == c.output {
            return Err(ConfigError::SameLocation(c.input.describe()));
        }
        if c.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid("HTTP timeout must be ≥ 1s".into()));
        }
        if c.extraction.vision_timeout_secs == 0 {
            return Err(ConfigError::Invalid("vision timeout must be ≥ 1s".into()));
        }
        if !(0.0..=2.0).contains(&c.extraction.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be 0.0–2.0, got {}",
                c.extraction.temperature
            )));
        }
        Ok(self.config)
    }
}
