//! Vision model access: read the text out of an image.
//!
//! Used for raster images and for PDF pages that carry no text layer. The
//! image is PNG-encoded, base64-wrapped and sent to the configured
//! `edgequake-llm` provider together with an OCR prompt. The reply is cleaned
//! of model quirks and then partitioned like any Markdown document.
//!
//! ## Retry Strategy
//!
//! Rate limits (HTTP 429) and overloaded backends (503) are transient.
//! Failed or timed-out calls are retried with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`); with the defaults the waits are
//! 500 ms then 1 s.

use crate::config::ExtractionConfig;
use crate::document::{Element, ElementKind};
use crate::error::{ConfigError, ExtractionError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use image::imageops::FilterType;
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_VISION_MODEL: &str = "gpt-4.1-nano";

/// Default instruction for reading text out of an image.
pub const DEFAULT_OCR_PROMPT: &str = r#"You are a precise OCR engine. Transcribe every piece of text visible in the image.

Rules:
- Keep the reading order a human would follow.
- Use # headings for visible titles and - for bulleted lists.
- Render tables as GFM pipe tables.
- Do not describe pictures, logos or layout; transcribe text only.
- Do not add commentary, and do not wrap the output in code fences.
- If the image contains no text, reply with nothing."#;

/// Resolve the vision provider, from most-specific to least-specific.
///
/// 1. Vision disabled → `None`.
/// 2. Pre-built provider (`config.provider`).
/// 3. Named provider + model (`config.provider_name`).
/// 4. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set.
/// 5. `OPENAI_API_KEY` → OpenAI.
///
/// Anything else resolves to `None`: documents that need no vision model
/// still convert, and images fail with `VisionUnavailable`.
pub fn resolve_provider(
    config: &ExtractionConfig,
) -> Result<Option<Arc<dyn LLMProvider>>, ConfigError> {
    if !config.vision_enabled {
        return Ok(None);
    }

    if let Some(ref provider) = config.provider {
        return Ok(Some(Arc::clone(provider)));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
        return create_provider(name, model).map(Some);
    }

    if let (Ok(provider), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !provider.is_empty() && !model.is_empty() {
            return create_provider(&provider, &model).map(Some);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|key| !key.is_empty()) {
        let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
        return create_provider("openai", model).map(Some);
    }

    debug!("No vision provider configured; images will not be readable");
    Ok(None)
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ConfigError> {
    let provider = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        ConfigError::VisionProvider {
            provider: name.to_string(),
            hint: e.to_string(),
        }
    })?;
    info!("Vision provider: {} ({})", name, model);
    Ok(provider)
}

/// Reads text out of images with a vision language model.
pub struct VisionReader {
    provider: Arc<dyn LLMProvider>,
    prompt: String,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
    call_timeout: Duration,
}

impl VisionReader {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            prompt: config
                .vision_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_OCR_PROMPT.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            call_timeout: Duration::from_secs(config.vision_timeout_secs),
        }
    }

    /// Transcribe `image`. `what` names the image in logs and errors
    /// (e.g. `image 'scan.png'`, `page 3 of 'report.pdf'`).
    ///
    /// Returns cleaned Markdown; an image without text yields an empty string.
    pub async fn read(&self, image: &DynamicImage, what: &str) -> Result<String, ExtractionError> {
        let image_data = encode_image(image)
            .map_err(|e| ExtractionError::Internal(format!("failed to encode {what}: {e}")))?;

        let messages = vec![
            ChatMessage::system(self.prompt.as_str()),
            ChatMessage::user_with_images("", vec![image_data]),
        ];
        let options = self.options();
        let start = Instant::now();
        let mut last_err = String::from("unknown error");

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    what, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(self.call_timeout, self.provider.chat(&messages, Some(&options))).await {
                Ok(Ok(response)) => {
                    debug!(
                        "{}: {} input tokens, {} output tokens, {:?}",
                        what,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(clean_transcription(&response.content));
                }
                Ok(Err(e)) => {
                    warn!("{}: attempt {} failed: {}", what, attempt + 1, e);
                    last_err = e.to_string();
                }
                Err(_) => {
                    warn!(
                        "{}: attempt {} timed out after {:?}",
                        what,
                        attempt + 1,
                        self.call_timeout
                    );
                    last_err = format!("timed out after {:?}", self.call_timeout);
                }
            }
        }

        Err(ExtractionError::VisionFailed {
            what: what.to_string(),
            retries: self.max_retries,
            detail: last_err,
        })
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

/// Encode an image as a base64 PNG for the provider.
///
/// PNG keeps glyph edges crisp; `detail: "high"` lets tiling models see
/// fine print.
fn encode_image(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Shrink `img` so neither edge exceeds `max_px`; smaller images are kept.
pub(crate) fn fit_within(img: DynamicImage, max_px: u32) -> DynamicImage {
    if img.width() <= max_px && img.height() <= max_px {
        return img;
    }
    debug!(
        "Downscaling {}x{} image to fit {}px",
        img.width(),
        img.height(),
        max_px
    );
    img.resize(max_px, max_px, FilterType::Lanczos3)
}

/// Partition a transcription. Paragraphs are tagged as image text; headings,
/// lists and tables keep their Markdown kinds.
pub(crate) fn transcription_elements(markdown: &str) -> Vec<Element> {
    super::text::partition_markdown(markdown)
        .into_iter()
        .map(|mut e| {
            if e.kind == ElementKind::NarrativeText {
                e.kind = ElementKind::ImageText;
            }
            e
        })
        .collect()
}

// ── Transcription cleanup ────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md|text)?\n(.*)\n```\s*$").unwrap());

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Zero-width spaces, joiners, BOM and soft hyphens.
const INVISIBLE: [char; 6] = [
    '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
];

/// Remove the quirks models add around transcriptions. Runs in order:
/// outer fences, line endings, trailing whitespace, blank-line runs,
/// invisible characters.
pub(crate) fn clean_transcription(raw: &str) -> String {
    let s = match RE_OUTER_FENCES.captures(raw.trim()) {
        Some(caps) => caps[1].to_string(),
        None => raw.to_string(),
    };
    let s = s.replace("\r\n", "\n").replace('\r', "\n");
    let s = s
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let s = RE_BLANK_LINES.replace_all(&s, "\n\n");
    s.replace(INVISIBLE, "").trim().to_string()
}
