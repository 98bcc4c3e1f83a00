//! PDF extraction via pdfium: the text layer of each page, plus vision reads
//! for scanned pages.
//!
//! ## Why a channel between pdfium and the vision model?
//!
//! pdfium is blocking and not async-safe, so pages are read inside
//! `spawn_blocking`. Vision calls are async network I/O. Pages flow from the
//! blocking reader to the async side through a small bounded channel, so only
//! a couple of rendered scans are held in memory at once and a failed vision
//! call stops the reader early.
//!
//! ## Render resolution
//!
//! Scans are rendered at 150 DPI. Page sizes vary wildly (an A0 poster at
//! 150 DPI is 5,000 × 7,000 px), so `max_rendered_pixels` caps the longest
//! edge; small pages are never scaled up to the cap.

use super::text::partition_plain_text;
use super::vision::{transcription_elements, VisionReader};
use super::{Partitioner, PdfSettings};
use crate::document::Element;
use crate::error::ExtractionError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Rendered pages buffered between the pdfium thread and the vision calls.
const PAGE_BUFFER: usize = 2;

/// Resolution scanned pages are rendered at before the pixel cap applies.
const OCR_DPI: f32 = 150.0;
/// PDF user space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// What one page contributed.
enum PageContent {
    Text(String),
    Scan(DynamicImage),
    /// No text layer and nothing to read it with.
    Skipped,
}

struct Page {
    number: usize,
    content: PageContent,
}

pub(crate) struct PdfPartitioner {
    settings: PdfSettings,
    vision: Option<Arc<VisionReader>>,
    name: String,
}

impl PdfPartitioner {
    pub(crate) fn new(settings: PdfSettings, vision: Option<Arc<VisionReader>>, name: &str) -> Self {
        Self {
            settings,
            vision,
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Partitioner for PdfPartitioner {
    async fn partition(&self, bytes: Arc<[u8]>) -> Result<Vec<Element>, ExtractionError> {
        let settings = self.settings.clone();
        let render_scans = settings.ocr_scanned_pages && self.vision.is_some();
        let (tx, mut rx) = mpsc::channel::<Page>(PAGE_BUFFER);

        let reader =
            tokio::task::spawn_blocking(move || read_pages(&bytes, &settings, render_scans, &tx));

        let mut elements = Vec::new();
        let mut skipped = 0usize;
        while let Some(page) = rx.recv().await {
            match page.content {
                PageContent::Text(text) => elements.extend(partition_plain_text(&text)),
                PageContent::Scan(image) => {
                    // Only rendered when a reader exists.
                    let Some(vision) = self.vision.as_ref() else {
                        continue;
                    };
                    let what = format!("page {} of '{}'", page.number, self.name);
                    let text = vision.read(&image, &what).await?;
                    elements.extend(transcription_elements(&text));
                }
                PageContent::Skipped => skipped += 1,
            }
        }

        reader
            .await
            .map_err(|e| ExtractionError::Internal(format!("PDF reader task panicked: {e}")))??;

        if skipped > 0 {
            warn!(
                "'{}': skipped {} page(s) without a text layer (no vision model for OCR)",
                self.name, skipped
            );
        }
        Ok(elements)
    }
}

/// Bind pdfium, either from a configured location or the system library.
///
/// `path` may name the library file itself or the directory holding it.
fn bind_pdfium(path: Option<&Path>) -> Result<Pdfium, ExtractionError> {
    let bindings = match path {
        Some(p) if p.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(p))
        }
        Some(p) => Pdfium::bind_to_library(p),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ExtractionError::PdfiumUnavailable(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Blocking half: load the document and send each page's content in order.
fn read_pages(
    bytes: &[u8],
    settings: &PdfSettings,
    render_scans: bool,
    tx: &mpsc::Sender<Page>,
) -> Result<(), ExtractionError> {
    let pdfium = bind_pdfium(settings.library_path.as_deref())?;

    let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
        let detail = format!("{e:?}");
        if detail.contains("Password") || detail.contains("password") {
            ExtractionError::Encrypted {
                format: "PDF".to_string(),
            }
        } else {
            ExtractionError::corrupt("PDF", detail)
        }
    })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let render_config = scan_render_config(settings.max_rendered_pixels);

    for (idx, page) in pages.iter().enumerate() {
        let number = idx + 1;
        let text = page
            .text()
            .map_err(|e| ExtractionError::corrupt("PDF", format!("page {number}: {e:?}")))?
            .all();

        let content = if !text.trim().is_empty() {
            PageContent::Text(text)
        } else if render_scans {
            let image = page
                .render_with_config(&render_config)
                .map_err(|e| ExtractionError::corrupt("PDF", format!("page {number}: {e:?}")))?
                .as_image();
            debug!(
                "Page {} has no text layer; rendered {}x{} px for OCR",
                number,
                image.width(),
                image.height()
            );
            PageContent::Scan(image)
        } else {
            PageContent::Skipped
        };

        if tx.blocking_send(Page { number, content }).is_err() {
            // The receiver gave up (vision failure); stop reading.
            debug!("PDF page consumer closed after page {}", number);
            break;
        }
    }
    Ok(())
}

/// 150 DPI, with neither edge above `max_px`.
fn scan_render_config(max_px: u32) -> PdfRenderConfig {
    let max_px = i32::try_from(max_px).unwrap_or(i32::MAX);
    PdfRenderConfig::new()
        .scale_page_by_factor(OCR_DPI / POINTS_PER_INCH)
        .set_maximum_width(max_px)
        .set_maximum_height(max_px)
}
