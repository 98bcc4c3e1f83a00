//! Content extraction: raw bytes + advisory filename → ordered elements.
//!
//! ## Why one partitioner per format family?
//!
//! Callers must not care which handler read a document. [`Extractor::extract`]
//! detects the format (see [`detect`]) and hands the bytes to the
//! [`Partitioner`] for that family. Every partitioner returns the same thing:
//! an ordered `Vec<Element>` whose texts are trimmed and non-empty.
//!
//! ```text
//! bytes ──▶ detect ──▶ Partitioner ──▶ Vec<Element>
//!            │
//!            ├─ PDF           pdfium text layer (+ vision for scanned pages)
//!            ├─ DOCX / PPTX   zip + quick-xml
//!            ├─ ODT / ODP     zip + quick-xml
//!            ├─ XLSX/XLS/ODS  calamine
//!            ├─ HTML / XML    scraper / quick-xml
//!            ├─ Markdown, CSV, plain text
//!            └─ images        vision model
//! ```
//!
//! Parsers that do CPU-bound work run inside `spawn_blocking`.
//!
//! Extraction has no side effects beyond reading the bytes it is given; the
//! only network traffic is the vision model call for image content.

pub mod detect;
mod encoding;
mod html;
mod office;
mod opendocument;
mod pdf;
mod raster;
mod spreadsheet;
mod text;
pub mod vision;

use crate::config::ExtractionConfig;
use crate::document::Element;
use crate::error::{ConfigError, ExtractionError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use vision::VisionReader;

/// Every format the extractor can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Pptx,
    Odt,
    Odp,
    Xlsx,
    Xls,
    Ods,
    Html,
    Xml,
    Markdown,
    Csv,
    Tsv,
    Text,
    Png,
    Jpeg,
    Gif,
    Tiff,
    Bmp,
    Webp,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "PDF",
            DocumentFormat::Docx => "DOCX",
            DocumentFormat::Pptx => "PPTX",
            DocumentFormat::Odt => "ODT",
            DocumentFormat::Odp => "ODP",
            DocumentFormat::Xlsx => "XLSX",
            DocumentFormat::Xls => "XLS",
            DocumentFormat::Ods => "ODS",
            DocumentFormat::Html => "HTML",
            DocumentFormat::Xml => "XML",
            DocumentFormat::Markdown => "Markdown",
            DocumentFormat::Csv => "CSV",
            DocumentFormat::Tsv => "TSV",
            DocumentFormat::Text => "text",
            DocumentFormat::Png => "PNG",
            DocumentFormat::Jpeg => "JPEG",
            DocumentFormat::Gif => "GIF",
            DocumentFormat::Tiff => "TIFF",
            DocumentFormat::Bmp => "BMP",
            DocumentFormat::Webp => "WebP",
        }
    }

    /// Map a lowercase file extension (no dot) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        Some(match ext {
            "pdf" => DocumentFormat::Pdf,
            "docx" | "docm" => DocumentFormat::Docx,
            "pptx" | "pptm" => DocumentFormat::Pptx,
            "odt" => DocumentFormat::Odt,
            "odp" => DocumentFormat::Odp,
            "xlsx" | "xlsm" => DocumentFormat::Xlsx,
            "xls" => DocumentFormat::Xls,
            "ods" => DocumentFormat::Ods,
            "html" | "htm" | "xhtml" => DocumentFormat::Html,
            "xml" => DocumentFormat::Xml,
            "md" | "markdown" => DocumentFormat::Markdown,
            "csv" => DocumentFormat::Csv,
            "tsv" | "tab" => DocumentFormat::Tsv,
            "txt" | "text" | "log" | "eml" | "rst" | "org" => DocumentFormat::Text,
            "png" => DocumentFormat::Png,
            "jpg" | "jpeg" => DocumentFormat::Jpeg,
            "gif" => DocumentFormat::Gif,
            "tif" | "tiff" => DocumentFormat::Tiff,
            "bmp" => DocumentFormat::Bmp,
            "webp" => DocumentFormat::Webp,
            _ => return None,
        })
    }

    /// Whether the content is a raster image read by the vision model.
    pub fn is_image(&self) -> bool {
        matches!(
            self,
            DocumentFormat::Png
                | DocumentFormat::Jpeg
                | DocumentFormat::Gif
                | DocumentFormat::Tiff
                | DocumentFormat::Bmp
                | DocumentFormat::Webp
        )
    }

    /// Whether the format is a text format (decoded from UTF-8).
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            DocumentFormat::Html
                | DocumentFormat::Xml
                | DocumentFormat::Markdown
                | DocumentFormat::Csv
                | DocumentFormat::Tsv
                | DocumentFormat::Text
        )
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub format: DocumentFormat,
    pub elements: Vec<Element>,
}

/// One format family's decomposition of bytes into elements.
#[async_trait]
pub trait Partitioner: Send + Sync {
    async fn partition(&self, bytes: Arc<[u8]>) -> Result<Vec<Element>, ExtractionError>;
}

/// Run a synchronous parser on the blocking pool.
pub(crate) async fn blocking<F>(bytes: Arc<[u8]>, parse: F) -> Result<Vec<Element>, ExtractionError>
where
    F: FnOnce(&[u8]) -> Result<Vec<Element>, ExtractionError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || parse(&bytes))
        .await
        .map_err(|e| ExtractionError::Internal(format!("extraction task panicked: {e}")))?
}

/// Settings the PDF partitioner needs.
#[derive(Debug, Clone)]
pub(crate) struct PdfSettings {
    pub library_path: Option<PathBuf>,
    pub ocr_scanned_pages: bool,
    pub max_rendered_pixels: u32,
}

/// Format-agnostic entry point.
///
/// Cheap to clone; the vision provider is shared read-only between clones.
#[derive(Clone)]
pub struct Extractor {
    vision: Option<Arc<VisionReader>>,
    pdf: PdfSettings,
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("vision", &self.vision.is_some())
            .field("pdf", &self.pdf)
            .finish()
    }
}

impl Default for Extractor {
    /// No vision model, system pdfium.
    fn default() -> Self {
        let defaults = ExtractionConfig::default();
        Self {
            vision: None,
            pdf: PdfSettings {
                library_path: None,
                ocr_scanned_pages: defaults.ocr_scanned_pages,
                max_rendered_pixels: defaults.max_rendered_pixels,
            },
        }
    }
}

impl Extractor {
    /// Build an extractor, resolving the vision provider from `config`.
    pub fn new(config: &ExtractionConfig) -> Result<Self, ConfigError> {
        let vision = vision::resolve_provider(config)?
            .map(|provider| Arc::new(VisionReader::new(provider, config)));
        Ok(Self {
            vision,
            pdf: PdfSettings {
                library_path: config.pdfium_library_path.clone(),
                ocr_scanned_pages: config.ocr_scanned_pages,
                max_rendered_pixels: config.max_rendered_pixels,
            },
        })
    }

    /// Whether images and scanned pages can be read.
    pub fn has_vision(&self) -> bool {
        self.vision.is_some()
    }

    /// Decompose `bytes` into elements. `name` is advisory: it is used only
    /// when the content alone does not identify the format.
    pub async fn extract(
        &self,
        bytes: Arc<[u8]>,
        name: &str,
    ) -> Result<Extraction, ExtractionError> {
        if bytes.is_empty() {
            return Err(ExtractionError::EmptyInput {
                name: name.to_string(),
            });
        }

        let format = detect::detect(&bytes, name)?;
        debug!("Detected {} for '{}' ({} bytes)", format, name, bytes.len());

        let start = Instant::now();
        let elements = self.partitioner(format, name).partition(bytes).await?;
        debug!(
            "Partitioned '{}' into {} elements in {}ms",
            name,
            elements.len(),
            start.elapsed().as_millis()
        );

        Ok(Extraction { format, elements })
    }

    fn partitioner(&self, format: DocumentFormat, name: &str) -> Box<dyn Partitioner> {
        match format {
            DocumentFormat::Pdf => Box::new(pdf::PdfPartitioner::new(
                self.pdf.clone(),
                self.vision.clone(),
                name,
            )),
            DocumentFormat::Docx => Box::new(office::DocxPartitioner),
            DocumentFormat::Pptx => Box::new(office::PptxPartitioner),
            DocumentFormat::Odt | DocumentFormat::Odp => {
                Box::new(opendocument::OpenDocumentPartitioner { format })
            }
            DocumentFormat::Xlsx | DocumentFormat::Xls | DocumentFormat::Ods => {
                Box::new(spreadsheet::SpreadsheetPartitioner { format })
            }
            DocumentFormat::Html => Box::new(html::HtmlPartitioner),
            DocumentFormat::Xml => Box::new(text::XmlPartitioner),
            DocumentFormat::Markdown => Box::new(text::MarkdownPartitioner),
            DocumentFormat::Csv => Box::new(text::DelimitedPartitioner { delimiter: b',' }),
            DocumentFormat::Tsv => Box::new(text::DelimitedPartitioner { delimiter: b'\t' }),
            DocumentFormat::Text => Box::new(text::TextPartitioner),
            DocumentFormat::Png
            | DocumentFormat::Jpeg
            | DocumentFormat::Gif
            | DocumentFormat::Tiff
            | DocumentFormat::Bmp
            | DocumentFormat::Webp => Box::new(raster::ImagePartitioner::new(
                format,
                self.vision.clone(),
                self.pdf.max_rendered_pixels,
                name,
            )),
        }
    }
}

/// Decode bytes as text in whatever encoding they carry (UTF-8, UTF-16 with
/// a byte-order mark, legacy code pages). The BOM is dropped.
pub(crate) fn decode_text(
    bytes: &[u8],
    format: DocumentFormat,
) -> Result<Cow<'_, str>, ExtractionError> {
    encoding::decode(bytes)
        .ok_or_else(|| ExtractionError::corrupt(format, "content is not text in any known encoding"))
}

/// Join a table's cells with ` | ` and its rows with newlines. Rows whose
/// cells are all blank are dropped.
pub(crate) fn table_text<R, C>(rows: R) -> String
where
    R: IntoIterator<Item = Vec<C>>,
    C: AsRef<str>,
{
    rows.into_iter()
        .filter(|row| row.iter().any(|c| !c.as_ref().trim().is_empty()))
        .map(|row| {
            row.iter()
                .map(|c| crate::document::collapse_whitespace(c.as_ref()))
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
