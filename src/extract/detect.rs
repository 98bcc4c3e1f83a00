//! Format detection: magic bytes first, then the filename, then text sniffing.
//!
//! The filename is advisory. A `.txt` object that is really a PDF is read as a
//! PDF; a `.pdf` object that carries no PDF header is still routed to the PDF
//! parser, which reports it as corrupt rather than silently treating it as
//! text. Text sniffing understands UTF-16 with a byte-order mark and legacy
//! single-byte code pages, not only UTF-8.

use super::DocumentFormat;
use crate::error::ExtractionError;
use std::io::{Cursor, Read};
use tracing::debug;

/// The PDF header may be preceded by binary junk; readers accept it in the
/// first KiB.
const PDF_HEADER_WINDOW: usize = 1024;
const PDF_MAGIC: &[u8] = b"%PDF-";
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const OLE2_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// What the first bytes say about the content.
enum Magic {
    Format(DocumentFormat),
    Zip,
    Ole2,
}

/// Detect the format of `bytes`, using `name` only where content is ambiguous.
pub fn detect(bytes: &[u8], name: &str) -> Result<DocumentFormat, ExtractionError> {
    let by_name = extension(name).and_then(|ext| DocumentFormat::from_extension(&ext));

    // ── Step 1: Magic bytes ──────────────────────────────────────────────
    match sniff_magic(bytes) {
        Some(Magic::Format(format)) => return Ok(format),
        Some(Magic::Zip) => {
            if let Some(format) = inspect_zip(bytes) {
                return Ok(format);
            }
            debug!("'{}' is a ZIP archive without a known document layout", name);
            return match by_name {
                Some(format) if !format.is_textual() => Ok(format),
                _ => Err(unsupported(name, "ZIP archive")),
            };
        }
        Some(Magic::Ole2) => {
            // Password-protected OOXML files are OLE2 containers too; their
            // parsers report them as encrypted.
            return match by_name {
                Some(
                    format @ (DocumentFormat::Xls
                    | DocumentFormat::Xlsx
                    | DocumentFormat::Docx
                    | DocumentFormat::Pptx),
                ) => Ok(format),
                _ => Err(unsupported(name, "legacy OLE2 Office document")),
            };
        }
        None => {}
    }

    // ── Step 2: Binary format claimed by the filename ────────────────────
    if let Some(format) = by_name.filter(|f| !f.is_textual()) {
        debug!("No magic bytes for '{}'; trusting extension ({})", name, format);
        return Ok(format);
    }

    // ── Step 3: Text ─────────────────────────────────────────────────────
    if let Some(text) = super::encoding::decode(bytes) {
        if let Some(format) = by_name {
            return Ok(format);
        }
        return Ok(sniff_markup(&text).unwrap_or(DocumentFormat::Text));
    }

    Err(match extension(name) {
        Some(ext) => unsupported(name, &format!("extension '.{ext}'")),
        None => unsupported(name, "binary content"),
    })
}

fn unsupported(name: &str, hint: &str) -> ExtractionError {
    ExtractionError::UnsupportedFormat {
        name: name.to_string(),
        hint: Some(hint.to_string()),
    }
}

/// Lowercased extension of the last path segment, if any.
fn extension(name: &str) -> Option<String> {
    let base = crate::pipeline::naming::base_name(name);
    let stem = crate::pipeline::naming::strip_last_extension(base);
    if stem.len() == base.len() {
        return None;
    }
    let ext = &base[stem.len() + 1..];
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

fn sniff_magic(bytes: &[u8]) -> Option<Magic> {
    if has_pdf_header(bytes) {
        return Some(Magic::Format(DocumentFormat::Pdf));
    }

    let format = if bytes.starts_with(PNG_MAGIC) {
        DocumentFormat::Png
    } else if bytes.starts_with(JPEG_MAGIC) {
        DocumentFormat::Jpeg
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        DocumentFormat::Gif
    } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        DocumentFormat::Tiff
    } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        DocumentFormat::Webp
    } else if is_bmp(bytes) {
        DocumentFormat::Bmp
    } else if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(ZIP_EMPTY_MAGIC) {
        return Some(Magic::Zip);
    } else if is_ole2(bytes) {
        return Some(Magic::Ole2);
    } else {
        return None;
    };
    Some(Magic::Format(format))
}

/// `%PDF-` at the start, or later in the first KiB behind whitespace or
/// binary bytes. Prose that merely mentions the header is not a PDF.
fn has_pdf_header(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
    let Some(offset) = head.windows(PDF_MAGIC.len()).position(|w| w == PDF_MAGIC) else {
        return false;
    };
    let prefix = &head[..offset];
    prefix.iter().all(u8::is_ascii_whitespace)
        || prefix
            .iter()
            .any(|&b| b == 0 || (b.is_ascii_control() && !b.is_ascii_whitespace()))
}

/// `BM` alone matches ordinary text; also require the zeroed reserved words
/// and a header long enough for a DIB header size.
fn is_bmp(bytes: &[u8]) -> bool {
    bytes.len() >= 26 && bytes.starts_with(b"BM") && bytes[6..10] == [0, 0, 0, 0]
}

/// Identify an office container by the entries it carries.
fn inspect_zip(bytes: &[u8]) -> Option<DocumentFormat> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).ok()?;

    let has = |entry: &str| archive.file_names().any(|n| n == entry);
    let by_layout = if has("word/document.xml") {
        Some(DocumentFormat::Docx)
    } else if has("ppt/presentation.xml") {
        Some(DocumentFormat::Pptx)
    } else if has("xl/workbook.xml") {
        Some(DocumentFormat::Xlsx)
    } else {
        None
    };
    if by_layout.is_some() {
        return by_layout;
    }

    let mut mimetype = String::new();
    archive
        .by_name("mimetype")
        .ok()?
        .take(256)
        .read_to_string(&mut mimetype)
        .ok()?;
    match mimetype.trim() {
        "application/vnd.oasis.opendocument.text" => Some(DocumentFormat::Odt),
        "application/vnd.oasis.opendocument.presentation" => Some(DocumentFormat::Odp),
        "application/vnd.oasis.opendocument.spreadsheet" => Some(DocumentFormat::Ods),
        _ => None,
    }
}

/// Compound-file container (legacy Office, or encrypted OOXML).
pub(crate) fn is_ole2(bytes: &[u8]) -> bool {
    bytes.starts_with(OLE2_MAGIC)
}

/// Tell HTML and XML apart from other text by their opening tags.
fn sniff_markup(text: &str) -> Option<DocumentFormat> {
    let head: String = text.chars().take(1024).collect::<String>().to_ascii_lowercase();
    let head = head.trim_start();

    if head.starts_with("<!doctype html") || head.starts_with("<html") {
        return Some(DocumentFormat::Html);
    }
    if head.starts_with("<?xml") {
        return Some(if head.contains("<html") {
            DocumentFormat::Html
        } else {
            DocumentFormat::Xml
        });
    }
    if head.starts_with('<') && head.contains("</") {
        return Some(if head.contains("<body") || head.contains("<head") {
            DocumentFormat::Html
        } else {
            DocumentFormat::Xml
        });
    }
    None
}
