//! PDF integration tests against the native pdfium library.
//!
//! Gated behind the `BLOB2MD_PDFIUM_TESTS` environment variable because they
//! need libpdfium at runtime. Point `PDFIUM_LIB_PATH` at the library (or its
//! directory) unless it is installed system-wide.
//!
//! Run with:
//!   BLOB2MD_PDFIUM_TESTS=1 PDFIUM_LIB_PATH=/opt/pdfium/lib cargo test --test pdf -- --nocapture

use blob2md::{
    DocumentFormat, ExtractionConfig, ExtractionError, Extractor, InvocationOutcome, MemoryStore,
    Pipeline, StorageEvent,
};
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless BLOB2MD_PDFIUM_TESTS is set.
macro_rules! pdfium_skip_unless_enabled {
    () => {{
        if std::env::var("BLOB2MD_PDFIUM_TESTS").is_err() {
            println!("SKIP — set BLOB2MD_PDFIUM_TESTS=1 to run pdfium tests");
            return;
        }
    }};
}

fn extractor() -> Extractor {
    let config = ExtractionConfig {
        vision_enabled: false,
        pdfium_library_path: std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from),
        ..Default::default()
    };
    Extractor::new(&config).unwrap()
}

/// A PDF with one page per entry: `Some(text)` draws one line of Helvetica,
/// `None` leaves the page without a text layer.
fn build_pdf(pages: &[Option<&str>]) -> Vec<u8> {
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        String::new(), // page tree, filled in below
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    let mut kids = Vec::new();
    for text in pages {
        let page_id = objects.len() + 1;
        let content_id = page_id + 1;
        kids.push(format!("{page_id} 0 R"));
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {content_id} 0 R >>"
        ));
        let stream = match text {
            Some(t) => format!("BT /F1 24 Tf 72 700 Td ({t}) Tj ET"),
            None => String::new(),
        };
        objects.push(format!(
            "<< /Length {} >>\nstream\n{stream}\nendstream",
            stream.len()
        ));
    }
    objects[1] = format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        pages.len()
    );

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }
    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    out
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn text_layer_is_extracted_page_by_page() {
    pdfium_skip_unless_enabled!();

    let bytes = build_pdf(&[Some("Quarterly summary"), Some("Revenue grew steadily")]);
    let extraction = extractor().extract(Arc::from(bytes), "summary.pdf").await.unwrap();

    assert_eq!(extraction.format, DocumentFormat::Pdf);
    let texts: Vec<_> = extraction.elements.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, vec!["Quarterly summary", "Revenue grew steadily"]);
}

#[tokio::test]
async fn pages_without_text_are_skipped_without_vision() {
    pdfium_skip_unless_enabled!();

    let bytes = build_pdf(&[None, Some("Only this page has text"), None]);
    let extraction = extractor().extract(Arc::from(bytes), "mixed.pdf").await.unwrap();

    assert_eq!(extraction.elements.len(), 1);
    assert_eq!(extraction.elements[0].text, "Only this page has text");
}

#[tokio::test]
async fn broken_pdf_is_corrupt() {
    pdfium_skip_unless_enabled!();

    let err = extractor()
        .extract(Arc::from(b"%PDF-1.7\nthis is not a pdf at all".to_vec()), "broken.pdf")
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractionError::Corrupt { .. }), "{err:?}");
}

#[tokio::test]
async fn pdf_source_is_published_through_the_pipeline() {
    pdfium_skip_unless_enabled!();

    let input = MemoryStore::new("input-files");
    let output = MemoryStore::new("output-files");
    input.insert("scans/2024/minutes.pdf", build_pdf(&[Some("Meeting minutes")]));
    let pipeline = Pipeline::with_stores(
        Arc::new(input),
        Arc::new(output.clone()),
        extractor(),
    );

    let outcome = pipeline
        .handle(&StorageEvent::new("scans/2024/minutes.pdf"))
        .await;
    assert!(
        matches!(outcome, InvocationOutcome::Succeeded(ref c) if c.format == DocumentFormat::Pdf),
        "{outcome:?}"
    );
    assert_eq!(output.get_string("minutes.md").as_deref(), Some("Meeting minutes"));
}
