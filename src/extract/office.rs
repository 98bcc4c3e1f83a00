//! Office Open XML documents: DOCX and PPTX.
//!
//! Both are ZIP containers of XML parts. The parts are streamed with
//! `quick-xml`; only the body text and enough structure to classify
//! paragraphs (styles, numbering, placeholders, bullets, tables) is kept.

use super::detect::is_ole2;
use super::text::xml_text;
use super::{blocking, table_text, DocumentFormat, Partitioner};
use crate::document::{collapse_whitespace, Element};
use crate::error::ExtractionError;
use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::{Cursor, Read};
use std::sync::Arc;
use zip::result::ZipError;
use zip::ZipArchive;

const DOCX_BODY: &str = "word/document.xml";
const PPTX_SLIDE_PREFIX: &str = "ppt/slides/slide";

pub(crate) struct DocxPartitioner;

#[async_trait]
impl Partitioner for DocxPartitioner {
    async fn partition(&self, bytes: Arc<[u8]>) -> Result<Vec<Element>, ExtractionError> {
        blocking(bytes, |b| {
            let mut archive = open_archive(b, DocumentFormat::Docx)?;
            let xml = read_entry(&mut archive, DOCX_BODY, DocumentFormat::Docx)?;
            parse_docx_body(&xml)
        })
        .await
    }
}

pub(crate) struct PptxPartitioner;

#[async_trait]
impl Partitioner for PptxPartitioner {
    async fn partition(&self, bytes: Arc<[u8]>) -> Result<Vec<Element>, ExtractionError> {
        blocking(bytes, partition_pptx).await
    }
}

// ── Shared ZIP helpers ───────────────────────────────────────────────────

pub(super) fn open_archive(
    bytes: &[u8],
    format: DocumentFormat,
) -> Result<ZipArchive<Cursor<&[u8]>>, ExtractionError> {
    if is_ole2(bytes) {
        return Err(ExtractionError::Encrypted {
            format: format.to_string(),
        });
    }
    ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractionError::corrupt(format, e))
}

pub(super) fn read_entry(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
    format: DocumentFormat,
) -> Result<String, ExtractionError> {
    let mut entry = archive.by_name(name).map_err(|e| match e {
        ZipError::FileNotFound => ExtractionError::corrupt(format, format!("missing {name}")),
        ZipError::UnsupportedArchive(msg) if msg.contains("assword") => {
            ExtractionError::Encrypted {
                format: format.to_string(),
            }
        }
        other => ExtractionError::corrupt(format, other),
    })?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| ExtractionError::corrupt(format, format!("{name}: {e}")))?;
    Ok(xml)
}

/// Value of the attribute whose local name is `name`.
pub(super) fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Rows and cells of the table currently being read. Tables nested inside a
/// cell are flattened into that cell's text.
#[derive(Default)]
pub(super) struct TableBuilder {
    depth: usize,
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
}

impl TableBuilder {
    pub(super) fn active(&self) -> bool {
        self.depth > 0
    }

    pub(super) fn open(&mut self) {
        self.depth += 1;
    }

    pub(super) fn push_text(&mut self, text: &str) {
        if !self.cell.is_empty() && !text.is_empty() {
            self.cell.push(' ');
        }
        self.cell.push_str(text);
    }

    pub(super) fn end_cell(&mut self) {
        if self.depth == 1 {
            self.row.push(std::mem::take(&mut self.cell));
        }
    }

    pub(super) fn end_row(&mut self) {
        if self.depth == 1 {
            self.rows.push(std::mem::take(&mut self.row));
        }
    }

    /// Close a table; returns the element when the outermost table ends.
    pub(super) fn close(&mut self) -> Option<Element> {
        self.depth = self.depth.saturating_sub(1);
        if self.depth > 0 {
            return None;
        }
        self.cell.clear();
        self.row.clear();
        Element::table(table_text(std::mem::take(&mut self.rows)))
    }
}

fn corrupt_xml(format: DocumentFormat, part: &str, e: quick_xml::Error) -> ExtractionError {
    ExtractionError::corrupt(format, format!("{part}: {e}"))
}

// ── DOCX ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct DocxParagraph {
    text: String,
    style: Option<String>,
    numbered: bool,
}

impl DocxParagraph {
    fn into_element(self) -> Option<Element> {
        let text = collapse_whitespace(&self.text);
        let style = self.style.unwrap_or_default().to_ascii_lowercase();
        if style.starts_with("heading") || style == "title" || style == "subtitle" {
            Element::title(text)
        } else if self.numbered || style.contains("list") {
            Element::list_item(text)
        } else {
            Element::narrative(text)
        }
    }
}

fn parse_docx_body(xml: &str) -> Result<Vec<Element>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut elements = Vec::new();
    let mut paragraph: Option<DocxParagraph> = None;
    let mut in_text = false;
    let mut table = TableBuilder::default();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| corrupt_xml(DocumentFormat::Docx, DOCX_BODY, e))?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => paragraph = Some(DocxParagraph::default()),
                b"t" => in_text = true,
                b"tbl" => table.open(),
                b"numPr" => {
                    if let Some(p) = paragraph.as_mut() {
                        p.numbered = true;
                    }
                }
                _ => {}
            },
            Event::Empty(e) => {
                let Some(p) = paragraph.as_mut() else {
                    continue;
                };
                match e.local_name().as_ref() {
                    b"pStyle" => p.style = attr(&e, b"val"),
                    b"numPr" => p.numbered = true,
                    b"tab" | b"br" | b"cr" => p.text.push(' '),
                    _ => {}
                }
            }
            Event::Text(t) if in_text => {
                if let Some(p) = paragraph.as_mut() {
                    p.text.push_str(&xml_text(&t));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some(p) = paragraph.take() {
                        if table.active() {
                            table.push_text(&collapse_whitespace(&p.text));
                        } else {
                            elements.extend(p.into_element());
                        }
                    }
                }
                b"tc" => table.end_cell(),
                b"tr" => table.end_row(),
                b"tbl" => elements.extend(table.close()),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(elements)
}

// ── PPTX ─────────────────────────────────────────────────────────────────

fn partition_pptx(bytes: &[u8]) -> Result<Vec<Element>, ExtractionError> {
    let mut archive = open_archive(bytes, DocumentFormat::Pptx)?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix(PPTX_SLIDE_PREFIX)?
                .strip_suffix(".xml")?
                .parse::<u32>()
                .ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort_unstable();

    let mut elements = Vec::new();
    for (_, name) in slides {
        let xml = read_entry(&mut archive, &name, DocumentFormat::Pptx)?;
        elements.extend(parse_slide(&xml, &name)?);
    }
    Ok(elements)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder {
    None,
    Title,
    Body,
    Other,
}

#[derive(Default)]
struct SlideParagraph {
    text: String,
    /// `Some(true)` for an explicit bullet, `Some(false)` for `buNone`.
    bullet: Option<bool>,
    indented: bool,
}

fn parse_slide(xml: &str, part: &str) -> Result<Vec<Element>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut elements = Vec::new();
    let mut placeholder = Placeholder::None;
    let mut title = String::new();
    let mut paragraph: Option<SlideParagraph> = None;
    let mut in_text = false;
    let mut table = TableBuilder::default();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| corrupt_xml(DocumentFormat::Pptx, part, e))?;
        let is_start = matches!(event, Event::Start(_));
        match event {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"sp" => placeholder = Placeholder::None,
                b"ph" => {
                    placeholder = match attr(&e, b"type").as_deref() {
                        Some("title" | "ctrTitle") => Placeholder::Title,
                        None | Some("body" | "obj") => Placeholder::Body,
                        Some(_) => Placeholder::Other,
                    }
                }
                b"p" if is_start => {
                    paragraph = Some(SlideParagraph::default())
                }
                b"pPr" => {
                    if let Some(p) = paragraph.as_mut() {
                        p.indented = attr(&e, b"lvl")
                            .and_then(|l| l.parse::<u32>().ok())
                            .is_some_and(|l| l > 0);
                    }
                }
                b"buChar" | b"buAutoNum" | b"buBlip" => {
                    if let Some(p) = paragraph.as_mut() {
                        p.bullet = Some(true);
                    }
                }
                b"buNone" => {
                    if let Some(p) = paragraph.as_mut() {
                        p.bullet = Some(false);
                    }
                }
                b"t" if is_start => in_text = true,
                b"br" => {
                    if let Some(p) = paragraph.as_mut() {
                        p.text.push(' ');
                    }
                }
                b"tbl" if is_start => table.open(),
                _ => {}
            },
            Event::Text(t) if in_text => {
                if let Some(p) = paragraph.as_mut() {
                    p.text.push_str(&xml_text(&t));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let Some(p) = paragraph.take() else {
                        continue;
                    };
                    let text = collapse_whitespace(&p.text);
                    if table.active() {
                        table.push_text(&text);
                    } else if placeholder == Placeholder::Title {
                        if !title.is_empty() && !text.is_empty() {
                            title.push(' ');
                        }
                        title.push_str(&text);
                    } else {
                        let listed = match p.bullet {
                            Some(explicit) => explicit,
                            None => p.indented || placeholder == Placeholder::Body,
                        };
                        elements.extend(if listed {
                            Element::list_item(text)
                        } else {
                            Element::narrative(text)
                        });
                    }
                }
                b"sp" => {
                    elements.extend(Element::title(std::mem::take(&mut title)));
                    placeholder = Placeholder::None;
                }
                b"tc" => table.end_cell(),
                b"tr" => table.end_row(),
                b"tbl" => elements.extend(table.close()),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ElementKind;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body>
<w:p><w:pPr><w:pStyle w:val="Title"/></w:pPr><w:r><w:t>Annual Report</w:t></w:r></w:p>
<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Overview</w:t></w:r></w:p>
<w:p><w:r><w:t xml:space="preserve">Sales grew </w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>12%</w:t></w:r><w:r><w:t xml:space="preserve"> &amp; costs fell.</w:t></w:r></w:p>
<w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="1"/></w:numPr></w:pPr><w:r><w:t>First point</w:t></w:r></w:p>
<w:p><w:pPr><w:pStyle w:val="ListBullet"/></w:pPr><w:r><w:t>Second point</w:t></w:r></w:p>
<w:p/>
<w:tbl>
  <w:tr><w:tc><w:p><w:r><w:t>Region</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Total</w:t></w:r></w:p></w:tc></w:tr>
  <w:tr><w:tc><w:p><w:r><w:t>North</w:t></w:r></w:p><w:p><w:r><w:t>(incl. islands)</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>42</w:t></w:r></w:p></w:tc></w:tr>
</w:tbl>
<w:p><w:r><w:t>Closing</w:t></w:r><w:r><w:tab/><w:t>remarks.</w:t></w:r></w:p>
<w:sectPr/>
</w:body>
</w:document>"#;

    #[test]
    fn docx_paragraph_classification() {
        let els = parse_docx_body(DOCUMENT_XML).unwrap();
        let got: Vec<(ElementKind, &str)> = els.iter().map(|e| (e.kind, e.text.as_str())).collect();
        assert_eq!(
            got,
            vec![
                (ElementKind::Title, "Annual Report"),
                (ElementKind::Title, "Overview"),
                (ElementKind::NarrativeText, "Sales grew 12% & costs fell."),
                (ElementKind::ListItem, "First point"),
                (ElementKind::ListItem, "Second point"),
                (ElementKind::Table, "Region | Total\nNorth (incl. islands) | 42"),
                (ElementKind::NarrativeText, "Closing remarks."),
            ]
        );
    }

    #[tokio::test]
    async fn docx_from_zip() {
        let bytes = zip_with(&[("word/document.xml", DOCUMENT_XML)]);
        let els = DocxPartitioner.partition(Arc::from(bytes)).await.unwrap();
        assert_eq!(els.len(), 7);
    }

    #[tokio::test]
    async fn docx_without_body_is_corrupt() {
        let bytes = zip_with(&[("word/styles.xml", "<w:styles/>")]);
        let err = DocxPartitioner.partition(Arc::from(bytes)).await.unwrap_err();
        assert!(err.to_string().contains("word/document.xml"), "{err}");
    }

    #[tokio::test]
    async fn ole2_docx_is_encrypted() {
        let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        bytes.extend_from_slice(&[0u8; 512]);
        let err = DocxPartitioner.partition(Arc::from(bytes)).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Encrypted { .. }), "{err:?}");
    }

    fn slide(title: &str, body: &str) -> String {
        format!(
            r#"<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree>
<p:sp><p:nvSpPr><p:cNvPr id="2" name="Title 1"/><p:cNvSpPr/><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr><p:txBody><a:p><a:r><a:t>{title}</a:t></a:r></a:p></p:txBody></p:sp>
<p:sp><p:nvSpPr><p:cNvPr id="3" name="Content 2"/><p:cNvSpPr/><p:nvPr><p:ph idx="1"/></p:nvPr></p:nvSpPr><p:txBody>{body}</p:txBody></p:sp>
</p:spTree></p:cSld></p:sld>"#
        )
    }

    #[tokio::test]
    async fn pptx_slides_in_numeric_order() {
        let s1 = slide(
            "Agenda",
            "<a:p><a:r><a:t>Budget</a:t></a:r></a:p><a:p><a:pPr><a:buNone/></a:pPr><a:r><a:t>Plain note</a:t></a:r></a:p>",
        );
        let s2 = slide("Results", "<a:p><a:r><a:t>Up 4%</a:t></a:r></a:p>");
        let s10 = slide("Questions", "");
        let bytes = zip_with(&[
            ("ppt/presentation.xml", "<p:presentation/>"),
            ("ppt/slides/slide10.xml", s10.as_str()),
            ("ppt/slides/slide2.xml", s2.as_str()),
            ("ppt/slides/slide1.xml", s1.as_str()),
            ("ppt/notesSlides/notesSlide1.xml", "<p:notes/>"),
        ]);

        let els = PptxPartitioner.partition(Arc::from(bytes)).await.unwrap();
        let got: Vec<(ElementKind, &str)> = els.iter().map(|e| (e.kind, e.text.as_str())).collect();
        assert_eq!(
            got,
            vec![
                (ElementKind::Title, "Agenda"),
                (ElementKind::ListItem, "Budget"),
                (ElementKind::NarrativeText, "Plain note"),
                (ElementKind::Title, "Results"),
                (ElementKind::ListItem, "Up 4%"),
                (ElementKind::Title, "Questions"),
            ]
        );
    }

    #[test]
    fn pptx_table_and_text_box() {
        let xml = r#"<p:sld xmlns:a="a" xmlns:p="p"><p:cSld><p:spTree>
<p:sp><p:nvSpPr><p:nvPr/></p:nvSpPr><p:txBody><a:p><a:r><a:t>Free text</a:t></a:r></a:p></p:txBody></p:sp>
<p:graphicFrame><a:graphic><a:graphicData><a:tbl>
<a:tr><a:tc><a:txBody><a:p><a:r><a:t>k</a:t></a:r></a:p></a:txBody></a:tc><a:tc><a:txBody><a:p><a:r><a:t>v</a:t></a:r></a:p></a:txBody></a:tc></a:tr>
</a:tbl></a:graphicData></a:graphic></p:graphicFrame>
</p:spTree></p:cSld></p:sld>"#;
        let els = parse_slide(xml, "ppt/slides/slide1.xml").unwrap();
        assert_eq!(els[0].kind, ElementKind::NarrativeText);
        assert_eq!(els[1].kind, ElementKind::Table);
        assert_eq!(els[1].text, "k | v");
    }
}
