//! Text-based formats: plain text, Markdown, CSV/TSV and generic XML.

use super::{blocking, decode_text, table_text, DocumentFormat, Partitioner};
use crate::document::{collapse_whitespace, Element};
use crate::error::ExtractionError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use quick_xml::events::{BytesText, Event};
use quick_xml::Reader;
use regex::Regex;
use std::sync::Arc;

/// Longest single line still considered a heading in plain text.
const MAX_TITLE_WORDS: usize = 12;

/// Bullet (group 1) or enumerator (group 2) at the start of a line.
static RE_LIST_ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:([-*•●▪◦‣])|(\d{1,3}[.)]|[a-zA-Z][.)]))\s+").unwrap()
});

static RE_MD_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ {0,3}#{1,6}(?:\s+(.*?))?(?:\s+#+)?\s*$").unwrap());

static RE_MD_LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:([-*+])|(\d{1,9}[.)]))\s+").unwrap());

static RE_MD_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ {0,3}(```+|~~~+)").unwrap());

// ── Plain text ───────────────────────────────────────────────────────────

pub(crate) struct TextPartitioner;

#[async_trait]
impl Partitioner for TextPartitioner {
    async fn partition(&self, bytes: Arc<[u8]>) -> Result<Vec<Element>, ExtractionError> {
        blocking(bytes, |b| {
            Ok(partition_plain_text(&decode_text(b, DocumentFormat::Text)?))
        })
        .await
    }
}

/// Split text into blank-line separated blocks and classify each line.
///
/// Bulleted or enumerated lines become list items (bullets are dropped,
/// numbering kept); indented lines directly under a list item continue it. A
/// block that is a single short line without closing punctuation is a title;
/// everything else is narrative text with its line breaks collapsed.
pub(crate) fn partition_plain_text(text: &str) -> Vec<Element> {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut elements = Vec::new();

    for block in blocks(&text) {
        let mut paragraph: Vec<&str> = Vec::new();
        let mut item: Option<String> = None;

        for line in block {
            if let Some(text) = list_item_text(line) {
                flush_paragraph(&mut paragraph, &mut elements);
                elements.extend(item.take().and_then(Element::list_item));
                item = Some(text);
            } else if item.is_some() && line.starts_with(char::is_whitespace) {
                if let Some(current) = item.as_mut() {
                    current.push(' ');
                    current.push_str(line.trim());
                }
            } else {
                elements.extend(item.take().and_then(Element::list_item));
                paragraph.push(line);
            }
        }
        elements.extend(item.take().and_then(Element::list_item));
        flush_paragraph(&mut paragraph, &mut elements);
    }

    elements
}

fn blocks(text: &str) -> Vec<Vec<&str>> {
    let mut out = Vec::new();
    let mut current = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn flush_paragraph(lines: &mut Vec<&str>, elements: &mut Vec<Element>) {
    if lines.is_empty() {
        return;
    }
    let element = if lines.len() == 1 && is_title(lines[0]) {
        Element::title(lines[0])
    } else {
        Element::narrative(collapse_whitespace(&lines.join(" ")))
    };
    elements.extend(element);
    lines.clear();
}

fn list_item_text(line: &str) -> Option<String> {
    let caps = RE_LIST_ITEM.captures(line)?;
    let rest = &line[caps.get(0)?.end()..];
    if rest.trim().is_empty() {
        return None;
    }
    Some(match caps.get(2) {
        Some(number) => format!("{} {}", number.as_str(), rest.trim()),
        None => rest.trim().to_string(),
    })
}

pub(crate) fn is_title(line: &str) -> bool {
    let line = line.trim();
    let words = line.split_whitespace().count();
    (1..=MAX_TITLE_WORDS).contains(&words)
        && !line.ends_with(['.', ',', ';', ':'])
        && line.chars().any(char::is_alphabetic)
}

// ── Markdown ─────────────────────────────────────────────────────────────

pub(crate) struct MarkdownPartitioner;

#[async_trait]
impl Partitioner for MarkdownPartitioner {
    async fn partition(&self, bytes: Arc<[u8]>) -> Result<Vec<Element>, ExtractionError> {
        blocking(bytes, |b| {
            Ok(partition_markdown(&decode_text(b, DocumentFormat::Markdown)?))
        })
        .await
    }
}

/// Headings become titles without their `#` markers, fenced blocks stay
/// fenced as code, pipe tables are kept verbatim, everything else is grouped
/// into paragraphs.
pub(crate) fn partition_markdown(text: &str) -> Vec<Element> {
    let text = text.replace("\r\n", "\n");
    let mut elements = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut table: Vec<&str> = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        if let Some(fence) = RE_MD_FENCE.captures(line).and_then(|c| c.get(1)) {
            flush_markdown(&mut paragraph, &mut table, &mut elements);
            let marker = fence.as_str();
            let mut block = vec![line];
            for inner in lines.by_ref() {
                block.push(inner);
                if inner.trim() == marker {
                    break;
                }
            }
            elements.extend(Element::code(block.join("\n")));
            continue;
        }

        if line.trim().is_empty() {
            flush_markdown(&mut paragraph, &mut table, &mut elements);
        } else if let Some(caps) = RE_MD_HEADING.captures(line) {
            flush_markdown(&mut paragraph, &mut table, &mut elements);
            elements.extend(caps.get(1).and_then(|m| Element::title(m.as_str())));
        } else if line.trim_start().starts_with('|') {
            if !paragraph.is_empty() {
                flush_markdown(&mut paragraph, &mut table, &mut elements);
            }
            table.push(line.trim());
        } else if let Some(caps) = RE_MD_LIST_ITEM.captures(line) {
            flush_markdown(&mut paragraph, &mut table, &mut elements);
            let rest = line[caps.get(0).map_or(0, |m| m.end())..].trim();
            let item = match caps.get(2) {
                Some(number) => format!("{} {}", number.as_str(), rest),
                None => rest.to_string(),
            };
            elements.extend(Element::list_item(item));
        } else {
            if !table.is_empty() {
                flush_markdown(&mut paragraph, &mut table, &mut elements);
            }
            paragraph.push(line.trim_end());
        }
    }
    flush_markdown(&mut paragraph, &mut table, &mut elements);

    elements
}

fn flush_markdown(paragraph: &mut Vec<&str>, table: &mut Vec<&str>, out: &mut Vec<Element>) {
    if !paragraph.is_empty() {
        out.extend(Element::narrative(paragraph.join("\n")));
        paragraph.clear();
    }
    if !table.is_empty() {
        out.extend(Element::table(table.join("\n")));
        table.clear();
    }
}

// ── CSV / TSV ────────────────────────────────────────────────────────────

pub(crate) struct DelimitedPartitioner {
    pub delimiter: u8,
}

#[async_trait]
impl Partitioner for DelimitedPartitioner {
    async fn partition(&self, bytes: Arc<[u8]>) -> Result<Vec<Element>, ExtractionError> {
        let delimiter = self.delimiter;
        blocking(bytes, move |b| partition_delimited(b, delimiter)).await
    }
}

/// The whole file becomes one table element.
fn partition_delimited(bytes: &[u8], delimiter: u8) -> Result<Vec<Element>, ExtractionError> {
    let format = if delimiter == b'\t' {
        DocumentFormat::Tsv
    } else {
        DocumentFormat::Csv
    };
    let text = decode_text(bytes, format)?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ExtractionError::corrupt(format, e))?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    Ok(Element::table(table_text(rows)).into_iter().collect())
}

// ── XML ──────────────────────────────────────────────────────────────────

pub(crate) struct XmlPartitioner;

#[async_trait]
impl Partitioner for XmlPartitioner {
    async fn partition(&self, bytes: Arc<[u8]>) -> Result<Vec<Element>, ExtractionError> {
        blocking(bytes, |b| partition_xml(&decode_text(b, DocumentFormat::Xml)?)).await
    }
}

/// One narrative element per non-blank text node, in document order.
fn partition_xml(xml: &str) -> Result<Vec<Element>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut elements = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Text(t)) => {
                elements.extend(Element::narrative(collapse_whitespace(&xml_text(&t))));
            }
            Ok(Event::CData(c)) => {
                let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                elements.extend(Element::narrative(collapse_whitespace(&text)));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractionError::corrupt(
                    DocumentFormat::Xml,
                    format!("at byte {}: {e}", reader.buffer_position()),
                ))
            }
            _ => {}
        }
    }

    Ok(elements)
}

/// Unescaped text of a node; unknown entities are kept literally.
pub(crate) fn xml_text(t: &BytesText<'_>) -> String {
    match t.unescape() {
        Ok(s) => s.into_owned(),
        Err(_) => String::from_utf8_lossy(t).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ElementKind;

    fn kinds(elements: &[Element]) -> Vec<ElementKind> {
        elements.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn plain_text_blocks() {
        let text = "Shopping List\n\n- milk\n- eggs\n  (free range)\n\nWe need these\nbefore Friday.\n";
        let els = partition_plain_text(text);
        assert_eq!(
            kinds(&els),
            vec![
                ElementKind::Title,
                ElementKind::ListItem,
                ElementKind::ListItem,
                ElementKind::NarrativeText
            ]
        );
        assert_eq!(els[1].text, "milk");
        assert_eq!(els[2].text, "eggs (free range)");
        assert_eq!(els[3].text, "We need these before Friday.");
    }

    #[test]
    fn numbering_is_kept_on_list_items() {
        let els = partition_plain_text("1. Open the lid\n2) Pour");
        assert_eq!(els[0].text, "1. Open the lid");
        assert_eq!(els[1].text, "2) Pour");
        assert!(els.iter().all(|e| e.kind == ElementKind::ListItem));
    }

    #[test]
    fn sentences_are_not_titles() {
        assert!(is_title("Executive Summary"));
        assert!(!is_title("This ends with a period."));
        assert!(!is_title("2024"));
        assert!(!is_title(
            "one two three four five six seven eight nine ten eleven twelve thirteen"
        ));
    }

    #[test]
    fn crlf_input() {
        let els = partition_plain_text("Title\r\n\r\nBody text here.\r\n");
        assert_eq!(els.len(), 2);
        assert_eq!(els[1].text, "Body text here.");
    }

    #[test]
    fn markdown_structure() {
        let md = "# Guide\n\nIntro line one\nline two\n\n* first\n2. second\n\n```rust\nfn main() {}\n```\n\n| a | b |\n|---|---|\n| 1 | 2 |\n## Next ##\n";
        let els = partition_markdown(md);
        assert_eq!(
            kinds(&els),
            vec![
                ElementKind::Title,
                ElementKind::NarrativeText,
                ElementKind::ListItem,
                ElementKind::ListItem,
                ElementKind::Code,
                ElementKind::Table,
                ElementKind::Title,
            ]
        );
        assert_eq!(els[0].text, "Guide");
        assert_eq!(els[1].text, "Intro line one\nline two");
        assert_eq!(els[2].text, "first");
        assert_eq!(els[3].text, "2. second");
        assert_eq!(els[4].text, "```rust\nfn main() {}\n```");
        assert_eq!(els[5].text, "| a | b |\n|---|---|\n| 1 | 2 |");
        assert_eq!(els[6].text, "Next");
    }

    #[test]
    fn unterminated_fence_runs_to_end() {
        let els = partition_markdown("```\nlet x = 1;\n");
        assert_eq!(els.len(), 1);
        assert_eq!(els[0].kind, ElementKind::Code);
    }

    #[test]
    fn csv_becomes_one_table() {
        let els = partition_delimited(b"name,qty\n\"Widget, large\",3\n,\n", b',').unwrap();
        assert_eq!(els.len(), 1);
        assert_eq!(els[0].kind, ElementKind::Table);
        assert_eq!(els[0].text, "name | qty\nWidget, large | 3");
    }

    #[test]
    fn tsv_ragged_rows() {
        let els = partition_delimited(b"a\tb\tc\n1\t2\n", b'\t').unwrap();
        assert_eq!(els[0].text, "a | b | c\n1 | 2");
    }

    #[test]
    fn xml_text_nodes() {
        let xml = r#"<?xml version="1.0"?><note><to>Tove</to><body>Don&apos;t   forget</body><![CDATA[raw <b>]]></note>"#;
        let els = partition_xml(xml).unwrap();
        let texts: Vec<_> = els.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["Tove", "Don't forget", "raw <b>"]);
    }

    #[test]
    fn malformed_xml_is_corrupt() {
        let err = partition_xml("<a><b></a>").unwrap_err();
        assert!(matches!(err, ExtractionError::Corrupt { .. }), "{err:?}");
    }
}
