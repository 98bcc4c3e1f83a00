//! OpenDocument text and presentations (ODT, ODP).
//!
//! Both keep their body in `content.xml`: `text:h` headings, `text:p`
//! paragraphs, `text:list-item`s and `table:table`s. Presentation titles are
//! paragraphs inside a `draw:frame` of class `title`.

use super::office::{attr, open_archive, read_entry, TableBuilder};
use super::text::xml_text;
use super::{blocking, DocumentFormat, Partitioner};
use crate::document::{collapse_whitespace, Element};
use crate::error::ExtractionError;
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::sync::Arc;

const CONTENT_PART: &str = "content.xml";

pub(crate) struct OpenDocumentPartitioner {
    pub format: DocumentFormat,
}

#[async_trait]
impl Partitioner for OpenDocumentPartitioner {
    async fn partition(&self, bytes: Arc<[u8]>) -> Result<Vec<Element>, ExtractionError> {
        let format = self.format;
        blocking(bytes, move |b| {
            let mut archive = open_archive(b, format)?;
            let xml = read_entry(&mut archive, CONTENT_PART, format)?;
            parse_content(&xml, format)
        })
        .await
    }
}

struct Block {
    heading: bool,
    text: String,
}

fn parse_content(xml: &str, format: DocumentFormat) -> Result<Vec<Element>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut elements = Vec::new();
    let mut block: Option<Block> = None;
    let mut items: Vec<String> = Vec::new();
    let mut table = TableBuilder::default();
    let mut title_frame = false;
    let mut skip_depth = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ExtractionError::corrupt(format, format!("{CONTENT_PART}: {e}")))?;
        let is_start = matches!(event, Event::Start(_));
        match event {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"annotation" | b"notes" if is_start => skip_depth += 1,
                b"p" | b"h" if is_start && skip_depth == 0 => {
                    block = Some(Block {
                        heading: e.local_name().as_ref() == b"h",
                        text: String::new(),
                    })
                }
                b"s" | b"tab" | b"line-break" => {
                    if let Some(b) = block.as_mut() {
                        b.text.push(' ');
                    }
                }
                b"list-item" if is_start => {
                    // Text gathered so far belongs to the parent item and
                    // precedes the nested one.
                    if let Some(parent) = items.last_mut() {
                        elements.extend(Element::list_item(std::mem::take(parent)));
                    }
                    items.push(String::new());
                }
                b"table" if is_start => table.open(),
                b"frame" if is_start => {
                    title_frame = attr(&e, b"class").as_deref() == Some("title");
                }
                _ => {}
            },
            Event::Text(t) if skip_depth == 0 => {
                if let Some(b) = block.as_mut() {
                    b.text.push_str(&xml_text(&t));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"annotation" | b"notes" => skip_depth = skip_depth.saturating_sub(1),
                b"p" | b"h" if skip_depth == 0 => {
                    let Some(b) = block.take() else {
                        continue;
                    };
                    let text = collapse_whitespace(&b.text);
                    if table.active() {
                        table.push_text(&text);
                    } else if let Some(item) = items.last_mut() {
                        if !item.is_empty() && !text.is_empty() {
                            item.push(' ');
                        }
                        item.push_str(&text);
                    } else if b.heading || title_frame {
                        elements.extend(Element::title(text));
                    } else {
                        elements.extend(Element::narrative(text));
                    }
                }
                b"list-item" => {
                    if let Some(item) = items.pop() {
                        elements.extend(Element::list_item(item));
                    }
                }
                b"table-cell" => table.end_cell(),
                b"table-row" => table.end_row(),
                b"table" => elements.extend(table.close()),
                b"frame" => title_frame = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(elements)
}
