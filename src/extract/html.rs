//! HTML partitioning with `scraper`.
//!
//! Block-level elements start a new element; inline markup is flattened into
//! the text of its enclosing block. Loose text directly inside containers
//! (`div`, `section`, `body`, ...) becomes narrative text.

use super::{blocking, decode_text, table_text, DocumentFormat, Partitioner};
use crate::document::{collapse_whitespace, Element};
use crate::error::ExtractionError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::Arc;

/// Never contribute text.
const SKIPPED: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Containers: flush pending text before and after, recurse into children.
const CONTAINERS: &[&str] = &[
    "html", "body", "main", "div", "section", "article", "header", "footer", "nav", "aside",
    "blockquote", "figure", "figcaption", "form", "fieldset", "address", "details", "summary",
    "dl", "dt", "dd", "ul", "ol", "center", "hr",
];

static TR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("th, td").unwrap());

pub(crate) struct HtmlPartitioner;

#[async_trait]
impl Partitioner for HtmlPartitioner {
    async fn partition(&self, bytes: Arc<[u8]>) -> Result<Vec<Element>, ExtractionError> {
        blocking(bytes, |b| Ok(partition_html(&decode_text(b, DocumentFormat::Html)?))).await
    }
}

pub(crate) fn partition_html(html: &str) -> Vec<Element> {
    let document = Html::parse_document(html);
    let mut walker = Walker::default();
    walker.visit(document.root_element());
    walker.flush();
    walker.elements
}

#[derive(Default)]
struct Walker {
    elements: Vec<Element>,
    /// Inline text not yet attached to a block.
    pending: String,
}

impl Walker {
    fn flush(&mut self) {
        let text = collapse_whitespace(&self.pending);
        self.elements.extend(Element::narrative(text));
        self.pending.clear();
    }

    fn visit_children(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            match child.value() {
                Node::Text(t) => self.pending.push_str(t),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.visit(child);
                    }
                }
                _ => {}
            }
        }
    }

    fn visit(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        if SKIPPED.contains(&name) {
            return;
        }

        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush();
                self.elements
                    .extend(Element::title(collapse_whitespace(&inline_text(el))));
            }
            "p" => {
                self.flush();
                self.visit_children(el);
                self.flush();
            }
            "li" => {
                self.flush();
                self.elements
                    .extend(Element::list_item(collapse_whitespace(&inline_text(el))));
                // Nested lists follow their parent item.
                for child in el.children().filter_map(ElementRef::wrap) {
                    if matches!(child.value().name(), "ul" | "ol") {
                        self.visit(child);
                    }
                }
            }
            "table" => {
                self.flush();
                let rows = el.select(&TR).map(|row| {
                    row.select(&CELL)
                        .map(inline_text)
                        .collect::<Vec<_>>()
                });
                self.elements.extend(Element::table(table_text(rows)));
            }
            "pre" => {
                self.flush();
                self.elements.extend(Element::code(el.text().collect::<String>()));
            }
            "br" => self.pending.push('\n'),
            _ if CONTAINERS.contains(&name) => {
                self.flush();
                self.visit_children(el);
                self.flush();
            }
            _ => self.visit_children(el),
        }
    }
}

/// Text of `el` and its descendants, skipping nested lists and non-content
/// elements.
fn inline_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(el, &mut out);
    out
}

fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => {
                let name = e.name();
                if SKIPPED.contains(&name) || matches!(name, "ul" | "ol") {
                    continue;
                }
                if name == "br" {
                    out.push(' ');
                } else if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, out);
                }
            }
            _ => {}
        }
    }
}
