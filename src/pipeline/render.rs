//! Markdown rendering: flatten elements into one document.
//!
//! Each element contributes its text as-is; consecutive elements are
//! separated by exactly one blank line. Order is preserved, nothing is
//! deduplicated, and no per-kind styling is added.

use crate::document::Element;
use crate::output::RenderedDocument;

/// Separator placed between consecutive elements.
pub const ELEMENT_SEPARATOR: &str = "\n\n";

pub fn render_markdown(elements: &[Element]) -> RenderedDocument {
    let markdown = elements
        .iter()
        .map(|e| e.text.as_str())
        .collect::<Vec<_>>()
        .join(ELEMENT_SEPARATOR);

    RenderedDocument {
        markdown,
        element_count: elements.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ElementKind;

    fn el(kind: ElementKind, text: &str) -> Element {
        Element {
            kind,
            text: text.to_string(),
        }
    }

    #[test]
    fn joins_with_one_blank_line_in_order() {
        let elements = vec![
            el(ElementKind::Title, "A"),
            el(ElementKind::NarrativeText, "B"),
            el(ElementKind::ListItem, "C"),
        ];
        let doc = render_markdown(&elements);
        assert_eq!(doc.markdown, "A\n\nB\n\nC");
        assert_eq!(doc.element_count, 3);
    }

    #[test]
    fn duplicates_are_kept() {
        let elements = vec![
            el(ElementKind::NarrativeText, "same"),
            el(ElementKind::NarrativeText, "same"),
        ];
        assert_eq!(render_markdown(&elements).markdown, "same\n\nsame");
    }

    #[test]
    fn tables_are_not_restyled() {
        let elements = vec![el(ElementKind::Table, "a | b\n1 | 2")];
        assert_eq!(render_markdown(&elements).markdown, "a | b\n1 | 2");
    }

    #[test]
    fn empty_input_renders_empty_document() {
        let doc = render_markdown(&[]);
        assert_eq!(doc.markdown, "");
        assert_eq!(doc.element_count, 0);
    }
}
