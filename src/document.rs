//! Input-side data model: the triggering source object and the elements
//! extracted from it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The document that triggered an invocation.
///
/// Owned by exactly one invocation and never mutated after it has been read.
/// The bytes sit behind an `Arc` so the extractor can hand them to a blocking
/// thread without copying.
#[derive(Debug, Clone)]
pub struct SourceObject {
    key: String,
    bytes: Arc<[u8]>,
}

impl SourceObject {
    pub fn new(key: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            key: key.into(),
            bytes: bytes.into(),
        }
    }

    /// Full key of the object within the input location.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Last path segment of the key; the extractor's advisory filename.
    pub fn base_name(&self) -> &str {
        crate::pipeline::naming::base_name(&self.key)
    }
}

/// Semantic category of an [`Element`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Title,
    NarrativeText,
    ListItem,
    Table,
    /// Preformatted or fenced code.
    Code,
    /// Text read from an image or a scanned page.
    ImageText,
    /// Text with no better category (loose XML text nodes, etc.).
    Uncategorized,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Title => "Title",
            ElementKind::NarrativeText => "NarrativeText",
            ElementKind::ListItem => "ListItem",
            ElementKind::Table => "Table",
            ElementKind::Code => "Code",
            ElementKind::ImageText => "ImageText",
            ElementKind::Uncategorized => "Uncategorized",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of extracted content.
///
/// `text` is trimmed and non-empty; extractors drop blank candidates via
/// [`Element::new`] returning `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub kind: ElementKind,
    pub text: String,
}

impl Element {
    pub fn new(kind: ElementKind, text: impl AsRef<str>) -> Option<Self> {
        let text = text.as_ref().trim();
        if text.is_empty() {
            None
        } else {
            Some(Self {
                kind,
                text: text.to_string(),
            })
        }
    }

    pub fn title(text: impl AsRef<str>) -> Option<Self> {
        Self::new(ElementKind::Title, text)
    }

    pub fn narrative(text: impl AsRef<str>) -> Option<Self> {
        Self::new(ElementKind::NarrativeText, text)
    }

    pub fn list_item(text: impl AsRef<str>) -> Option<Self> {
        Self::new(ElementKind::ListItem, text)
    }

    pub fn table(text: impl AsRef<str>) -> Option<Self> {
        Self::new(ElementKind::Table, text)
    }

    pub fn code(text: impl AsRef<str>) -> Option<Self> {
        Self::new(ElementKind::Code, text)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Collapse every run of whitespace (including newlines) into one space.
pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
