//! Workbooks (XLSX, XLS, ODS) via `calamine`.
//!
//! Each non-empty sheet becomes a title (the sheet name) followed by one
//! table element holding its used range.

use super::detect::is_ole2;
use super::{blocking, table_text, DocumentFormat, Partitioner};
use crate::document::Element;
use crate::error::ExtractionError;
use async_trait::async_trait;
use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

/// Integral floats below this are printed without a fraction.
const MAX_EXACT_INTEGER: f64 = 1e15;

pub(crate) struct SpreadsheetPartitioner {
    pub format: DocumentFormat,
}

#[async_trait]
impl Partitioner for SpreadsheetPartitioner {
    async fn partition(&self, bytes: Arc<[u8]>) -> Result<Vec<Element>, ExtractionError> {
        let format = self.format;
        blocking(bytes, move |b| partition_workbook(b, format)).await
    }
}

fn partition_workbook(bytes: &[u8], format: DocumentFormat) -> Result<Vec<Element>, ExtractionError> {
    // OOXML workbooks only live in an OLE2 container when encrypted.
    if format != DocumentFormat::Xls && is_ole2(bytes) {
        return Err(ExtractionError::Encrypted {
            format: format.to_string(),
        });
    }

    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| workbook_error(format, e))?;

    let mut elements = Vec::new();
    for name in workbook.sheet_names() {
        let range = match workbook.worksheet_range(&name) {
            Ok(range) => range,
            Err(e) => {
                // Chart sheets and macro sheets have no cell range.
                debug!("Skipping sheet '{}': {}", name, e);
                continue;
            }
        };
        let Some(table) = Element::table(table_text(range_rows(&range))) else {
            continue;
        };
        elements.extend(Element::title(&name));
        elements.push(table);
    }
    Ok(elements)
}

fn workbook_error(format: DocumentFormat, e: calamine::Error) -> ExtractionError {
    let detail = e.to_string();
    let lower = detail.to_ascii_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        ExtractionError::Encrypted {
            format: format.to_string(),
        }
    } else {
        ExtractionError::corrupt(format, detail)
    }
}

fn range_rows(range: &Range<Data>) -> Vec<Vec<String>> {
    range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect()
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_float(*f),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        other => other.to_string(),
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGER {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_render_as_plain_text() {
        assert_eq!(cell_text(&Data::Float(42.0)), "42");
        assert_eq!(cell_text(&Data::Float(3.25)), "3.25");
        assert_eq!(cell_text(&Data::Int(-7)), "-7");
        assert_eq!(cell_text(&Data::Bool(true)), "TRUE");
        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(cell_text(&Data::String("Widget".into())), "Widget");
    }

    #[test]
    fn used_range_becomes_table_rows() {
        let mut range: Range<Data> = Range::new((0, 0), (2, 1));
        range.set_value((0, 0), Data::String("Item".into()));
        range.set_value((0, 1), Data::String("Qty".into()));
        range.set_value((2, 0), Data::String("Bolt".into()));
        range.set_value((2, 1), Data::Float(12.0));
        assert_eq!(table_text(range_rows(&range)), "Item | Qty\nBolt | 12");
    }

    #[tokio::test]
    async fn garbage_workbook_is_corrupt() {
        let partitioner = SpreadsheetPartitioner {
            format: DocumentFormat::Xlsx,
        };
        let err = partitioner
            .partition(Arc::from(b"PK\x03\x04 definitely not a workbook".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Corrupt { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn ole2_xlsx_is_encrypted() {
        let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        bytes.extend_from_slice(&[0u8; 512]);
        let partitioner = SpreadsheetPartitioner {
            format: DocumentFormat::Xlsx,
        };
        let err = partitioner.partition(Arc::from(bytes)).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Encrypted { .. }), "{err:?}");
    }
}
