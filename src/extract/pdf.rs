//! PDF table extraction via lopdf text extraction + line field parsing.

use tracing::debug;

use crate::document::Document;
use crate::error::ExtractError;
use crate::extract::TableExtractor;
use crate::extract::fields::parse_fields;

/// Extracts key/value fields from the text layer of a PDF.
///
/// Scanned PDFs without a text layer yield no fields.
#[derive(Debug, Clone, Default)]
pub struct PdfTableExtractor;

impl PdfTableExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Plain text of every page, in page order.
    pub fn extract_text(bytes: &[u8]) -> Result<String, ExtractError> {
        let pdf = lopdf::Document::load_mem(bytes)?;
        let pages: Vec<u32> = pdf.get_pages().keys().copied().collect();
        if pages.is_empty() {
            return Ok(String::new());
        }
        Ok(pdf.extract_text(&pages)?)
    }
}

impl TableExtractor for PdfTableExtractor {
    fn extract(&self, document: &mut Document) -> Result<usize, ExtractError> {
        if !document.is_pdf() {
            return Err(ExtractError::UnsupportedType(
                document.get_type().unwrap_or("(untyped)").to_string(),
            ));
        }

        let text = Self::extract_text(document.get_file())?;
        let fields = parse_fields(&text);
        debug!(
            document = document.display_name(),
            chars = text.len(),
            fields = fields.len(),
            "Extracted PDF text"
        );
        document.set_text(text);

        if fields.is_empty() {
            return Err(ExtractError::NoStructuredContent(
                document.display_name().to_string(),
            ));
        }

        let count = fields.len();
        document.add_attributes(fields);
        Ok(count)
    }
}
