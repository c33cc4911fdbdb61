//! Table extraction: populates a document's attributes from its raw bytes.

pub mod fields;
pub mod pdf;

pub use pdf::PdfTableExtractor;

use crate::document::Document;
use crate::error::ExtractError;

/// Pluggable extraction step.
///
/// Implementations mutate the document's attributes (and text) in place and
/// must never touch its raw bytes. When no structured content is found the
/// attributes are left unchanged and an error is returned; callers treat any
/// error as "no identifier extracted".
pub trait TableExtractor: Send + Sync {
    /// Returns the number of fields added.
    fn extract(&self, document: &mut Document) -> Result<usize, ExtractError>;
}
