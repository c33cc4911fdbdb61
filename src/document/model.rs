//! In-memory representation of one ingested file.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;

use crate::document::attributes::{AttributeValue, EXTERNAL_ID};
use crate::error::DocumentError;

/// Declared type of PDF attachments.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Generic binary type some mailers use for every attachment.
const OCTET_STREAM: &str = "application/octet-stream";

/// Attribute mapping: unique keys, deterministic iteration order.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// One ingested file: raw bytes, declared type, name and extracted attributes.
///
/// The raw bytes never change after construction. Attributes are populated
/// by a table extractor and read by the reconciliation engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    raw: Vec<u8>,
    filetype: Option<String>,
    name: Option<String>,
    text: String,
    attributes: Attributes,
}

impl Document {
    pub fn new(raw: impl Into<Vec<u8>>, filetype: Option<&str>, name: Option<&str>) -> Self {
        Self {
            raw: raw.into(),
            filetype: filetype.map(str::to_string),
            name: name.map(str::to_string),
            text: String::new(),
            attributes: Attributes::new(),
        }
    }

    pub fn get_type(&self) -> Option<&str> {
        self.filetype.as_deref()
    }

    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn get_file(&self) -> &[u8] {
        &self.raw
    }

    pub fn get_text(&self) -> &str {
        &self.text
    }

    pub fn set_type(&mut self, filetype: impl Into<String>) {
        self.filetype = Some(filetype.into());
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Name for log lines and notices.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("(unnamed)")
    }

    /// All attributes, or only those whose key is in `keys`.
    ///
    /// Keys that are not present are silently left out of the result.
    pub fn get_attributes(&self, keys: Option<&[&str]>) -> Attributes {
        match keys {
            Some(keys) => self
                .attributes
                .iter()
                .filter(|(k, _)| keys.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => self.attributes.clone(),
        }
    }

    /// Single attribute lookup.
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Merge `attributes` into the document, overwriting existing keys.
    pub fn add_attributes<I, K>(&mut self, attributes: I)
    where
        I: IntoIterator<Item = (K, AttributeValue)>,
        K: Into<String>,
    {
        self.attributes
            .extend(attributes.into_iter().map(|(k, v)| (k.into(), v)));
    }

    /// Same upsert semantics as [`Document::add_attributes`].
    pub fn update_attributes<I, K>(&mut self, attributes: I)
    where
        I: IntoIterator<Item = (K, AttributeValue)>,
        K: Into<String>,
    {
        self.add_attributes(attributes);
    }

    /// Remove the listed attributes, or all of them when `keys` is `None`.
    ///
    /// Fails without removing anything if any listed key is absent.
    pub fn delete_attributes(&mut self, keys: Option<&[&str]>) -> Result<(), DocumentError> {
        let Some(keys) = keys else {
            self.attributes.clear();
            return Ok(());
        };

        if let Some(missing) = keys.iter().find(|k| !self.attributes.contains_key(**k)) {
            return Err(DocumentError::MissingAttribute((*missing).to_string()));
        }
        for key in keys {
            self.attributes.remove(*key);
        }
        Ok(())
    }

    /// The extracted regulatory identifier, if any.
    pub fn external_id(&self) -> Option<&str> {
        self.attributes
            .get(EXTERNAL_ID)
            .and_then(AttributeValue::as_text)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// A named numeric figure.
    pub fn figure(&self, key: &str) -> Option<Decimal> {
        self.attributes.get(key).and_then(AttributeValue::as_amount)
    }

    /// All numeric figures in key order.
    pub fn figures(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.attributes
            .iter()
            .filter_map(|(k, v)| v.as_amount().map(|d| (k.as_str(), d)))
    }

    /// Whether the declared type marks this as a PDF.
    ///
    /// MIME parameters are ignored. Generic `application/octet-stream`
    /// attachments count when their name ends in `.pdf`.
    pub fn is_pdf(&self) -> bool {
        let Some(filetype) = self.filetype.as_deref() else {
            return false;
        };
        let essence = filetype
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence == PDF_CONTENT_TYPE {
            return true;
        }
        essence == OCTET_STREAM
            && self
                .name
                .as_deref()
                .is_some_and(|n| n.to_ascii_lowercase().ends_with(".pdf"))
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Document: {}, {}, {} attributes",
            self.display_name(),
            self.filetype.as_deref().unwrap_or("(untyped)"),
            self.attributes.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn pdf() -> Document {
        Document::new(b"%PDF-1.4".to_vec(), Some("application/pdf"), Some("report.pdf"))
    }

    fn sample_attributes() -> Vec<(&'static str, AttributeValue)> {
        vec![
            (EXTERNAL_ID, AttributeValue::from("BAFIN-001")),
            ("total_assets", AttributeValue::from(dec!(1000.00))),
        ]
    }

    #[test]
    fn accessors() {
        let mut doc = pdf();
        assert_eq!(doc.get_type(), Some("application/pdf"));
        assert_eq!(doc.get_name(), Some("report.pdf"));
        assert_eq!(doc.get_file(), b"%PDF-1.4");
        assert_eq!(doc.get_text(), "");

        doc.set_type("text/plain");
        doc.set_name("renamed.txt");
        doc.set_text("hello");
        assert_eq!(doc.get_type(), Some("text/plain"));
        assert_eq!(doc.get_name(), Some("renamed.txt"));
        assert_eq!(doc.get_text(), "hello");
        assert_eq!(doc.get_file(), b"%PDF-1.4");
    }

    #[test]
    fn add_then_get_returns_added_keys() {
        let mut doc = pdf();
        doc.add_attributes(sample_attributes());

        let all = doc.get_attributes(None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[EXTERNAL_ID], AttributeValue::from("BAFIN-001"));
        assert_eq!(all["total_assets"], AttributeValue::from(dec!(1000)));

        // Repeating the add changes nothing.
        doc.add_attributes(sample_attributes());
        assert_eq!(doc.get_attributes(None), all);
    }

    #[test]
    fn add_and_update_overwrite_existing_keys() {
        let mut doc = pdf();
        doc.add_attributes(sample_attributes());
        doc.update_attributes([("total_assets", AttributeValue::from(dec!(5)))]);
        doc.add_attributes([("equity", AttributeValue::from(dec!(7)))]);

        assert_eq!(doc.figure("total_assets"), Some(dec!(5)));
        assert_eq!(doc.figure("equity"), Some(dec!(7)));
        assert_eq!(doc.external_id(), Some("BAFIN-001"));
    }

    #[test]
    fn filtered_get_omits_absent_keys() {
        let mut doc = pdf();
        doc.add_attributes(sample_attributes());

        let subset = doc.get_attributes(Some(&["total_assets", "does_not_exist"]));
        assert_eq!(subset.len(), 1);
        assert!(subset.contains_key("total_assets"));
    }

    #[test]
    fn delete_all_clears_attributes() {
        let mut doc = pdf();
        doc.add_attributes(sample_attributes());
        doc.delete_attributes(None).unwrap();
        assert!(doc.get_attributes(None).is_empty());
    }

    #[test]
    fn delete_present_key() {
        let mut doc = pdf();
        doc.add_attributes(sample_attributes());
        doc.delete_attributes(Some(&["total_assets"])).unwrap();

        let remaining = doc.get_attributes(None);
        assert_eq!(remaining.len(), 1);
        assert!(remaining.contains_key(EXTERNAL_ID));
    }

    #[test]
    fn delete_absent_key_fails_and_keeps_everything() {
        let mut doc = pdf();
        doc.add_attributes(sample_attributes());

        let err = doc
            .delete_attributes(Some(&["total_assets", "missing"]))
            .unwrap_err();
        assert!(matches!(err, DocumentError::MissingAttribute(ref k) if k == "missing"));
        assert_eq!(doc.get_attributes(None).len(), 2);
    }

    #[test]
    fn external_id_ignores_blank_and_numeric_values() {
        let mut doc = pdf();
        assert_eq!(doc.external_id(), None);

        doc.add_attributes([(EXTERNAL_ID, AttributeValue::from("   "))]);
        assert_eq!(doc.external_id(), None);

        doc.add_attributes([(EXTERNAL_ID, AttributeValue::from(dec!(42)))]);
        assert_eq!(doc.external_id(), None);

        doc.add_attributes([(EXTERNAL_ID, AttributeValue::from(" BAFIN-9 "))]);
        assert_eq!(doc.external_id(), Some("BAFIN-9"));
    }

    #[test]
    fn figures_skip_text_values() {
        let mut doc = pdf();
        doc.add_attributes(sample_attributes());
        let figures: Vec<_> = doc.figures().collect();
        assert_eq!(figures, vec![("total_assets", dec!(1000))]);
    }

    #[test]
    fn pdf_detection() {
        assert!(pdf().is_pdf());
        assert!(Document::new(vec![], Some("Application/PDF; name=\"x.pdf\""), None).is_pdf());
        assert!(
            Document::new(vec![], Some("application/octet-stream"), Some("REPORT.PDF")).is_pdf()
        );
        assert!(
            !Document::new(vec![], Some("application/octet-stream"), Some("data.bin")).is_pdf()
        );
        assert!(!Document::new(vec![], Some("image/png"), Some("scan.pdf")).is_pdf());
        assert!(!Document::new(vec![], None, Some("report.pdf")).is_pdf());
    }

    #[test]
    fn display_summary() {
        let mut doc = pdf();
        doc.add_attributes(sample_attributes());
        assert_eq!(
            doc.to_string(),
            "Document: report.pdf, application/pdf, 2 attributes"
        );
    }
}
