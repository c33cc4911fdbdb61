//! Validation of extracted figures against the registry's reference values.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::document::Document;
use crate::error::DatabaseError;
use crate::store::{CompanyKey, CompanyRegistry};

/// Decides whether a matched document's values are consistent with what is
/// known about the company.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn compare_extracted_values(
        &self,
        company: &CompanyKey,
        document: &Document,
    ) -> Result<bool, DatabaseError>;
}

/// Compares every reference figure of the company with the figure of the
/// same name in the document.
///
/// Validation succeeds only if the company has at least one reference value
/// and every one of them is present in the document with an equal amount
/// (scale is ignored, so `1000` equals `1000.00`). Extra document figures
/// are not checked.
pub struct ReferenceValidator {
    registry: Arc<dyn CompanyRegistry>,
}

impl ReferenceValidator {
    pub fn new(registry: Arc<dyn CompanyRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Validator for ReferenceValidator {
    async fn compare_extracted_values(
        &self,
        company: &CompanyKey,
        document: &Document,
    ) -> Result<bool, DatabaseError> {
        let references = self.registry.reference_values(company).await?;
        if references.is_empty() {
            debug!(company = %company, "No reference values to validate against");
            return Ok(false);
        }

        for (field, expected) in &references {
            match document.figure(field) {
                Some(actual) if actual == *expected => {}
                Some(actual) => {
                    debug!(
                        company = %company,
                        field = %field,
                        expected = %expected,
                        actual = %actual,
                        "Reference value mismatch"
                    );
                    return Ok(false);
                }
                None => {
                    debug!(company = %company, field = %field, "Reference field missing from document");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}
