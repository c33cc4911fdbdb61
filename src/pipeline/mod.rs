//! Reconciliation pipeline.
//!
//! Every attachment of a selected message flows through:
//! 1. PDF filter
//! 2. `TableExtractor::extract()` for the identifier and figures
//! 3. `CompanyResolver::resolve()` against the registry
//! 4. `Validator` and the conditional status write
//!
//! **`processed` is never downgraded.** A failed validation only writes
//! `processing` when the (company, message) tuple has no status yet.

pub mod engine;
pub mod types;

pub use engine::ReconciliationEngine;
pub use types::{
    AttachmentOutcome, AttachmentReport, BatchReport, MessageFailure, MessageOutcome,
    MessageReport, Notice, Severity,
};
