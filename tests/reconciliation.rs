//! Integration tests for the reconciliation engine.
//!
//! Mail and extraction are stubbed; the registry, status store and
//! validator are the real libSQL-backed implementations on an in-memory
//! database.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use doc_fetcher::document::{AttributeValue, Document, EXTERNAL_ID};
use doc_fetcher::error::{DatabaseError, ExtractError, MailError};
use doc_fetcher::extract::TableExtractor;
use doc_fetcher::mail::{MailSession, MessageMeta};
use doc_fetcher::pipeline::{AttachmentOutcome, MessageOutcome, ReconciliationEngine, Severity};
use doc_fetcher::store::{
    CompanyKey, CompanyRegistry, LibSqlBackend, ProcessingStatus, StatusStore,
};
use doc_fetcher::validate::ReferenceValidator;

/// Stub mail session: canned attachments per message id, optional
/// transport failures.
#[derive(Default)]
struct StubMail {
    messages: HashMap<String, Vec<Document>>,
    broken: Vec<String>,
}

impl StubMail {
    fn with(mut self, message_id: &str, attachments: Vec<Document>) -> Self {
        self.messages.insert(message_id.to_string(), attachments);
        self
    }

    fn broken(mut self, message_id: &str) -> Self {
        self.broken.push(message_id.to_string());
        self
    }
}

#[async_trait]
impl MailSession for StubMail {
    async fn connect(&self) -> Result<(), MailError> {
        Ok(())
    }
    async fn select_inbox(&self, _inbox: &str) -> Result<(), MailError> {
        Ok(())
    }
    async fn list_inboxes(&self) -> Result<Vec<String>, MailError> {
        Ok(vec!["INBOX".into()])
    }
    async fn list_messages(&self) -> Result<BTreeMap<String, MessageMeta>, MailError> {
        Ok(self
            .messages
            .keys()
            .map(|id| {
                (
                    id.clone(),
                    MessageMeta {
                        id: id.clone(),
                        ..MessageMeta::default()
                    },
                )
            })
            .collect())
    }
    async fn get_attachments(&self, message_id: &str) -> Result<Vec<Document>, MailError> {
        if self.broken.iter().any(|id| id == message_id) {
            return Err(MailError::Transport("connection reset".into()));
        }
        self.messages
            .get(message_id)
            .cloned()
            .ok_or_else(|| MailError::MessageNotFound(message_id.to_string()))
    }
    async fn close(&self) -> Result<(), MailError> {
        Ok(())
    }
}

/// Stub extractor: fields keyed by attachment name. Unknown names have no
/// structured content.
#[derive(Default)]
struct StubExtractor {
    fields: HashMap<String, Vec<(String, AttributeValue)>>,
    calls: AtomicUsize,
}

impl StubExtractor {
    fn with(mut self, name: &str, fields: &[(&str, AttributeValue)]) -> Self {
        self.fields.insert(
            name.to_string(),
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        );
        self
    }
}

impl TableExtractor for StubExtractor {
    fn extract(&self, document: &mut Document) -> Result<usize, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = document.display_name().to_string();
        match self.fields.get(&name) {
            Some(fields) => {
                document.add_attributes(fields.clone());
                Ok(fields.len())
            }
            None => Err(ExtractError::NoStructuredContent(name)),
        }
    }
}

/// Registry wrapper counting identifier lookups.
struct CountingRegistry {
    inner: Arc<LibSqlBackend>,
    lookups: AtomicUsize,
}

#[async_trait]
impl CompanyRegistry for CountingRegistry {
    async fn find_company_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Vec<CompanyKey>, DatabaseError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_company_by_external_id(external_id).await
    }
    async fn reference_values(
        &self,
        company: &CompanyKey,
    ) -> Result<BTreeMap<String, Decimal>, DatabaseError> {
        self.inner.reference_values(company).await
    }
    async fn register_company(
        &self,
        external_id: &str,
        name: Option<&str>,
    ) -> Result<CompanyKey, DatabaseError> {
        self.inner.register_company(external_id, name).await
    }
    async fn set_reference_value(
        &self,
        company: &CompanyKey,
        field: &str,
        value: Decimal,
    ) -> Result<(), DatabaseError> {
        self.inner.set_reference_value(company, field, value).await
    }
}

struct Harness {
    engine: ReconciliationEngine,
    db: Arc<LibSqlBackend>,
    registry: Arc<CountingRegistry>,
    extractor: Arc<StubExtractor>,
}

async fn harness(mail: StubMail, extractor: StubExtractor) -> Harness {
    let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let registry = Arc::new(CountingRegistry {
        inner: db.clone(),
        lookups: AtomicUsize::new(0),
    });
    let extractor = Arc::new(extractor);
    let engine = ReconciliationEngine::new(
        Arc::new(mail),
        extractor.clone(),
        registry.clone(),
        db.clone(),
        Arc::new(ReferenceValidator::new(db.clone())),
    );
    Harness {
        engine,
        db,
        registry,
        extractor,
    }
}

fn pdf(name: &str) -> Document {
    Document::new(b"%PDF-1.4".to_vec(), Some("application/pdf"), Some(name))
}

fn id(value: &str) -> (&'static str, AttributeValue) {
    (EXTERNAL_ID, AttributeValue::from(value))
}

fn amount(key: &'static str, value: Decimal) -> (&'static str, AttributeValue) {
    (key, AttributeValue::from(value))
}

/// Register a company with a single `total_assets` reference figure.
async fn company(db: &LibSqlBackend, external_id: &str, total_assets: Decimal) -> CompanyKey {
    let key = db.register_company(external_id, None).await.unwrap();
    db.set_reference_value(&key, "total_assets", total_assets)
        .await
        .unwrap();
    key
}

#[tokio::test]
async fn pdf_matching_one_company_is_processed_and_other_attachment_skipped() {
    let mail = StubMail::default().with(
        "M1",
        vec![
            pdf("report.pdf"),
            Document::new(b"a;b".to_vec(), Some("text/csv"), Some("figures.csv")),
        ],
    );
    let extractor = StubExtractor::default().with(
        "report.pdf",
        &[id("BAFIN-001"), amount("total_assets", dec!(1000))],
    );
    let h = harness(mail, extractor).await;
    let key = company(&h.db, "BAFIN-001", dec!(1000)).await;

    let report = h.engine.process_message("M1").await.unwrap();

    let attachments = report.attachments();
    assert_eq!(attachments.len(), 2);
    assert_eq!(
        attachments[0].outcome,
        AttachmentOutcome::Processed {
            company: key.clone()
        }
    );
    assert_eq!(
        attachments[1].outcome,
        AttachmentOutcome::Skipped {
            declared_type: Some("text/csv".into())
        }
    );
    assert_eq!(
        h.db.get_status(&key, "M1").await.unwrap(),
        Some(ProcessingStatus::Processed)
    );

    // Exactly one status row: the CSV wrote nothing and was never extracted.
    assert_eq!(h.db.status_counts().await.unwrap().total(), 1);
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 1);

    let csv_notice = report
        .notices
        .iter()
        .find(|n| n.message.contains("figures.csv"))
        .unwrap();
    assert_eq!(csv_notice.severity, Severity::Info);
    assert!(
        report
            .notices
            .iter()
            .any(|n| n.severity == Severity::Warning && n.message.contains("processing all"))
    );
}

#[tokio::test]
async fn pdf_without_identifier_is_unidentified_without_lookup_or_write() {
    let mail = StubMail::default().with("M2", vec![pdf("scan.pdf")]);
    let h = harness(mail, StubExtractor::default()).await;
    company(&h.db, "BAFIN-001", dec!(1000)).await;

    let report = h.engine.process_message("M2").await.unwrap();

    assert!(matches!(
        report.attachments()[0].outcome,
        AttachmentOutcome::Unidentified { .. }
    ));
    assert_eq!(h.registry.lookups.load(Ordering::SeqCst), 0);
    assert_eq!(h.db.status_counts().await.unwrap().total(), 0);

    let unidentified: Vec<_> = report
        .notices
        .iter()
        .filter(|n| n.message.contains("unidentified"))
        .collect();
    assert_eq!(unidentified.len(), 1);
}

#[tokio::test]
async fn identifier_shared_by_two_companies_is_ambiguous_without_write() {
    let mail = StubMail::default().with("M3", vec![pdf("report.pdf")]);
    let extractor = StubExtractor::default().with(
        "report.pdf",
        &[id("BAFIN-003"), amount("total_assets", dec!(5))],
    );
    let h = harness(mail, extractor).await;
    let a = company(&h.db, "BAFIN-003", dec!(5)).await;
    let b = company(&h.db, "BAFIN-003", dec!(5)).await;

    let report = h.engine.process_message("M3").await.unwrap();

    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(
        report.attachments()[0].outcome,
        AttachmentOutcome::Ambiguous {
            external_id: "BAFIN-003".into(),
            candidates: expected,
        }
    );
    assert_eq!(h.db.status_counts().await.unwrap().total(), 0);
    assert!(
        report
            .notices
            .iter()
            .any(|n| n.severity == Severity::Warning && n.message.contains("matches 2 companies"))
    );
}

#[tokio::test]
async fn failed_validation_never_downgrades_processed() {
    let mail = StubMail::default().with("M4", vec![pdf("report.pdf")]);
    let extractor = StubExtractor::default().with(
        "report.pdf",
        &[id("BAFIN-001"), amount("total_assets", dec!(1))],
    );
    let h = harness(mail, extractor).await;
    let key = company(&h.db, "BAFIN-001", dec!(1000)).await;
    h.db.set_status(&key, "M4", ProcessingStatus::Processed)
        .await
        .unwrap();

    let report = h.engine.process_message("M4").await.unwrap();

    assert_eq!(
        report.attachments()[0].outcome,
        AttachmentOutcome::AlreadyProcessed {
            company: key.clone()
        }
    );
    assert_eq!(
        h.db.get_status(&key, "M4").await.unwrap(),
        Some(ProcessingStatus::Processed)
    );
}

#[tokio::test]
async fn failed_validation_marks_processing_only_when_absent() {
    let mail = StubMail::default()
        .with("M5", vec![pdf("report.pdf")])
        .with("M6", vec![pdf("report.pdf")]);
    let extractor = StubExtractor::default().with(
        "report.pdf",
        &[id("BAFIN-001"), amount("total_assets", dec!(1))],
    );
    let h = harness(mail, extractor).await;
    let key = company(&h.db, "BAFIN-001", dec!(1000)).await;
    h.db.set_status(&key, "M6", ProcessingStatus::Unmatched)
        .await
        .unwrap();

    let fresh = h.engine.process_message("M5").await.unwrap();
    assert_eq!(
        fresh.attachments()[0].outcome,
        AttachmentOutcome::ValidationFailed {
            company: key.clone(),
            status_written: true,
        }
    );
    assert_eq!(
        h.db.get_status(&key, "M5").await.unwrap(),
        Some(ProcessingStatus::Processing)
    );

    let existing = h.engine.process_message("M6").await.unwrap();
    assert_eq!(
        existing.attachments()[0].outcome,
        AttachmentOutcome::ValidationFailed {
            company: key.clone(),
            status_written: false,
        }
    );
    assert_eq!(
        h.db.get_status(&key, "M6").await.unwrap(),
        Some(ProcessingStatus::Unmatched)
    );
}

#[tokio::test]
async fn later_success_upgrades_processing_to_processed() {
    let mail = StubMail::default()
        .with("M7", vec![pdf("draft.pdf"), pdf("final.pdf")]);
    let extractor = StubExtractor::default()
        .with("draft.pdf", &[id("BAFIN-001"), amount("total_assets", dec!(1))])
        .with(
            "final.pdf",
            &[id("BAFIN-001"), amount("total_assets", dec!(1000.00))],
        );
    let h = harness(mail, extractor).await;
    let key = company(&h.db, "BAFIN-001", dec!(1000)).await;

    let report = h.engine.process_message("M7").await.unwrap();

    let labels: Vec<_> = report
        .attachments()
        .iter()
        .map(|a| a.outcome.label())
        .collect();
    assert_eq!(labels, vec!["validation_failed", "processed"]);
    assert_eq!(
        h.db.get_status(&key, "M7").await.unwrap(),
        Some(ProcessingStatus::Processed)
    );
}

#[tokio::test]
async fn unknown_identifier_is_unmatched() {
    let mail = StubMail::default().with("M8", vec![pdf("report.pdf")]);
    let extractor = StubExtractor::default().with("report.pdf", &[id("BAFIN-404")]);
    let h = harness(mail, extractor).await;
    company(&h.db, "BAFIN-001", dec!(1000)).await;

    let report = h.engine.process_message("M8").await.unwrap();

    assert_eq!(
        report.attachments()[0].outcome,
        AttachmentOutcome::Unmatched {
            external_id: "BAFIN-404".into()
        }
    );
    assert_eq!(h.registry.lookups.load(Ordering::SeqCst), 1);
    assert_eq!(h.db.status_counts().await.unwrap().total(), 0);
}

#[tokio::test]
async fn message_without_attachments_reports_warning() {
    let mail = StubMail::default().with("M9", vec![]);
    let h = harness(mail, StubExtractor::default()).await;

    let report = h.engine.process_message("M9").await.unwrap();

    assert_eq!(report.outcome, MessageOutcome::NoAttachments);
    assert_eq!(report.notices.len(), 1);
    assert_eq!(report.notices[0].severity, Severity::Warning);
    assert!(report.notices[0].message.contains("no attachments"));
}

#[tokio::test]
async fn octet_stream_pdf_by_name_is_extracted() {
    let mail = StubMail::default().with(
        "M10",
        vec![Document::new(
            b"%PDF-1.4".to_vec(),
            Some("application/octet-stream"),
            Some("REPORT.PDF"),
        )],
    );
    let extractor = StubExtractor::default().with(
        "REPORT.PDF",
        &[id("BAFIN-001"), amount("total_assets", dec!(1000))],
    );
    let h = harness(mail, extractor).await;
    let key = company(&h.db, "BAFIN-001", dec!(1000)).await;

    let report = h.engine.process_message("M10").await.unwrap();

    assert_eq!(
        report.attachments()[0].outcome,
        AttachmentOutcome::Processed { company: key }
    );
}

#[tokio::test]
async fn transport_failure_aborts_only_that_message() {
    let mail = StubMail::default()
        .with("A", vec![pdf("report.pdf")])
        .broken("B")
        .with("C", vec![pdf("report.pdf")]);
    let extractor = StubExtractor::default().with(
        "report.pdf",
        &[id("BAFIN-001"), amount("total_assets", dec!(1000))],
    );
    let h = harness(mail, extractor).await;
    let key = company(&h.db, "BAFIN-001", dec!(1000)).await;

    let batch = h.engine.process_batch(["A", "B", "C"]).await;

    let processed: Vec<_> = batch.messages.iter().map(|m| m.message_id.as_str()).collect();
    assert_eq!(processed, vec!["A", "C"]);
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].message_id, "B");
    assert!(batch.failures[0].error.contains("connection reset"));
    assert_eq!(batch.count("processed"), 2);

    for message_id in ["A", "C"] {
        assert_eq!(
            h.db.get_status(&key, message_id).await.unwrap(),
            Some(ProcessingStatus::Processed)
        );
    }
}
