//! Reconciliation engine: drives each attachment of a selected message
//! through filter, extraction, resolution, validation and status write.
//!
//! Flow per attachment:
//! 1. Filter: only PDFs proceed
//! 2. Extract: table extractor populates the identifier and figures
//! 3. Resolve: identifier → company key
//! 4. Validate and write status for (company, message)
//!
//! Only mail transport and store failures escape as errors; everything else
//! ends in an [`AttachmentOutcome`] with a notice.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::document::Document;
use crate::error::PipelineError;
use crate::extract::TableExtractor;
use crate::mail::MailSession;
use crate::pipeline::types::{
    AttachmentOutcome, AttachmentReport, BatchReport, MessageFailure, MessageOutcome,
    MessageReport, Notice, Severity,
};
use crate::registry::{CompanyResolver, Resolution};
use crate::store::{CompanyKey, CompanyRegistry, ProcessingStatus, StatusStore};
use crate::validate::Validator;

/// Intermediate states of one (message, attachment) pair.
#[derive(Debug)]
enum Stage {
    Fetched(Document),
    Extracted(Document),
    Identified {
        document: Document,
        external_id: String,
    },
    Matched {
        document: Document,
        company: CompanyKey,
    },
    Done(AttachmentOutcome),
}

impl Stage {
    fn label(&self) -> &'static str {
        match self {
            Self::Fetched(_) => "fetched",
            Self::Extracted(_) => "extracted",
            Self::Identified { .. } => "identified",
            Self::Matched { .. } => "matched",
            Self::Done(_) => "done",
        }
    }
}

pub struct ReconciliationEngine {
    mail: Arc<dyn MailSession>,
    extractor: Arc<dyn TableExtractor>,
    resolver: CompanyResolver,
    statuses: Arc<dyn StatusStore>,
    validator: Arc<dyn Validator>,
}

impl ReconciliationEngine {
    pub fn new(
        mail: Arc<dyn MailSession>,
        extractor: Arc<dyn TableExtractor>,
        registry: Arc<dyn CompanyRegistry>,
        statuses: Arc<dyn StatusStore>,
        validator: Arc<dyn Validator>,
    ) -> Self {
        Self {
            mail,
            extractor,
            resolver: CompanyResolver::new(registry),
            statuses,
            validator,
        }
    }

    /// Process every attachment of one message.
    ///
    /// Attachments are independent: a skip on one never stops the others.
    /// A mail or store failure aborts the rest of this message.
    pub async fn process_message(&self, message_id: &str) -> Result<MessageReport, PipelineError> {
        info!(message_id, "Processing message");

        let attachments = self.mail.get_attachments(message_id).await?;
        if attachments.is_empty() {
            warn!(message_id, "Message has no attachments");
            return Ok(MessageReport {
                message_id: message_id.to_string(),
                outcome: MessageOutcome::NoAttachments,
                notices: vec![Notice::warning(format!(
                    "Message {message_id} has no attachments"
                ))],
            });
        }

        let mut notices = Vec::new();
        if attachments.len() > 1 {
            warn!(
                message_id,
                count = attachments.len(),
                "Message has several attachments, processing all"
            );
            notices.push(Notice::warning(format!(
                "Message {message_id} has {} attachments; processing all",
                attachments.len()
            )));
        }

        let mut reports = Vec::with_capacity(attachments.len());
        for (index, document) in attachments.into_iter().enumerate() {
            let name = document.display_name().to_string();
            let content_type = document.get_type().map(str::to_string);

            let outcome = self.process_attachment(message_id, document).await?;
            log_outcome(message_id, &name, &outcome);

            notices.push(outcome.notice(&name, message_id));
            reports.push(AttachmentReport {
                index,
                name,
                content_type,
                outcome,
            });
        }

        Ok(MessageReport {
            message_id: message_id.to_string(),
            outcome: MessageOutcome::Attachments(reports),
            notices,
        })
    }

    /// Process messages one after another.
    ///
    /// A message that fails is logged and recorded in the report; the batch
    /// carries on with the next one.
    pub async fn process_batch<I>(&self, message_ids: I) -> BatchReport
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut report = BatchReport::default();
        for message_id in message_ids {
            let message_id = message_id.as_ref();
            match self.process_message(message_id).await {
                Ok(message) => report.messages.push(message),
                Err(e) => {
                    error!(message_id, error = %e, "Failed to process message");
                    report.failures.push(MessageFailure {
                        message_id: message_id.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            messages = report.messages.len(),
            failed = report.failures.len(),
            processed = report.count("processed"),
            "Batch processing complete"
        );
        report
    }

    /// Run one attachment to its terminal outcome.
    async fn process_attachment(
        &self,
        message_id: &str,
        document: Document,
    ) -> Result<AttachmentOutcome, PipelineError> {
        let mut stage = Stage::Fetched(document);
        loop {
            stage = match stage {
                Stage::Done(outcome) => return Ok(outcome),
                current => {
                    debug!(message_id, stage = current.label(), "Advancing attachment");
                    self.advance(message_id, current).await?
                }
            };
        }
    }

    /// Single state transition.
    async fn advance(&self, message_id: &str, stage: Stage) -> Result<Stage, PipelineError> {
        let next = match stage {
            Stage::Fetched(mut document) => {
                if !document.is_pdf() {
                    return Ok(Stage::Done(AttachmentOutcome::Skipped {
                        declared_type: document.get_type().map(str::to_string),
                    }));
                }
                match self.extractor.extract(&mut document) {
                    Ok(fields) => {
                        debug!(message_id, document = %document, fields, "Extracted fields");
                        Stage::Extracted(document)
                    }
                    Err(e) => Stage::Done(AttachmentOutcome::Unidentified {
                        reason: e.to_string(),
                    }),
                }
            }

            Stage::Extracted(document) => match document.external_id() {
                Some(id) => Stage::Identified {
                    external_id: id.to_string(),
                    document,
                },
                None => Stage::Done(AttachmentOutcome::Unidentified {
                    reason: "no identifier field extracted".into(),
                }),
            },

            Stage::Identified {
                document,
                external_id,
            } => match self.resolver.resolve(Some(&external_id)).await? {
                Resolution::NotFound => Stage::Done(AttachmentOutcome::Unmatched { external_id }),
                Resolution::Ambiguous(candidates) => Stage::Done(AttachmentOutcome::Ambiguous {
                    external_id,
                    candidates,
                }),
                Resolution::Found(company) => Stage::Matched { document, company },
            },

            Stage::Matched { document, company } => {
                self.write_status(message_id, &document, company).await?
            }

            Stage::Done(outcome) => Stage::Done(outcome),
        };
        Ok(next)
    }

    /// Validate and record the status of (company, message).
    ///
    /// `processed` is terminal: it is never revalidated nor downgraded. A
    /// failed validation writes `processing` only when no status exists.
    async fn write_status(
        &self,
        message_id: &str,
        document: &Document,
        company: CompanyKey,
    ) -> Result<Stage, PipelineError> {
        if let Some(existing) = self.statuses.get_status(&company, message_id).await?
            && existing.is_terminal()
        {
            return Ok(Stage::Done(AttachmentOutcome::AlreadyProcessed { company }));
        }

        let outcome = if self
            .validator
            .compare_extracted_values(&company, document)
            .await?
        {
            self.statuses
                .set_status(&company, message_id, ProcessingStatus::Processed)
                .await?;
            AttachmentOutcome::Processed { company }
        } else {
            let status_written = self
                .statuses
                .set_status_if_absent(&company, message_id, ProcessingStatus::Processing)
                .await?;
            AttachmentOutcome::ValidationFailed {
                company,
                status_written,
            }
        };
        Ok(Stage::Done(outcome))
    }
}

fn log_outcome(message_id: &str, attachment: &str, outcome: &AttachmentOutcome) {
    let company = outcome.company().map(CompanyKey::as_str).unwrap_or("-");
    match outcome.severity() {
        Severity::Warning => warn!(
            message_id,
            attachment,
            company,
            outcome = outcome.label(),
            "Attachment needs attention"
        ),
        Severity::Info => info!(
            message_id,
            attachment,
            company,
            outcome = outcome.label(),
            "Attachment handled"
        ),
    }
}
