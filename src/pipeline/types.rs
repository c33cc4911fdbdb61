//! Outcome and report types produced by the reconciliation engine.

use std::fmt;

use serde::Serialize;

use crate::store::CompanyKey;

// ── Notices ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
        }
    }
}

/// User-visible note. Every skip or data-quality issue yields one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub severity: Severity,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity.label(), self.message)
    }
}

// ── Attachment outcome ──────────────────────────────────────────────

/// Terminal state of one (message, attachment) pair.
///
/// Only `Processed` and `ValidationFailed { status_written: true }` ever
/// write to the status store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttachmentOutcome {
    /// Not a PDF; filtered out before extraction.
    Skipped { declared_type: Option<String> },
    /// Extraction produced no identifier.
    Unidentified { reason: String },
    /// Identifier not in the registry.
    Unmatched { external_id: String },
    /// Identifier shared by several companies.
    Ambiguous {
        external_id: String,
        candidates: Vec<CompanyKey>,
    },
    /// The tuple was already `processed`; nothing was validated or written.
    AlreadyProcessed { company: CompanyKey },
    /// Validation succeeded and `processed` was written.
    Processed { company: CompanyKey },
    /// Validation failed. `processing` was written only if the tuple had no
    /// status yet.
    ValidationFailed {
        company: CompanyKey,
        status_written: bool,
    },
}

impl AttachmentOutcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped { .. } => "skipped",
            Self::Unidentified { .. } => "unidentified",
            Self::Unmatched { .. } => "unmatched",
            Self::Ambiguous { .. } => "ambiguous",
            Self::AlreadyProcessed { .. } => "already_processed",
            Self::Processed { .. } => "processed",
            Self::ValidationFailed { .. } => "validation_failed",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Ambiguous { .. } | Self::ValidationFailed { .. } => Severity::Warning,
            _ => Severity::Info,
        }
    }

    /// Company the attachment was matched to, if any.
    pub fn company(&self) -> Option<&CompanyKey> {
        match self {
            Self::AlreadyProcessed { company }
            | Self::Processed { company }
            | Self::ValidationFailed { company, .. } => Some(company),
            _ => None,
        }
    }

    /// User-visible notice for this outcome.
    pub fn notice(&self, attachment: &str, message_id: &str) -> Notice {
        let subject = format!("Attachment '{attachment}' of message {message_id}");
        let message = match self {
            Self::Skipped { declared_type } => format!(
                "{subject} skipped: type {} is not a PDF",
                declared_type.as_deref().unwrap_or("(unknown)")
            ),
            Self::Unidentified { reason } => {
                format!("{subject} is an unidentified document: {reason}")
            }
            Self::Unmatched { external_id } => {
                format!("{subject}: no company registered for identifier {external_id}")
            }
            Self::Ambiguous {
                external_id,
                candidates,
            } => {
                let keys: Vec<&str> = candidates.iter().map(CompanyKey::as_str).collect();
                format!(
                    "{subject}: identifier {external_id} matches {} companies ({}); registry needs cleanup",
                    candidates.len(),
                    keys.join(", ")
                )
            }
            Self::AlreadyProcessed { company } => {
                format!("{subject} already processed for company {company}")
            }
            Self::Processed { company } => {
                format!("{subject} processed for company {company}")
            }
            Self::ValidationFailed {
                company,
                status_written: true,
            } => format!(
                "{subject}: values did not validate for company {company}; marked as processing"
            ),
            Self::ValidationFailed {
                company,
                status_written: false,
            } => format!(
                "{subject}: values did not validate for company {company}; existing status kept"
            ),
        };
        Notice {
            severity: self.severity(),
            message,
        }
    }
}

// ── Reports ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentReport {
    /// Position within the message, 0-based.
    pub index: usize,
    pub name: String,
    pub content_type: Option<String>,
    pub outcome: AttachmentOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "attachments", rename_all = "snake_case")]
pub enum MessageOutcome {
    NoAttachments,
    Attachments(Vec<AttachmentReport>),
}

/// Everything that happened to one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageReport {
    pub message_id: String,
    pub outcome: MessageOutcome,
    pub notices: Vec<Notice>,
}

impl MessageReport {
    pub fn attachments(&self) -> &[AttachmentReport] {
        match &self.outcome {
            MessageOutcome::NoAttachments => &[],
            MessageOutcome::Attachments(reports) => reports,
        }
    }
}

/// A message whose processing was aborted by a transport or store failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageFailure {
    pub message_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub messages: Vec<MessageReport>,
    pub failures: Vec<MessageFailure>,
}

impl BatchReport {
    /// All notices in message order, failures last.
    pub fn notices(&self) -> Vec<Notice> {
        let mut notices: Vec<Notice> = self
            .messages
            .iter()
            .flat_map(|m| m.notices.iter().cloned())
            .collect();
        notices.extend(self.failures.iter().map(|f| {
            Notice::warning(format!("Message {} failed: {}", f.message_id, f.error))
        }));
        notices
    }

    /// Number of attachments that ended in `label`.
    pub fn count(&self, label: &str) -> usize {
        self.messages
            .iter()
            .flat_map(MessageReport::attachments)
            .filter(|a| a.outcome.label() == label)
            .count()
    }
}
