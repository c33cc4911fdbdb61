//! Mail session boundary: inbox selection, message listing and attachment
//! retrieval.

pub mod imap;
pub mod mime;
pub mod protocol;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::document::Document;
use crate::error::MailError;

pub use imap::ImapSession;

/// Listing entry for one message in the selected inbox.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessageMeta {
    /// Session-scoped message id (the IMAP UID).
    pub id: String,
    pub from: Option<String>,
    pub subject: Option<String>,
    pub date: Option<DateTime<Utc>>,
    /// `Message-ID` header, if any.
    pub message_id: Option<String>,
}

/// An authenticated session against a mail server.
///
/// Every failure here is a transport failure and fatal for the message
/// being processed.
#[async_trait]
pub trait MailSession: Send + Sync {
    /// Open and authenticate the session.
    async fn connect(&self) -> Result<(), MailError>;

    async fn select_inbox(&self, inbox: &str) -> Result<(), MailError>;

    async fn list_inboxes(&self) -> Result<Vec<String>, MailError>;

    /// Messages in the selected inbox, keyed by message id.
    async fn list_messages(&self) -> Result<BTreeMap<String, MessageMeta>, MailError>;

    /// All attachments of a message, in message order.
    async fn get_attachments(&self, message_id: &str) -> Result<Vec<Document>, MailError>;

    /// Log out and release the connection. Closing twice is a no-op.
    async fn close(&self) -> Result<(), MailError>;
}
