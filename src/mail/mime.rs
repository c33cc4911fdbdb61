//! RFC 822 parsing: message headers to [`MessageMeta`], attachments to
//! [`Document`]s.

use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders};

use crate::document::Document;
use crate::error::MailError;
use crate::mail::MessageMeta;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Build listing metadata from a raw header block. Unparseable headers
/// still yield an entry carrying just the id.
pub fn meta_from_headers(id: &str, raw: &[u8]) -> MessageMeta {
    let mut meta = MessageMeta {
        id: id.to_string(),
        ..MessageMeta::default()
    };
    let Some(parsed) = MessageParser::default().parse(raw) else {
        return meta;
    };

    meta.from = extract_sender(&parsed);
    meta.subject = parsed.subject().map(str::to_string);
    meta.date = parsed
        .date()
        .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0));
    meta.message_id = parsed.message_id().map(str::to_string);
    meta
}

/// Every attachment part of a message as a [`Document`], in message order.
///
/// Parts without a filename get `attachment-<n>` (1-based); parts without a
/// content type are treated as opaque binary.
pub fn attachments_from_message(raw: &[u8]) -> Result<Vec<Document>, MailError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| MailError::Protocol("message could not be parsed".into()))?;

    let documents = parsed
        .attachments()
        .enumerate()
        .map(|(i, part)| {
            let part: &mail_parser::MessagePart = part;
            let content_type = MimeHeaders::content_type(part)
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .map(|ct| ct.to_ascii_lowercase())
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
            let name = MimeHeaders::attachment_name(part)
                .map(str::to_string)
                .unwrap_or_else(|| format!("attachment-{}", i + 1));

            Document::new(part.contents().to_vec(), Some(&content_type), Some(&name))
        })
        .collect();
    Ok(documents)
}

fn extract_sender(parsed: &mail_parser::Message) -> Option<String> {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &str = "From: Reports <reports@bank.example>\r
To: intake@example.com\r
Subject: Meldung Q4\r
Date: Tue, 1 Oct 2024 10:00:00 +0000\r
Message-ID: <abc@bank.example>\r
MIME-Version: 1.0\r
Content-Type: multipart/mixed; boundary=\"XYZ\"\r
\r
--XYZ\r
Content-Type: text/plain; charset=utf-8\r
\r
Please find attached.\r
--XYZ\r
Content-Type: application/pdf; name=\"report.pdf\"\r
Content-Disposition: attachment; filename=\"report.pdf\"\r
Content-Transfer-Encoding: base64\r
\r
JVBERi0xLjQK\r
--XYZ\r
Content-Type: text/csv\r
Content-Disposition: attachment\r
\r
a;b\r
--XYZ--\r
";

    #[test]
    fn attachments_become_documents() {
        let docs = attachments_from_message(MESSAGE.as_bytes()).unwrap();
        assert_eq!(docs.len(), 2);

        assert_eq!(docs[0].get_name(), Some("report.pdf"));
        assert_eq!(docs[0].get_type(), Some("application/pdf"));
        assert_eq!(docs[0].get_file(), b"%PDF-1.4\n");
        assert!(docs[0].is_pdf());

        assert_eq!(docs[1].get_name(), Some("attachment-2"));
        assert_eq!(docs[1].get_type(), Some("text/csv"));
        assert!(!docs[1].is_pdf());
    }

    #[test]
    fn message_without_attachments() {
        let raw = b"From: a@b.example\r\nSubject: hi\r\n\r\nno files here\r\n";
        assert!(attachments_from_message(raw).unwrap().is_empty());
    }

    #[test]
    fn headers_become_metadata() {
        let meta = meta_from_headers("42", MESSAGE.as_bytes());
        assert_eq!(meta.id, "42");
        assert_eq!(meta.from.as_deref(), Some("reports@bank.example"));
        assert_eq!(meta.subject.as_deref(), Some("Meldung Q4"));
        assert_eq!(meta.message_id.as_deref(), Some("abc@bank.example"));
        assert_eq!(
            meta.date.map(|d| d.to_rfc3339()),
            Some("2024-10-01T10:00:00+00:00".to_string())
        );
    }

    #[test]
    fn sparse_headers_leave_fields_empty() {
        let meta = meta_from_headers("7", b"X-Custom: 1\r\n\r\n");
        assert_eq!(meta.id, "7");
        assert!(meta.from.is_none());
        assert!(meta.subject.is_none());
        assert!(meta.date.is_none());
    }
}
