//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default IMAPS port.
const DEFAULT_IMAP_PORT: u16 = 993;

/// Default socket read timeout for the IMAP session.
const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

/// Mailbox selected when `MAIL_INBOX` is unset.
pub const DEFAULT_INBOX: &str = "INBOX";

const DEFAULT_DB_PATH: &str = "./data/doc-fetcher.db";

/// Mail session connection parameters.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub username: String,
    pub password: SecretString,
    /// Inbox selected right after login. `None` selects [`DEFAULT_INBOX`].
    pub inbox: Option<String>,
    pub read_timeout: Duration,
}

impl MailConfig {
    /// Build config from the process environment.
    ///
    /// Required: `MAIL_IMAP_HOST`, `MAIL_USERNAME`, `MAIL_PASSWORD`.
    /// Optional: `MAIL_IMAP_PORT` (993), `MAIL_INBOX` (`INBOX`),
    /// `MAIL_READ_TIMEOUT_SECS` (30).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let imap_host = required("MAIL_IMAP_HOST")?;
        let username = required("MAIL_USERNAME")?;
        let password = SecretString::from(required("MAIL_PASSWORD")?);

        let imap_port = match lookup("MAIL_IMAP_PORT") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "MAIL_IMAP_PORT".into(),
                message: format!("{raw:?}: {e}"),
            })?,
            None => DEFAULT_IMAP_PORT,
        };

        let read_timeout_secs: u64 = match lookup("MAIL_READ_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "MAIL_READ_TIMEOUT_SECS".into(),
                message: format!("{raw:?}: {e}"),
            })?,
            None => DEFAULT_READ_TIMEOUT_SECS,
        };

        let inbox = lookup("MAIL_INBOX")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            imap_host,
            imap_port,
            username,
            password,
            inbox,
            read_timeout: Duration::from_secs(read_timeout_secs),
        })
    }

    /// Inbox to select after login.
    pub fn inbox_name(&self) -> &str {
        self.inbox.as_deref().unwrap_or(DEFAULT_INBOX)
    }
}

/// Application-level settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Directory for `application.log`. Console-only logging when unset.
    pub log_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("DOC_FETCHER_DB_PATH")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let log_path = lookup("LOG_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Self {
            db_path: PathBuf::from(db_path),
            log_path,
        }
    }
}
