//! Error types for the document fetcher.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Mail transport errors. Fatal for the message being processed.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Authentication failed for {username}")]
    AuthFailed { username: String },

    #[error("IMAP command {command} failed: {response}")]
    Command { command: String, response: String },

    #[error("Malformed IMAP response: {0}")]
    Protocol(String),

    #[error("Mail session is not connected")]
    NotConnected,

    #[error("Message {0} not found")]
    MessageNotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Table extraction errors. Never fatal: the engine turns them into an
/// "unidentified document" outcome.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Unsupported document type: {0}")]
    UnsupportedType(String),

    #[error("PDF parse error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("No structured content found in {0}")]
    NoStructuredContent(String),
}

/// Document attribute errors.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Attribute not found: {0}")]
    MissingAttribute(String),
}

/// Pipeline errors. Only transport and store failures escape the engine.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Mail transport failed: {0}")]
    Mail(#[from] MailError),

    #[error("Store request failed: {0}")]
    Store(#[from] DatabaseError),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
