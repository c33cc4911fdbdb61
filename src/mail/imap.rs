//! IMAP-over-TLS mail session.
//!
//! The protocol runs on a blocking rustls stream; every call hops onto the
//! blocking pool so the async engine never stalls on socket I/O.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::ExposeSecret;

use crate::config::MailConfig;
use crate::document::Document;
use crate::error::MailError;
use crate::mail::protocol::ImapConnection;
use crate::mail::{MailSession, MessageMeta, mime};

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;
type Connection = ImapConnection<TlsStream>;

/// Mail session backed by a single IMAP connection.
///
/// The connection is opened by [`MailSession::connect`] and released by
/// [`MailSession::close`]. Dropping a still-open session logs out on a
/// best-effort basis; inside a runtime that logout runs on the blocking
/// pool and is not awaited, so call `close` when the outcome matters.
pub struct ImapSession {
    config: MailConfig,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl ImapSession {
    pub fn new(config: MailConfig) -> Self {
        Self {
            config,
            conn: Arc::new(Mutex::new(None)),
        }
    }

    /// Run `f` against the open connection on the blocking pool.
    async fn with_connection<T, F>(&self, f: F) -> Result<T, MailError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, MailError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| MailError::Transport("mail connection lock poisoned".into()))?;
            let connection = guard.as_mut().ok_or(MailError::NotConnected)?;
            f(connection)
        })
        .await
        .map_err(|e| MailError::Transport(format!("mail task failed: {e}")))?
    }
}

/// TCP + TLS handshake, greeting, login and inbox selection.
fn open(config: &MailConfig) -> Result<Connection, MailError> {
    let connect_err = |reason: String| MailError::Connect {
        host: config.imap_host.clone(),
        port: config.imap_port,
        reason,
    };

    let tcp = TcpStream::connect((config.imap_host.as_str(), config.imap_port))
        .map_err(|e| connect_err(e.to_string()))?;
    tcp.set_read_timeout(Some(config.read_timeout))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name = rustls_pki_types::ServerName::try_from(config.imap_host.clone())
        .map_err(|e| MailError::Tls(format!("invalid server name: {e}")))?;
    let tls = rustls::ClientConnection::new(tls_config, server_name)
        .map_err(|e| MailError::Tls(e.to_string()))?;

    let mut conn = ImapConnection::from_stream(rustls::StreamOwned::new(tls, tcp))?;
    start_session(&mut conn, config)?;
    Ok(conn)
}

/// Log in and select the configured inbox, or `INBOX` when none is set.
///
/// Message commands are only valid in the selected state, so a session is
/// never handed out without a selected mailbox.
fn start_session<S: Read + Write>(
    conn: &mut ImapConnection<S>,
    config: &MailConfig,
) -> Result<(), MailError> {
    conn.login(&config.username, config.password.expose_secret())?;
    conn.select(config.inbox_name())
}

/// Best-effort logout of a connection nobody will use again.
///
/// Inside a tokio runtime the round-trip is moved onto the blocking pool
/// and its handle returned; outside one it runs inline.
fn release<S>(
    mut conn: ImapConnection<S>,
) -> Option<tokio::task::JoinHandle<Result<(), MailError>>>
where
    S: Read + Write + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Some(handle.spawn_blocking(move || {
            let result = conn.logout();
            log_release(&result);
            result
        })),
        Err(_) => {
            log_release(&conn.logout());
            None
        }
    }
}

fn log_release(result: &Result<(), MailError>) {
    match result {
        Ok(()) => tracing::info!("Mail session logged out on drop"),
        Err(e) => tracing::warn!("Logout on drop failed: {e}"),
    }
}

#[async_trait]
impl MailSession for ImapSession {
    async fn connect(&self) -> Result<(), MailError> {
        let config = self.config.clone();
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let connection = open(&config)?;
            let mut guard = conn
                .lock()
                .map_err(|_| MailError::Transport("mail connection lock poisoned".into()))?;
            if let Some(mut previous) = guard.replace(connection) {
                let _ = previous.logout();
            }
            Ok::<_, MailError>(())
        })
        .await
        .map_err(|e| MailError::Transport(format!("mail task failed: {e}")))??;

        tracing::info!(
            host = %self.config.imap_host,
            user = %self.config.username,
            inbox = self.config.inbox_name(),
            "Mail session connected"
        );
        Ok(())
    }

    async fn select_inbox(&self, inbox: &str) -> Result<(), MailError> {
        let name = inbox.to_string();
        self.with_connection(move |c| c.select(&name)).await?;
        tracing::debug!(inbox, "Selected inbox");
        Ok(())
    }

    async fn list_inboxes(&self) -> Result<Vec<String>, MailError> {
        self.with_connection(|c| c.list()).await
    }

    async fn list_messages(&self) -> Result<BTreeMap<String, MessageMeta>, MailError> {
        self.with_connection(|c| {
            let uids = c.search_all()?;
            let headers = c.fetch_headers(&uids)?;
            Ok(headers
                .into_iter()
                .map(|(uid, raw)| {
                    let meta = mime::meta_from_headers(&uid, &raw);
                    (uid, meta)
                })
                .collect())
        })
        .await
    }

    async fn get_attachments(&self, message_id: &str) -> Result<Vec<Document>, MailError> {
        let uid = message_id.to_string();
        let raw = self.with_connection(move |c| c.fetch_message(&uid)).await?;
        let documents = mime::attachments_from_message(&raw)?;
        tracing::debug!(
            message_id,
            bytes = raw.len(),
            attachments = documents.len(),
            "Fetched message"
        );
        Ok(documents)
    }

    async fn close(&self) -> Result<(), MailError> {
        let conn = Arc::clone(&self.conn);
        let taken = tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| MailError::Transport("mail connection lock poisoned".into()))?;
            match guard.take() {
                Some(mut connection) => connection.logout().map(|_| true),
                None => Ok(false),
            }
        })
        .await
        .map_err(|e| MailError::Transport(format!("mail task failed: {e}")))??;

        if taken {
            tracing::info!("Mail session closed");
        }
        Ok(())
    }
}

impl Drop for ImapSession {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.conn.lock()
            && let Some(connection) = guard.take()
        {
            let _ = release(connection);
        }
    }
}
