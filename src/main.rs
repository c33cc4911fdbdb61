use std::sync::Arc;

use anyhow::Context;

use doc_fetcher::config::{AppConfig, MailConfig};
use doc_fetcher::extract::PdfTableExtractor;
use doc_fetcher::logging;
use doc_fetcher::mail::{ImapSession, MailSession};
use doc_fetcher::pipeline::{BatchReport, ReconciliationEngine};
use doc_fetcher::store::{LibSqlBackend, ProcessingStatus, StatusStore};
use doc_fetcher::validate::ReferenceValidator;

const USAGE: &str = "usage: doc-fetcher [--json] [MESSAGE_ID ...]

Without message ids, lists inboxes and messages and prints the status summary.
With message ids, reconciles the attachments of those messages.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let mut json = false;
    let mut message_ids = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--json" => json = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(());
            }
            _ => message_ids.push(arg),
        }
    }

    let app = AppConfig::from_env();
    let _log_guard = logging::init(app.log_path.as_deref());
    let mail_config = MailConfig::from_env().context("loading mail configuration")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "doc-fetcher starting");

    // ── Database ─────────────────────────────────────────────────────────
    let db = Arc::new(
        LibSqlBackend::new_local(&app.db_path)
            .await
            .with_context(|| format!("opening database at {}", app.db_path.display()))?,
    );

    // ── Mail ─────────────────────────────────────────────────────────────
    let session = Arc::new(ImapSession::new(mail_config));
    session.connect().await.context("connecting to mail server")?;

    let result = if message_ids.is_empty() {
        overview(session.as_ref(), db.as_ref(), json).await
    } else {
        let engine = ReconciliationEngine::new(
            session.clone(),
            Arc::new(PdfTableExtractor::new()),
            db.clone(),
            db.clone(),
            Arc::new(ReferenceValidator::new(db.clone())),
        );
        let report = engine.process_batch(&message_ids).await;
        print_report(&report, json)
    };

    if let Err(e) = session.close().await {
        tracing::warn!("Failed to close mail session: {e}");
    }
    result
}

/// Inboxes, messages of the selected inbox and the status summary.
async fn overview(
    session: &dyn MailSession,
    statuses: &dyn StatusStore,
    json: bool,
) -> anyhow::Result<()> {
    let inboxes = session.list_inboxes().await?;
    let messages = session.list_messages().await?;
    let counts = statuses.status_counts().await?;

    if json {
        let value = serde_json::json!({
            "inboxes": inboxes,
            "messages": messages.values().collect::<Vec<_>>(),
            "statuses": counts,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Inboxes:");
    for inbox in &inboxes {
        println!("  {inbox}");
    }

    let mut listed: Vec<_> = messages.values().collect();
    listed.sort_by_key(|m| m.id.parse::<u64>().unwrap_or(u64::MAX));
    println!("\nMessages ({}):", listed.len());
    for meta in listed {
        println!(
            "  {:>6}  {}  {:<30}  {}",
            meta.id,
            meta.date
                .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".repeat(16)),
            meta.from.as_deref().unwrap_or("-"),
            meta.subject.as_deref().unwrap_or("(no subject)"),
        );
    }

    println!("\nStatus summary ({} tuples):", counts.total());
    for status in ProcessingStatus::ALL {
        println!("  {:<11} {}", status.as_str(), counts.get(status));
    }
    Ok(())
}

fn print_report(report: &BatchReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        for notice in report.notices() {
            println!("{notice}");
        }
    }
    if !report.failures.is_empty() {
        anyhow::bail!("{} message(s) failed", report.failures.len());
    }
    Ok(())
}
