//! Tracing setup: console output plus an optional `application.log` file.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Name of the log file written inside `LOG_PATH`.
pub const LOG_FILE_NAME: &str = "application.log";

/// Map a numeric `LOG_LEVEL` (10 debug .. 50 critical) to a filter directive.
///
/// Values between the named levels round down, so `25` means `info`.
pub fn level_from_numeric(raw: &str) -> Option<&'static str> {
    let level: u32 = raw.trim().parse().ok()?;
    let directive = match level {
        0..=9 => "trace",
        10..=19 => "debug",
        20..=29 => "info",
        30..=39 => "warn",
        _ => "error",
    };
    Some(directive)
}

/// Resolve the filter: `RUST_LOG` first, then `LOG_LEVEL`, then `info`.
fn build_filter() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let directive = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|raw| level_from_numeric(&raw))
        .unwrap_or("info");
    EnvFilter::new(directive)
}

/// Install the global subscriber.
///
/// When `log_dir` is given, events are also written to
/// `<log_dir>/application.log` through a non-blocking writer. Keep the
/// returned guard alive for the lifetime of the program or buffered lines
/// are lost on exit.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let console = fmt::layer().with_target(false);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer().with_ansi(false).with_writer(writer);
            tracing_subscriber::registry()
                .with(build_filter())
                .with(console)
                .with(file)
                .init();
            tracing::debug!(dir = %dir.display(), "File logging enabled");
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(build_filter())
                .with(console)
                .init();
            None
        }
    }
}
