use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";
const LOG_FILE: &str = "client.log";

/// Keeps the non-blocking writer flushing; hold it until exit.
pub struct LoggingHandle {
    pub run_id: String,
    pub guard: WorkerGuard,
}

/// File logging only: stdout belongs to the REPL.
pub fn init_logging(log_dir: &Path) -> anyhow::Result<LoggingHandle> {
    std::fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join(LOG_FILE);

    let (filter_source, filter) = select_filter(
        std::env::var("CHATSTREAM_LOG_FILTER").ok(),
        std::env::var("RUST_LOG").ok(),
    );
    let filter_directives = filter.to_string();

    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let format = std::env::var("CHATSTREAM_LOG_FORMAT").unwrap_or_else(|_| "json".into());

    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("pretty") {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .pretty()
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .json()
                    .flatten_event(true)
                    .with_target(true)
                    .with_current_span(true),
            )
            .init();
    }

    let run_id = std::env::var("CHATSTREAM_RUN_ID").unwrap_or_else(|_| {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("pid-{}-{}", std::process::id(), now)
    });

    tracing::info!(
        component = "logging",
        event = "logging.initialized",
        run_id = %run_id,
        log_path = %log_path.display(),
        format = %format,
        filter = %filter_directives,
        filter_source,
    );

    Ok(LoggingHandle { run_id, guard })
}

/// `CHATSTREAM_LOG_FILTER`, then `RUST_LOG`, then the default. Unparseable
/// directives fall through to the next source.
fn select_filter(
    explicit: Option<String>,
    rust_log: Option<String>,
) -> (&'static str, EnvFilter) {
    explicit
        .and_then(|value| EnvFilter::try_new(value).ok())
        .map(|filter| ("CHATSTREAM_LOG_FILTER", filter))
        .or_else(|| {
            rust_log
                .and_then(|value| EnvFilter::try_new(value).ok())
                .map(|filter| ("RUST_LOG", filter))
        })
        .unwrap_or_else(|| ("default", EnvFilter::new(DEFAULT_FILTER)))
}
