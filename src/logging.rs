//! Logging setup: stdout plus an optional daily-rolling file.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "hostwatch.log";

fn filter(debug: bool) -> EnvFilter {
    let fallback = if debug { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Initialize the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level is `info`, or `debug` in
/// debug mode. When `log_dir` is given, the same events are also written to
/// `<log_dir>/hostwatch.log.<date>`. The returned guard flushes the file
/// writer on drop and must be held for the life of the process.
pub fn init(debug: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(debug)
        .with_filter(filter(debug));

    let Some(dir) = log_dir else {
        tracing_subscriber::registry().with(stdout_layer).init();
        return None;
    };

    let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(filter(debug)),
        )
        .init();

    Some(guard)
}
