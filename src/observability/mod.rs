use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
pub fn init_tracing(log_level: &str) {
    let level = log_level.to_uppercase();

    if level == "DISABLED" {
        return;
    }

    let filter =
        EnvFilter::try_new(tracing_level(&level)).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn tracing_level(level: &str) -> &str {
    match level {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    }
}

/// Log the end of one generator session.
pub fn log_session_complete(
    model: &str,
    exit_code: Option<i32>,
    finished: bool,
    start_time: Instant,
) {
    let elapsed: Duration = start_time.elapsed();
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    match exit_code {
        Some(0) => tracing::info!(
            model,
            exit_code = 0,
            finished,
            elapsed_ms,
            "[Process] generator exited"
        ),
        Some(code) => tracing::warn!(
            model,
            exit_code = code,
            finished,
            elapsed_ms,
            "[Process] generator exited with non-zero status"
        ),
        None => tracing::warn!(
            model,
            finished,
            elapsed_ms,
            "[Process] generator terminated without an exit code"
        ),
    }
}
