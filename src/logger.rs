use std::fs;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, registry::LookupSpan, Layer, util::SubscriberInitExt, EnvFilter};

use crate::config::paths::get_log_dir;

fn env_filter() -> EnvFilter {
    // notify is chatty below warn
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,notify=warn"))
}

fn console_layer<S>() -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
}

/// Initialize logging for the daemon.
///
/// Sets up:
/// - File output: daily-rolling `zoom.log` files under the log dir, keeping
///   the latest 5.
/// - Console output (stderr), since stdout carries IPC events.
/// - Environment filter: defaults to `info`, configurable via `RUST_LOG`.
///
/// Falls back to console-only logging when the log directory is unusable.
pub fn init() {
    let log_dir = get_log_dir();
    let _ = fs::create_dir_all(&log_dir);

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("zoom")
        .filename_suffix("log")
        .max_log_files(5)
        .build(&log_dir);

    match file_appender {
        Ok(appender) => {
            let file_layer = fmt::layer()
                .with_writer(appender)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true);
            tracing_subscriber::registry()
                .with(env_filter())
                .with(file_layer)
                .with(console_layer())
                .init();
            tracing::info!(log_dir = %log_dir.display(), "Logger initialized");
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(console_layer())
                .init();
            tracing::warn!(
                log_dir = %log_dir.display(),
                error = %e,
                "File logging unavailable, logging to stderr only"
            );
        }
    }
}

/// Console-only logging for one-shot subcommands.
pub fn init_console() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}
