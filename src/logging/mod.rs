//! Structured logging, built on `tracing`.
//!
//! Emits UTF-8, line-oriented, ISO-8601-timestamped, leveled log lines (per
//! the persistent-log external interface) to both stderr and a log file.

use std::path::PathBuf;
use tracing_subscriber::{fmt, fmt::time::ChronoLocal, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// `verbosity` follows the CLI's repeated `-v` convention: 0 = warnings and
/// errors only, 1 = info, 2 = debug, 3+ = trace. `log_file_path` is appended
/// to, never truncated, so restarts preserve history.
pub fn init_tracing(verbosity: u8, log_file_path: Option<PathBuf>) {
    let filter_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_level));

    let timer = ChronoLocal::new("%Y-%m-%dT%H:%M:%S%.3f%:z".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_timer(timer.clone());

    let Some(log_path) = log_file_path else {
        registry.with(console_layer).init();
        return;
    };

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new().create(true).append(true).open(&log_path).ok();

    match file {
        Some(file) => {
            let file_layer = fmt::layer()
                .with_writer(file)
                .with_target(false)
                .with_thread_ids(true)
                .with_ansi(false)
                .with_timer(timer);
            registry.with(console_layer).with(file_layer).init();
        }
        None => {
            registry.with(console_layer).init();
        }
    }
}
