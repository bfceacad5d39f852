//! Logging initialization helpers.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! the embedding application's choice. These helpers cover the common cases:
//! stderr logging filtered by `RUST_LOG`, optionally teeing into a rolling
//! file in a given directory.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::error::VmlinkResult;

/// Install a stderr subscriber filtered by `RUST_LOG` (default `info`).
///
/// Idempotent: returns quietly if a global subscriber is already set.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Install a subscriber writing daily-rolling log files into `dir`.
///
/// The returned guard must be kept alive for the duration of logging;
/// dropping it flushes and stops the background writer.
pub fn init_with_file(dir: &Path) -> VmlinkResult<WorkerGuard> {
    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::daily(dir, "vmlink.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();

    Ok(guard)
}
