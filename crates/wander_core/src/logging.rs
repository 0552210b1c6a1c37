use anyhow::Result;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::WanderConfig;

const DEFAULT_FILTER: &str = "info,wander_app=debug,wander_core=debug,wander_ai=debug";

/// Builds the filter from `RUST_LOG`, falling back to `fallback`.
fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Initializes the logging system with a daily-rotated file under
/// `~/.wander/logs/` plus compact console output.
/// Returns a guard that must be kept alive for the duration of the app.
pub fn init_logging() -> Result<WorkerGuard> {
    let logs_dir = WanderConfig::logs_dir()?;
    std::fs::create_dir_all(&logs_dir)?;

    let file_appender = tracing_appender::rolling::daily(&logs_dir, "wander");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter(DEFAULT_FILTER))
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .compact()
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    Ok(guard)
}

/// Initialize file-only logging in a custom directory with a custom filter.
/// Used by tests and embedders that should not touch `~/.wander/logs`.
pub fn init_logging_to_dir(logs_dir: &Path, filter: &str) -> Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, "wander");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter(filter))
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    Ok(guard)
}
