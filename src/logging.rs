//! Logging setup.
//!
//! The operational log is a daily-rolling, date-stamped, append-only file
//! (`<log_dir>/migrate.log.YYYY-MM-DD`) that records every round and the
//! engine's raw output. Console output depends on who is running.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::types::LogLevel;

pub(crate) const LOG_FILE_PREFIX: &str = "migrate.log";

/// Where log events go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogTarget {
    /// Console only: short-lived control commands (start/stop/status).
    Console,
    /// Console and operational log: the attached control loop.
    ConsoleAndFile,
    /// Operational log only: the detached control loop.
    File,
}

/// Default directives: the configured level, with raw engine output kept at
/// `info` regardless so the operational log always carries it.
fn default_directives(level: LogLevel) -> String {
    match level {
        LogLevel::Debug | LogLevel::Info => level.as_str().to_string(),
        LogLevel::Warn | LogLevel::Error => format!("{},engine=info", level.as_str()),
    }
}

fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// Install the global subscriber. The returned guard flushes the file writer
/// on drop and must be held for the life of the process.
pub(crate) fn init(
    target: LogTarget,
    level: LogLevel,
    log_dir: &Path,
) -> anyhow::Result<Option<WorkerGuard>> {
    if target == LogTarget::Console {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter(level))
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    }

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(non_blocking);

    let console_layer = (target == LogTarget::ConsoleAndFile).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stdout)
    });

    Registry::default()
        .with(env_filter(level))
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(Some(guard))
}
