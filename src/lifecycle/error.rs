//! Error types for process lifecycle management.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Another control loop holds the exclusive lock.
    #[error("another instance holds {} ({})", path.display(), describe_holder(*holder))]
    AlreadyRunning {
        path: PathBuf,
        holder: Option<u32>,
    },

    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to send signal to PID {pid}: {source}")]
    Signal { pid: u32, source: std::io::Error },

    #[error("failed to install signal handlers: {0}")]
    SignalSetup(#[source] std::io::Error),

    #[error("failed to launch background loop: {0}")]
    Spawn(#[source] std::io::Error),

    /// The detached loop reported failure, exited, or never became ready.
    #[error("background loop failed to start: {0}")]
    StartupFailed(String),
}

fn describe_holder(holder: Option<u32>) -> String {
    match holder {
        Some(pid) => format!("PID {pid}"),
        None => "PID unknown".to_string(),
    }
}

impl LifecycleError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
