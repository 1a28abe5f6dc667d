//! bucket-migrator: continuously copy one object-storage bucket into another.
//!
//! A single control loop runs sync rounds through an external transfer
//! engine, retries failed rounds with exponential backoff, and periodically
//! verifies the destination. `start`, `stop` and `status` manage that loop as
//! a background process guarded by an exclusive lock.

#![warn(clippy::all)]

mod cli;
mod config;
mod engine;
mod lifecycle;
mod logging;
pub mod retry;
mod scheduler;
mod shutdown;
mod systemd;
mod types;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use cli::Command;
use config::Config;
use engine::RcloneEngine;
use lifecycle::{daemon, InstanceLock, LifecycleManager};
use logging::LogTarget;
use types::RunMode;

fn log_target(command: Command) -> LogTarget {
    match command {
        Command::Foreground => LogTarget::ConsoleAndFile,
        Command::Daemon => LogTarget::File,
        Command::Start | Command::Stop | Command::Status => LogTarget::Console,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = match cli::Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are not failures
            let failed = e.use_stderr();
            let _ = e.print();
            return Ok(if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            });
        }
    };
    let command = cli.effective_command();

    let config = match Config::from_args(cli.config) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            if command == Command::Daemon {
                daemon::report_failure(&e.to_string());
            }
            eprintln!("Invalid configuration: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let _log_guard = match logging::init(log_target(command), config.log_level, &config.log_dir) {
        Ok(guard) => guard,
        Err(e) => {
            if command == Command::Daemon {
                daemon::report_failure(&format!("{e:#}"));
            }
            return Err(e);
        }
    };

    let manager = LifecycleManager::new(config.clone());
    // Released by process exit only.
    let mut _instance_lock: Option<InstanceLock> = None;

    match command {
        Command::Start => match manager.start().await {
            Ok(report) => {
                println!("{report}");
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("Failed to start: {e}");
                Ok(ExitCode::FAILURE)
            }
        },
        Command::Stop => match manager.stop().await {
            Ok(report) => {
                println!("{report}");
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("Failed to stop: {e}");
                Ok(ExitCode::FAILURE)
            }
        },
        Command::Status => {
            let report = manager.status()?;
            println!("{report}");
            Ok(if report.is_running() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Foreground | Command::Daemon => {
            let mode = if command == Command::Daemon {
                RunMode::Daemon
            } else {
                RunMode::Foreground
            };
            let engine = Arc::new(RcloneEngine::new(config.clone()));
            match manager.run_control_loop(mode, engine).await {
                Ok(lock) => {
                    _instance_lock = Some(lock);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    if mode == RunMode::Foreground {
                        eprintln!("{e}");
                    }
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_loop_modes_write_the_operational_log() {
        assert_eq!(log_target(Command::Start), LogTarget::Console);
        assert_eq!(log_target(Command::Stop), LogTarget::Console);
        assert_eq!(log_target(Command::Status), LogTarget::Console);
        assert_eq!(log_target(Command::Foreground), LogTarget::ConsoleAndFile);
        assert_eq!(log_target(Command::Daemon), LogTarget::File);
    }
}
