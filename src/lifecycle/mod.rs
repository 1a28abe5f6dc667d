//! Process lifecycle: single-instance ownership and the start / stop /
//! status / foreground operating modes.
//!
//! The exclusive [`InstanceLock`] is the source of truth for "an instance is
//! running". The [`PidFile`] is a liveness hint used to report and signal the
//! owner, and is purged whenever it is found stale.

pub mod daemon;
pub mod error;
pub mod lock;
pub mod pidfile;
pub mod process;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::engine::TransferEngine;
use crate::scheduler::RoundScheduler;
use crate::shutdown;
use crate::systemd::SystemdNotifier;
use crate::types::RunMode;

use daemon::Handshake;
pub use error::LifecycleError;
pub use lock::InstanceLock;
pub use pidfile::{Identity, PidFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartReport {
    Started(u32),
    AlreadyRunning(u32),
}

impl fmt::Display for StartReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartReport::Started(pid) => write!(f, "started (PID {pid})"),
            StartReport::AlreadyRunning(pid) => write!(f, "already running (PID {pid})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReport {
    NotRunning,
    Stopped(u32),
    Killed { pid: u32, polls: u32 },
}

impl fmt::Display for StopReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReport::NotRunning => write!(f, "not running"),
            StopReport::Stopped(pid) => write!(f, "stopped (PID {pid})"),
            StopReport::Killed { pid, polls } => {
                write!(f, "killed (PID {pid}) after {polls} polls")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusReport {
    Running(u32),
    NotRunning,
}

impl StatusReport {
    pub fn is_running(&self) -> bool {
        matches!(self, StatusReport::Running(_))
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusReport::Running(pid) => write!(f, "running (PID {pid})"),
            StatusReport::NotRunning => write!(f, "not running"),
        }
    }
}

/// How `stop` waits for a graceful exit before escalating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    pub polls: u32,
    pub interval: Duration,
}

impl StopPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            polls: config.stop_timeout_polls,
            interval: Duration::from_secs(1),
        }
    }
}

pub struct LifecycleManager {
    config: Arc<Config>,
    pid_file: PidFile,
    stop_policy: StopPolicy,
}

impl LifecycleManager {
    pub fn new(config: Arc<Config>) -> Self {
        let pid_file = PidFile::new(config.pid_file.clone());
        let stop_policy = StopPolicy::from_config(&config);
        Self {
            config,
            pid_file,
            stop_policy,
        }
    }

    pub fn with_stop_policy(mut self, policy: StopPolicy) -> Self {
        self.stop_policy = policy;
        self
    }

    /// The identity record, corroborated by the instance lock. A live PID
    /// whose lock is free belongs to some unrelated process that reused it.
    fn resolve_identity(&self) -> Result<Identity, LifecycleError> {
        let identity = self.pid_file.inspect()?;
        let Identity::Live(pid) = identity else {
            return Ok(identity);
        };
        match InstanceLock::try_acquire(&self.config.lock_file) {
            Ok(_free) => {
                tracing::debug!(pid, "Instance lock is free, process identity is stale");
                Ok(Identity::Stale(Some(pid)))
            }
            Err(LifecycleError::AlreadyRunning { .. }) => Ok(identity),
            Err(e) => Err(e),
        }
    }

    /// Liveness query. Never modifies the identity record.
    pub fn status(&self) -> Result<StatusReport, LifecycleError> {
        match self.resolve_identity()? {
            Identity::Live(pid) => Ok(StatusReport::Running(pid)),
            Identity::Absent | Identity::Stale(_) => Ok(StatusReport::NotRunning),
        }
    }

    /// Launch a detached control loop unless one is already live.
    pub async fn start(&self) -> Result<StartReport, LifecycleError> {
        match self.resolve_identity()? {
            Identity::Live(pid) => {
                tracing::info!(pid, "Migration loop already running");
                return Ok(StartReport::AlreadyRunning(pid));
            }
            Identity::Stale(pid) => {
                tracing::warn!(
                    ?pid,
                    "Removing stale process identity {}",
                    self.pid_file.path().display()
                );
                self.pid_file.remove()?;
            }
            Identity::Absent => {}
        }

        let mut child = daemon::spawn_detached(&self.config)?;
        let timeout = self.config.start_timeout();
        match daemon::await_ready(&mut child, timeout).await {
            Handshake::Ready(pid) => {
                tracing::info!(pid, "Migration loop started");
                Ok(StartReport::Started(pid))
            }
            Handshake::Failed(reason) => Err(LifecycleError::StartupFailed(reason)),
            Handshake::Exited(status) => Err(LifecycleError::StartupFailed(format!(
                "exited ({status}) before reporting readiness"
            ))),
            Handshake::TimedOut => match self.resolve_identity()? {
                Identity::Live(pid) => {
                    tracing::warn!(pid, "No readiness report, but process identity is live");
                    Ok(StartReport::Started(pid))
                }
                _ => Err(LifecycleError::StartupFailed(format!(
                    "no readiness report within {}s",
                    timeout.as_secs()
                ))),
            },
        }
    }

    /// Graceful termination, escalating to a forced kill after the polling
    /// window. Always ends by purging the identity record of the target.
    pub async fn stop(&self) -> Result<StopReport, LifecycleError> {
        let pid = match self.resolve_identity()? {
            Identity::Absent => return Ok(StopReport::NotRunning),
            Identity::Stale(_) => {
                self.pid_file.remove()?;
                return Ok(StopReport::NotRunning);
            }
            Identity::Live(pid) => pid,
        };

        tracing::info!(pid, "Sending SIGTERM");
        if let Err(e) = process::terminate(pid) {
            if e.raw_os_error() != Some(libc::ESRCH) {
                self.pid_file.remove_if_owned(pid)?;
                return Err(LifecycleError::Signal { pid, source: e });
            }
        }

        for poll in 1..=self.stop_policy.polls {
            tokio::time::sleep(self.stop_policy.interval).await;
            if !process::is_alive(pid) {
                tracing::info!(pid, poll, "Process exited");
                self.pid_file.remove_if_owned(pid)?;
                return Ok(StopReport::Stopped(pid));
            }
            tracing::debug!(pid, poll, "Still alive");
        }

        tracing::warn!(
            pid,
            polls = self.stop_policy.polls,
            "Process ignored SIGTERM, sending SIGKILL"
        );
        let killed = process::force_kill(pid);
        self.pid_file.remove_if_owned(pid)?;
        killed.map_err(|source| LifecycleError::Signal { pid, source })?;
        Ok(StopReport::Killed {
            pid,
            polls: self.stop_policy.polls,
        })
    }

    /// Become the singleton control loop and run until signalled.
    ///
    /// Returns the instance lock, which the caller keeps until the process
    /// exits.
    pub async fn run_control_loop(
        &self,
        mode: RunMode,
        engine: Arc<dyn TransferEngine>,
    ) -> Result<InstanceLock, LifecycleError> {
        shutdown::ignore_hangup();

        let claimed = self.claim_lock().and_then(|lock| {
            let token = shutdown::install_signal_handler().map_err(LifecycleError::SignalSetup)?;
            Ok((lock, token))
        });
        let (lock, token) = match claimed {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::error!("Cannot start migration loop: {}", e);
                if mode == RunMode::Daemon {
                    daemon::report_failure(&e.to_string());
                }
                return Err(e);
            }
        };

        self.drive(mode, engine, lock, token).await
    }

    fn claim_lock(&self) -> Result<InstanceLock, LifecycleError> {
        match InstanceLock::try_acquire(&self.config.lock_file) {
            Err(LifecycleError::AlreadyRunning { path, .. }) => {
                let holder = self.pid_file.read().ok().flatten();
                Err(LifecycleError::AlreadyRunning { path, holder })
            }
            other => other,
        }
    }

    /// Everything after lock acquisition: record identity, report readiness,
    /// run rounds until `shutdown`, clean up. The lock is handed back, never
    /// released here.
    pub(crate) async fn drive(
        &self,
        mode: RunMode,
        engine: Arc<dyn TransferEngine>,
        lock: InstanceLock,
        shutdown: CancellationToken,
    ) -> Result<InstanceLock, LifecycleError> {
        let pid = std::process::id();

        if let Ok(Some(previous)) = self.pid_file.read() {
            if previous != pid {
                tracing::warn!(previous, "Replacing stale process identity");
            }
        }
        if let Err(e) = self.pid_file.write(pid) {
            if mode == RunMode::Daemon {
                daemon::report_failure(&e.to_string());
            }
            return Err(e);
        }

        tracing::info!(
            pid,
            lock = %lock.path().display(),
            "Migration loop running: {} -> {}",
            self.config.source.path(),
            self.config.dest.path()
        );
        if mode == RunMode::Daemon {
            daemon::report_ready(pid);
        }
        let notifier = SystemdNotifier::new(self.config.notify_systemd);
        notifier.notify_ready();

        let mut scheduler = RoundScheduler::from_config(&self.config, engine, notifier);
        scheduler.run(shutdown).await;

        notifier.notify_stopping();
        match self.pid_file.remove_if_owned(pid) {
            Ok(true) => tracing::info!("Removed process identity"),
            Ok(false) => tracing::debug!("Process identity no longer names this process"),
            Err(e) => tracing::warn!("Failed to remove process identity: {}", e),
        }
        tracing::info!(rounds = scheduler.round(), "Migration loop exited");
        Ok(lock)
    }
}
