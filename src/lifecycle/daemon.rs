//! Detached launch and the readiness handshake.
//!
//! `start` re-executes this binary as `daemon` in a new session with stdout
//! piped back to it. The child writes exactly one line: `READY <pid>` once it
//! holds the instance lock and has recorded its identity, or
//! `FAILED <reason>` before exiting. After `READY` the child points stdout at
//! `/dev/null` so the parent may exit.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use super::error::LifecycleError;
use crate::config::Config;

const READY: &str = "READY";
const FAILED: &str = "FAILED";
pub(crate) const DAEMON_SUBCOMMAND: &str = "daemon";
const DAEMON_STDERR: &str = "daemon.err";

/// What the parent learned from the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Handshake {
    Ready(u32),
    Failed(String),
    /// The child closed stdout without reporting; it has exited.
    Exited(String),
    /// No line arrived within the grace interval.
    TimedOut,
}

pub(crate) fn parse_line(line: &str) -> Handshake {
    let line = line.trim_end();
    if let Some(rest) = line.strip_prefix(READY) {
        if let Ok(pid) = rest.trim().parse::<u32>() {
            return Handshake::Ready(pid);
        }
    }
    if let Some(reason) = line.strip_prefix(FAILED) {
        return Handshake::Failed(reason.trim().to_string());
    }
    Handshake::Failed(format!("unexpected handshake line: {line:?}"))
}

/// Spawn the control loop as a detached session leader.
pub(crate) fn spawn_detached(config: &Config) -> Result<Child, LifecycleError> {
    let exe = std::env::current_exe().map_err(LifecycleError::Spawn)?;

    std::fs::create_dir_all(&config.log_dir)
        .map_err(|e| LifecycleError::io("create directory", &config.log_dir, e))?;
    let stderr_path = config.log_dir.join(DAEMON_STDERR);
    let stderr = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&stderr_path)
        .map_err(|e| LifecycleError::io("open", &stderr_path, e))?;

    let mut command = Command::new(exe);
    command
        .arg(DAEMON_SUBCOMMAND)
        .envs(config.to_env())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::from(stderr));

    // SAFETY: setsid is async-signal-safe and touches no state shared with
    // the parent.
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    command.spawn().map_err(LifecycleError::Spawn)
}

/// Wait up to `timeout` for the child's handshake line.
pub(crate) async fn await_ready(child: &mut Child, timeout: Duration) -> Handshake {
    let Some(stdout) = child.stdout.take() else {
        return Handshake::Failed("child stdout was not captured".to_string());
    };
    let mut lines = BufReader::new(stdout).lines();

    match tokio::time::timeout(timeout, lines.next_line()).await {
        Ok(Ok(Some(line))) => parse_line(&line),
        Ok(Ok(None)) | Ok(Err(_)) => {
            let status = match child.wait().await {
                Ok(status) => status.to_string(),
                Err(e) => e.to_string(),
            };
            Handshake::Exited(status)
        }
        Err(_) => Handshake::TimedOut,
    }
}

fn write_line(line: &str) {
    let mut stdout = io::stdout().lock();
    // The parent may already be gone; nothing useful to do on failure.
    let _ = writeln!(stdout, "{line}").and_then(|()| stdout.flush());
}

/// Child side: report readiness, then detach stdout from the parent's pipe.
pub(crate) fn report_ready(pid: u32) {
    write_line(&format!("{READY} {pid}"));
    match std::fs::File::open("/dev/null") {
        Ok(devnull) => {
            // SAFETY: dup2 onto STDOUT_FILENO with a valid descriptor.
            if unsafe { libc::dup2(devnull.as_raw_fd(), libc::STDOUT_FILENO) } == -1 {
                tracing::warn!(
                    error = %io::Error::last_os_error(),
                    "Failed to detach stdout from the launcher"
                );
            }
        }
        Err(e) => tracing::warn!(error = %e, "Failed to open /dev/null"),
    }
}

/// Child side: report why startup failed. The caller exits non-zero.
pub(crate) fn report_failure(reason: &str) {
    let single_line = reason.replace('\n', " ");
    write_line(&format!("{FAILED} {single_line}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ready_line() {
        assert_eq!(parse_line("READY 1234\n"), Handshake::Ready(1234));
    }

    #[test]
    fn parses_failed_line() {
        assert_eq!(
            parse_line("FAILED another instance holds /run/migrate.lock (PID 7)"),
            Handshake::Failed("another instance holds /run/migrate.lock (PID 7)".to_string())
        );
    }

    #[test]
    fn malformed_lines_are_failures() {
        assert!(matches!(parse_line("READY soon"), Handshake::Failed(_)));
        assert!(matches!(parse_line("hello"), Handshake::Failed(_)));
    }

    #[tokio::test]
    async fn await_ready_reads_first_line() {
        let mut child = Command::new("sh")
            .args(["-c", "echo READY 77; sleep 5"])
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        assert_eq!(
            await_ready(&mut child, Duration::from_secs(5)).await,
            Handshake::Ready(77)
        );
    }

    #[tokio::test]
    async fn await_ready_detects_silent_exit() {
        let mut child = Command::new("sh")
            .args(["-c", "exit 3"])
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        match await_ready(&mut child, Duration::from_secs(5)).await {
            Handshake::Exited(status) => assert!(status.contains('3')),
            other => panic!("expected exit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn await_ready_times_out() {
        let mut child = Command::new("sleep")
            .arg("5")
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        assert_eq!(
            await_ready(&mut child, Duration::from_millis(100)).await,
            Handshake::TimedOut
        );
    }
}
