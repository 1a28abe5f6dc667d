//! Liveness checks and signal delivery by PID.

use std::io;

/// Convert to a `pid_t`, refusing values `kill(2)` would interpret as a
/// process group or "every process" (0 and anything that wraps negative).
fn to_pid_t(pid: u32) -> Option<libc::pid_t> {
    libc::pid_t::try_from(pid).ok().filter(|p| *p > 0)
}

/// An exited but unreaped process still answers `kill(pid, 0)`.
#[cfg(target_os = "linux")]
fn is_zombie(pid: libc::pid_t) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
        })
        .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(_pid: libc::pid_t) -> bool {
    false
}

/// Whether `pid` names a running process. A process we may not signal
/// (`EPERM`) still exists; a zombie does not count.
pub(crate) fn is_alive(pid: u32) -> bool {
    let Some(pid) = to_pid_t(pid) else {
        return false;
    };
    // SAFETY: signal 0 performs only the existence and permission check.
    let exists = unsafe { libc::kill(pid, 0) } == 0
        || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM);
    exists && !is_zombie(pid)
}

pub(crate) fn send_signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let Some(pid) = to_pid_t(pid) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to signal PID {pid}"),
        ));
    };
    // SAFETY: plain kill(2) on a validated positive PID.
    if unsafe { libc::kill(pid, signal) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Request graceful termination.
pub(crate) fn terminate(pid: u32) -> io::Result<()> {
    send_signal(pid, libc::SIGTERM)
}

/// Unconditionally kill `pid`, then its process group. The detached loop is
/// a session leader, so the group also holds any engine child it spawned.
/// A missing group is not an error.
pub(crate) fn force_kill(pid: u32) -> io::Result<()> {
    let result = match send_signal(pid, libc::SIGKILL) {
        Err(e) if e.raw_os_error() == Some(libc::ESRCH) => Ok(()),
        other => other,
    };
    if let Some(pgid) = to_pid_t(pid) {
        // SAFETY: negative PID addresses the process group led by `pgid`.
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
    result
}
