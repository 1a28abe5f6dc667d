//! Process identity record.
//!
//! A best-effort liveness hint naming the PID of the active control loop.
//! Mutual exclusion comes from the instance lock, never from this file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::error::LifecycleError;
use super::process;

/// What the record currently says about the singleton role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// No record on disk.
    Absent,
    /// The record names a live process other than the caller.
    Live(u32),
    /// The record names a dead process, the caller itself, or is unreadable
    /// garbage (`None`). It must be purged before a new instance starts.
    Stale(Option<u32>),
}

#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

fn parse_pid(contents: &str) -> Option<u32> {
    contents.trim().parse::<u32>().ok().filter(|pid| *pid > 0)
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw record contents: `Ok(None)` when absent, `Ok(Some(None))` when the
    /// file exists but does not hold a PID.
    fn read_raw(&self) -> Result<Option<Option<u32>>, LifecycleError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(parse_pid(&contents))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LifecycleError::io("read", &self.path, e)),
        }
    }

    /// The recorded PID, if the record exists and is well-formed.
    pub fn read(&self) -> Result<Option<u32>, LifecycleError> {
        Ok(self.read_raw()?.flatten())
    }

    pub fn inspect(&self) -> Result<Identity, LifecycleError> {
        let identity = match self.read_raw()? {
            None => Identity::Absent,
            Some(None) => Identity::Stale(None),
            Some(Some(pid)) if pid == std::process::id() => Identity::Stale(Some(pid)),
            Some(Some(pid)) if process::is_alive(pid) => Identity::Live(pid),
            Some(Some(pid)) => Identity::Stale(Some(pid)),
        };
        Ok(identity)
    }

    /// Atomically replace the record with `pid` (temp file + rename).
    pub fn write(&self, pid: u32) -> Result<(), LifecycleError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| LifecycleError::io("create directory", parent, e))?;
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let mut file = fs::File::create(&tmp).map_err(|e| LifecycleError::io("create", &tmp, e))?;
        writeln!(file, "{pid}")
            .and_then(|()| file.sync_all())
            .map_err(|e| LifecycleError::io("write", &tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| LifecycleError::io("rename", &tmp, e))?;
        Ok(())
    }

    /// Delete the record. Returns whether a file was actually removed.
    pub fn remove(&self) -> Result<bool, LifecycleError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LifecycleError::io("remove", &self.path, e)),
        }
    }

    /// Delete the record only if it still names `pid`, so a successor's
    /// record is never removed by mistake.
    pub fn remove_if_owned(&self, pid: u32) -> Result<bool, LifecycleError> {
        match self.read()? {
            Some(recorded) if recorded == pid => self.remove(),
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid_file(dir: &tempfile::TempDir) -> PidFile {
        PidFile::new(dir.path().join("run").join("migrate.pid"))
    }

    fn dead_pid() -> u32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[test]
    fn absent_record() {
        let dir = tempfile::tempdir().unwrap();
        let pf = pid_file(&dir);
        assert_eq!(pf.read().unwrap(), None);
        assert_eq!(pf.inspect().unwrap(), Identity::Absent);
        assert!(!pf.remove().unwrap());
    }

    #[test]
    fn write_creates_parent_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let pf = pid_file(&dir);
        pf.write(4242).unwrap();
        assert_eq!(fs::read_to_string(pf.path()).unwrap(), "4242\n");
        assert_eq!(pf.read().unwrap(), Some(4242));
    }

    #[test]
    fn garbage_record_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let pf = pid_file(&dir);
        fs::create_dir_all(pf.path().parent().unwrap()).unwrap();
        fs::write(pf.path(), "not-a-pid").unwrap();
        assert_eq!(pf.read().unwrap(), None);
        assert_eq!(pf.inspect().unwrap(), Identity::Stale(None));

        fs::write(pf.path(), "0\n").unwrap();
        assert_eq!(pf.inspect().unwrap(), Identity::Stale(None));
    }

    #[test]
    fn dead_process_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let pf = pid_file(&dir);
        let pid = dead_pid();
        pf.write(pid).unwrap();
        assert_eq!(pf.inspect().unwrap(), Identity::Stale(Some(pid)));
    }

    #[test]
    fn own_pid_is_not_another_live_instance() {
        let dir = tempfile::tempdir().unwrap();
        let pf = pid_file(&dir);
        pf.write(std::process::id()).unwrap();
        assert_eq!(
            pf.inspect().unwrap(),
            Identity::Stale(Some(std::process::id()))
        );
    }

    #[test]
    fn live_process_is_live() {
        let dir = tempfile::tempdir().unwrap();
        let pf = pid_file(&dir);
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        pf.write(child.id()).unwrap();
        assert_eq!(pf.inspect().unwrap(), Identity::Live(child.id()));
        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn remove_if_owned_spares_other_records() {
        let dir = tempfile::tempdir().unwrap();
        let pf = pid_file(&dir);
        pf.write(100).unwrap();
        assert!(!pf.remove_if_owned(200).unwrap());
        assert!(pf.path().exists());
        assert!(pf.remove_if_owned(100).unwrap());
        assert!(!pf.path().exists());
    }
}
