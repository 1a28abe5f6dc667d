//! Exclusive advisory instance lock.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

use super::error::LifecycleError;

/// Kernel-mediated single-instance guard.
///
/// The lock is held for as long as this value (and its open file descriptor)
/// lives and is released by the kernel when the process exits, however it
/// exits. It is never unlocked explicitly.
#[derive(Debug)]
pub struct InstanceLock {
    _file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the lock without waiting. Contention is reported as
    /// [`LifecycleError::AlreadyRunning`] with an unknown holder; callers fill
    /// in the holder from the identity record.
    pub fn try_acquire(path: &Path) -> Result<Self, LifecycleError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| LifecycleError::io("create directory", parent, e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| LifecycleError::io("open lock file", path, e))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                _file: file,
                path: path.to_path_buf(),
            }),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(LifecycleError::AlreadyRunning {
                path: path.to_path_buf(),
                holder: None,
            }),
            Err(e) => Err(LifecycleError::io("lock", path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
