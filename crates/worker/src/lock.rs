//! Cross-process worker lock.
//!
//! `acquire()` creates the lock file with `O_CREAT | O_EXCL`, so two workers
//! racing on the same state directory have exactly one winner. The file
//! records the owner's PID for diagnostics only: an existing lock always
//! blocks, whether or not its owner is still alive. Clearing a lock left by
//! a crashed worker is an operator decision (delete the file).

use crate::error::WorkerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    pub pid: u32,
    pub worker_id: String,
    pub acquired_at: DateTime<Utc>,
}

/// A held lock. Release it with [`WorkerLock::release`].
#[derive(Debug)]
pub struct WorkerLock {
    path: PathBuf,
    info: LockInfo,
}

impl WorkerLock {
    /// Create the lock file at `path`, failing if it already exists.
    pub fn acquire(path: impl Into<PathBuf>, worker_id: &str) -> Result<Self, WorkerError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let info = LockInfo {
            pid: std::process::id(),
            worker_id: worker_id.to_string(),
            acquired_at: Utc::now(),
        };

        let json = serde_json::to_string_pretty(&info)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let written = create_exclusive(&path, |file| {
            file.write_all(json.as_bytes())?;
            file.sync_all()
        });

        match written {
            Ok(()) => {
                debug!(path = %path.display(), pid = info.pid, "Worker lock acquired");
                Ok(Self { path, info })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let pid = Self::read(&path).map(|i| i.pid);
                Err(WorkerError::LockHeld { path, pid })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read a lock file. `None` if missing or unparseable.
    pub fn read(path: &Path) -> Option<LockInfo> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Remove the lock file.
    pub fn release(self) -> Result<(), WorkerError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Worker lock released");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "Worker lock already removed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Create `path` only if it does not exist, then fill it with `write`.
///
/// If `write` fails the file is removed again, so a half-written lock never
/// blocks later attempts.
fn create_exclusive<F>(path: &Path, write: F) -> std::io::Result<()>
where
    F: FnOnce(&mut File) -> std::io::Result<()>,
{
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    if let Err(e) = write(&mut file) {
        drop(file);
        if let Err(remove) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %remove, "Could not remove unwritten lock file");
        }
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_writes_pid_and_release_removes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/worker.lock");

        let lock = WorkerLock::acquire(&path, "w1").unwrap();
        let info = WorkerLock::read(&path).unwrap();
        assert_eq!(info.pid, std::process::id());
        assert_eq!(info.worker_id, "w1");
        assert_eq!(lock.info(), &info);

        lock.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn second_acquire_fails_with_holder_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.lock");
        let _held = WorkerLock::acquire(&path, "first").unwrap();

        match WorkerLock::acquire(&path, "second") {
            Err(WorkerError::LockHeld { pid, .. }) => assert_eq!(pid, Some(std::process::id())),
            other => panic!("expected LockHeld, got {other:?}"),
        }
    }

    #[test]
    fn stale_lock_is_not_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.lock");
        std::fs::write(&path, r#"{"pid": 999999, "workerId": "dead", "acquiredAt": "2020-01-01T00:00:00Z"}"#)
            .unwrap();

        assert!(matches!(
            WorkerLock::acquire(&path, "new"),
            Err(WorkerError::LockHeld { pid: Some(999999), .. })
        ));
        assert!(path.exists());
    }

    #[test]
    fn failed_write_leaves_no_lock_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.lock");

        let err = create_exclusive(&path, |_| Err(std::io::Error::other("disk full"))).unwrap_err();
        assert_eq!(err.to_string(), "disk full");
        assert!(!path.exists());

        WorkerLock::acquire(&path, "next").unwrap();
    }

    #[test]
    fn garbage_lock_still_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.lock");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            WorkerLock::acquire(&path, "new"),
            Err(WorkerError::LockHeld { pid: None, .. })
        ));
    }
}
