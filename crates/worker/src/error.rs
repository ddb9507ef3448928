//! Worker errors.

use nightshift_core::QueueError;
use std::path::PathBuf;

/// Errors that stop a worker operation.
///
/// Source failures, executor failures and budget exhaustion are not errors;
/// they are recorded and the cycle continues.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker is already started")]
    AlreadyStarted,

    #[error("worker lock {path} is held{}", .pid.map(|p| format!(" by pid {p}")).unwrap_or_default())]
    LockHeld { path: PathBuf, pid: Option<u32> },

    #[error("worker is not started")]
    NotStarted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("failed to write worker status: {0}")]
    Status(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_held_names_pid_when_known() {
        let err = WorkerError::LockHeld {
            path: PathBuf::from(".nightshift/worker.lock"),
            pid: Some(4242),
        };
        assert_eq!(
            err.to_string(),
            "worker lock .nightshift/worker.lock is held by pid 4242"
        );

        let unknown = WorkerError::LockHeld {
            path: PathBuf::from("w.lock"),
            pid: None,
        };
        assert_eq!(unknown.to_string(), "worker lock w.lock is held");
    }
}
