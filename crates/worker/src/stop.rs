//! Stop-signal file: a presence-only marker asking the worker to shut down.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StopSignal {
    path: PathBuf,
}

impl StopSignal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ask the worker owning this state directory to stop.
    pub fn request(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, chrono::Utc::now().to_rfc3339())
    }

    pub fn is_requested(&self) -> bool {
        self.path.exists()
    }

    /// Remove the marker if present. Returns whether a stop was requested.
    pub fn consume(&self) -> bool {
        if !self.is_requested() {
            return false;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Could not remove stop signal");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_then_consume_once() {
        let dir = tempfile::tempdir().unwrap();
        let signal = StopSignal::new(dir.path().join("worker.stop"));

        assert!(!signal.consume());
        signal.request().unwrap();
        assert!(signal.is_requested());
        assert!(signal.consume());
        assert!(!signal.is_requested());
        assert!(!signal.consume());
    }
}
