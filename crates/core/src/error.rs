//! Error types shared across crates.
//!
//! Each crate owns the errors of its own context (`WorkerError`, `HookError`,
//! `ConfigError`); the ones here are raised by traits and types that live in
//! core and cross crate boundaries.

use crate::work::WorkStatus;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("duplicate id: work item '{0}' is already queued")]
    DuplicateId(String),

    #[error("work item not found: {0}")]
    NotFound(String),

    #[error("invalid status transition for '{id}': {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: WorkStatus,
        to: WorkStatus,
    },

    #[error("failed to persist queue to {path}: {reason}")]
    Persist { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source '{source_name}' unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },

    #[error("source '{source_name}' returned malformed data: {reason}")]
    Parse { source_name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_id_names_the_item() {
        let err = QueueError::DuplicateId("bug-42".into());
        assert!(err.to_string().contains("duplicate id"));
        assert!(err.to_string().contains("bug-42"));
    }

    #[test]
    fn invalid_transition_displays_both_states() {
        let err = QueueError::InvalidTransition {
            id: "w1".into(),
            from: WorkStatus::Completed,
            to: WorkStatus::InProgress,
        };
        let text = err.to_string();
        assert!(text.contains("completed"));
        assert!(text.contains("in-progress"));
    }
}
