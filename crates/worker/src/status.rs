//! Worker status snapshot, rewritten after every poll cycle.
//!
//! Any process can read the status file to show worker health without
//! touching the queue file.

use crate::budget::BudgetStatus;
use crate::error::WorkerError;
use chrono::{DateTime, Utc};
use nightshift_core::DiscoveredWork;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Not started, or stopped
    Idle,
    /// Started and polling
    Running,
    /// Executing a work item
    Processing,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Processing => "processing",
        })
    }
}

/// The item being executed right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentWork {
    pub id: String,
    pub summary: String,
    pub started_at: DateTime<Utc>,
}

impl CurrentWork {
    pub fn of(work: &DiscoveredWork, started_at: DateTime<Utc>) -> Self {
        Self {
            id: work.id.clone(),
            summary: work.summary.clone(),
            started_at,
        }
    }
}

/// Outcome counters since the worker started.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStats {
    pub completed: usize,
    pub escalated: usize,
    pub failed: usize,
    /// Cost of successful executions
    pub total_cost_usd: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub pending: usize,
    pub in_progress: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub status: WorkerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub current_work: Option<CurrentWork>,
    pub stats: WorkerStats,
    pub queue_stats: QueueSnapshot,
    pub budget: BudgetStatus,
    pub updated_at: DateTime<Utc>,
}

/// Reads and writes the status file.
#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the status file atomically.
    pub fn write(&self, status: &WorkerStatus) -> Result<(), WorkerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json =
            serde_json::to_string_pretty(status).map_err(|e| WorkerError::Status(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// `Ok(None)` when no worker has written a status yet.
    pub fn read(&self) -> Result<Option<WorkerStatus>, WorkerError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| WorkerError::Status(format!("unreadable status file: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> WorkerStatus {
        WorkerStatus {
            status: WorkerState::Processing,
            pid: Some(7),
            started_at: Some(Utc::now()),
            last_poll_at: Some(Utc::now()),
            current_work: Some(CurrentWork {
                id: "w1".into(),
                summary: "Fix login".into(),
                started_at: Utc::now(),
            }),
            stats: WorkerStats {
                completed: 2,
                escalated: 1,
                failed: 0,
                total_cost_usd: 1.25,
            },
            queue_stats: QueueSnapshot {
                pending: 3,
                in_progress: 1,
                total: 7,
            },
            budget: BudgetStatus {
                spent_usd: 1.25,
                max_usd: 10.0,
                exhausted: false,
            },
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file = StatusFile::new(dir.path().join("worker-status.json"));
        assert!(file.read().unwrap().is_none());

        let written = status();
        file.write(&written).unwrap();
        assert_eq!(file.read().unwrap(), Some(written));
    }

    #[test]
    fn wire_format_is_camel_case() {
        let json = serde_json::to_value(status()).unwrap();
        assert_eq!(json["status"], "processing");
        assert_eq!(json["currentWork"]["id"], "w1");
        assert_eq!(json["queueStats"]["inProgress"], 1);
        assert_eq!(json["stats"]["totalCostUsd"], 1.25);
        assert_eq!(json["budget"]["maxUsd"], 10.0);
    }
}
