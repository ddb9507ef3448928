//! Audit log: append-only record of what the worker did and why.
//!
//! Entries fan out to every configured [`AuditSink`]. The JSON-lines file
//! sink is the durable record; the tracing sink mirrors entries into the
//! process log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// A single audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_id: Option<String>,
    pub outcome: AuditOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Auditable worker events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AuditEvent {
    WorkerStarted,
    WorkerStopped,
    WorkDiscovered { source: String },
    SourceFailed { source_name: String },
    MergeFailed { source_name: String },
    ApprovalEvaluated { decision: String, rule: String },
    ExecutionStarted { workflow: String, budget_usd: f64 },
    ExecutionFinished { workflow: String, cost_usd: f64 },
    WorkEscalated,
    BudgetExhausted { spent_usd: f64, max_usd: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Skipped,
}

/// Where audit entries are written.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// Appends one JSON object per line to a file.
pub struct JsonlFileSink {
    path: PathBuf,
}

impl JsonlFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn append(&self, entry: &AuditEntry) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut line = serde_json::to_string(entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

impl AuditSink for JsonlFileSink {
    fn record(&self, entry: &AuditEntry) {
        // The audit trail must never take the worker down.
        if let Err(e) = self.append(entry) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to append audit entry");
        }
    }
}

/// Mirrors entries into the tracing log.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &AuditEntry) {
        tracing::info!(
            event = ?entry.event,
            work_id = ?entry.work_id,
            outcome = ?entry.outcome,
            details = ?entry.details,
            "AUDIT"
        );
    }
}

/// Maximum audit entries kept in memory.
const MAX_IN_MEMORY: usize = 1_000;

/// Fan-out audit logger with a bounded in-memory tail.
pub struct AuditLog {
    recent: Mutex<Vec<AuditEntry>>,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("entry_count", &self.count())
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    /// A logger with no sinks (memory only).
    pub fn new() -> Self {
        Self::with_sinks(Vec::new())
    }

    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            recent: Mutex::new(Vec::new()),
            sinks,
        }
    }

    /// File + tracing sinks, the usual production setup.
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self::with_sinks(vec![Box::new(JsonlFileSink::new(path)), Box::new(TracingSink)])
    }

    pub fn log(
        &self,
        event: AuditEvent,
        work_id: Option<&str>,
        outcome: AuditOutcome,
        details: Option<String>,
    ) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            work_id: work_id.map(str::to_string),
            outcome,
            details,
        };

        {
            let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
            if recent.len() == MAX_IN_MEMORY {
                recent.remove(0);
            }
            recent.push(entry.clone());
        }

        for sink in &self.sinks {
            sink.record(&entry);
        }
    }

    /// Recent entries, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.recent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn entries_by_outcome(&self, outcome: AuditOutcome) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.outcome == outcome)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.recent.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
