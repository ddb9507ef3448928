//! Built-in work sources.
//!
//! - [`ManualQueueSource`]: a JSON file of human requests. The CLI appends
//!   to it and the worker claims it, so the worker stays the only writer of
//!   the work queue itself. A poll renames the file to `<name>.claimed` and
//!   the claim is deleted only on [`commit`](WorkSourceProvider::commit),
//!   after its items are persisted; an uncommitted claim is offered again.
//! - [`ValidationReportSource`]: a JSON report written by a validation or
//!   lint scanner. Items get ids derived from their content, so re-reading
//!   an unchanged report yields ids the queue already has.

use async_trait::async_trait;
use nightshift_config::{ManualQueueSourceConfig, ValidationReportSourceConfig};
use nightshift_core::{
    DiscoveredWork, Priority, SourceError, SuggestedWorkflow, Tier, WorkSource, WorkSourceProvider,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

// ── Manual queue ────────────────────────────────────────────────────────────

/// One human request in the manual queue file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_manual_priority")]
    pub priority: Priority,
    #[serde(default = "default_manual_tier")]
    pub tier: Tier,
    #[serde(default = "default_manual_workflow")]
    pub workflow: SuggestedWorkflow,
}

fn default_manual_priority() -> Priority {
    Priority::Medium
}
fn default_manual_tier() -> Tier {
    Tier::TWO
}
fn default_manual_workflow() -> SuggestedWorkflow {
    SuggestedWorkflow::BugFix
}

impl ManualRequest {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            id: None,
            summary: summary.into(),
            description: String::new(),
            priority: default_manual_priority(),
            tier: default_manual_tier(),
            workflow: default_manual_workflow(),
        }
    }

    fn assign_id(&mut self) -> bool {
        if self.id.is_some() {
            return false;
        }
        self.id = Some(format!("request-{}", Uuid::new_v4()));
        true
    }

    fn into_work(self) -> DiscoveredWork {
        let description = if self.description.is_empty() {
            self.summary.clone()
        } else {
            self.description
        };
        let work = DiscoveredWork::new(
            WorkSource::UserRequest,
            self.priority,
            self.tier,
            self.workflow,
            self.summary,
            description,
        );
        match self.id {
            Some(id) => work.with_id(id),
            None => work,
        }
    }
}

pub struct ManualQueueSource {
    path: PathBuf,
    enabled: bool,
}

impl ManualQueueSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            enabled: true,
        }
    }

    /// Build from config; the file lives in the worker state dir.
    pub fn from_config(config: &ManualQueueSourceConfig, state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(&config.file),
            enabled: config.enabled,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where a poll moves the file while its requests are being queued.
    pub fn claimed_path(&self) -> PathBuf {
        sibling(&self.path, "claimed")
    }

    /// Where an unparseable claim is moved so it stops blocking the queue.
    pub fn rejected_path(&self) -> PathBuf {
        sibling(&self.path, "rejected")
    }

    fn read_requests(path: &Path) -> std::io::Result<Option<Vec<ManualRequest>>> {
        match std::fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Ok(Some(Vec::new())),
            Ok(content) => Ok(serde_json::from_str(&content).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Some(Vec::new())),
            Err(e) => Err(e),
        }
    }

    fn write_requests(path: &Path, requests: &[ManualRequest]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(requests)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let tmp = sibling(path, &format!("{}.tmp", std::process::id()));
        std::fs::write(&tmp, json)?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }

    /// Append a request to the manual queue file at `path` and return it as
    /// stored, with an id assigned if it had none.
    ///
    /// Ids are fixed at append time so a request that races a claim and ends
    /// up in both files is queued only once.
    pub fn append(path: &Path, mut request: ManualRequest) -> std::io::Result<ManualRequest> {
        let mut requests = Self::read_requests(path)?.ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{} is not a JSON array of requests", path.display()),
            )
        })?;
        request.assign_id();
        requests.push(request.clone());
        Self::write_requests(path, &requests)?;
        Ok(request)
    }

    fn unavailable(&self, reason: String) -> SourceError {
        SourceError::Unavailable {
            source_name: self.name().into(),
            reason,
        }
    }
}

/// `path` with `.suffix` appended to its file name.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

#[async_trait]
impl WorkSourceProvider for ManualQueueSource {
    fn name(&self) -> &str {
        "manual-queue"
    }

    fn source(&self) -> WorkSource {
        WorkSource::UserRequest
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn poll(&self) -> Result<Vec<DiscoveredWork>, SourceError> {
        let claimed = self.claimed_path();

        // An earlier claim that never got committed is offered again first.
        if !claimed.exists() {
            match std::fs::rename(&self.path, &claimed) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(self.unavailable(format!("could not claim manual queue: {e}"))),
            }
        }

        let Some(mut requests) =
            Self::read_requests(&claimed).map_err(|e| self.unavailable(e.to_string()))?
        else {
            let rejected = self.rejected_path();
            if let Err(e) = std::fs::rename(&claimed, &rejected) {
                warn!(path = %claimed.display(), error = %e, "Could not set aside malformed manual queue");
            }
            return Err(SourceError::Parse {
                source_name: self.name().into(),
                reason: format!(
                    "not a JSON array of requests; moved to {}",
                    rejected.display()
                ),
            });
        };

        // Hand-written entries get their ids now so a redelivery keeps them.
        let mut assigned = false;
        for request in &mut requests {
            assigned |= request.assign_id();
        }
        if assigned {
            Self::write_requests(&claimed, &requests)
                .map_err(|e| self.unavailable(format!("could not record request ids: {e}")))?;
        }

        if !requests.is_empty() {
            debug!(count = requests.len(), "Claimed manual queue");
        }
        Ok(requests.into_iter().map(ManualRequest::into_work).collect())
    }

    async fn commit(&self) -> Result<(), SourceError> {
        match std::fs::remove_file(self.claimed_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.unavailable(format!("could not release claimed requests: {e}"))),
        }
    }
}

// ── Validation report ───────────────────────────────────────────────────────

/// A single failure in a validation report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFailure {
    #[serde(default)]
    pub rule: String,
    #[serde(default)]
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub message: String,
}

impl ValidationFailure {
    /// Content-derived id, stable across re-reads of the same report.
    pub fn stable_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.rule.as_bytes());
        hasher.update([0]);
        hasher.update(self.file.as_bytes());
        hasher.update([0]);
        hasher.update(self.line.unwrap_or(0).to_le_bytes());
        hasher.update(self.message.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("validation-{}", &digest[..16])
    }

    fn location(&self) -> String {
        match self.line {
            Some(line) => format!("{}:{line}", self.file),
            None => self.file.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ValidationReport {
    #[serde(default)]
    failures: Vec<ValidationFailure>,
}

pub struct ValidationReportSource {
    path: PathBuf,
    enabled: bool,
    priority: Priority,
    tier: Tier,
}

impl ValidationReportSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let defaults = ValidationReportSourceConfig::default();
        Self {
            path: path.into(),
            enabled: true,
            priority: defaults.priority,
            tier: defaults.tier,
        }
    }

    pub fn from_config(config: &ValidationReportSourceConfig) -> Self {
        Self {
            path: config.path.clone(),
            enabled: config.enabled,
            priority: config.priority,
            tier: config.tier,
        }
    }
}

#[async_trait]
impl WorkSourceProvider for ValidationReportSource {
    fn name(&self) -> &str {
        "validation-report"
    }

    fn source(&self) -> WorkSource {
        WorkSource::ValidationFailure
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn poll(&self) -> Result<Vec<DiscoveredWork>, SourceError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SourceError::Unavailable {
                    source_name: self.name().into(),
                    reason: e.to_string(),
                });
            }
        };

        let report: ValidationReport =
            serde_json::from_str(&content).map_err(|e| SourceError::Parse {
                source_name: self.name().into(),
                reason: e.to_string(),
            })?;

        Ok(report
            .failures
            .into_iter()
            .map(|failure| {
                let summary = if failure.rule.is_empty() {
                    format!("Fix validation failure in {}", failure.location())
                } else {
                    format!("Fix {} in {}", failure.rule, failure.location())
                };
                DiscoveredWork::new(
                    self.source(),
                    self.priority,
                    self.tier,
                    SuggestedWorkflow::BugFix,
                    summary,
                    format!("{}: {}", failure.location(), failure.message),
                )
                .with_id(failure.stable_id())
            })
            .collect())
    }
}
