//! Enforcement hooks: gates run between workflow phases.
//!
//! | Hook | Phase | Passes when |
//! |------|-------|-------------|
//! | TDD | before implementation | test files exist and the suite currently fails |
//! | Coverage | before QA | line coverage is at or above the threshold |
//! | Test passing | before refactor | the whole suite passes |
//! | Credential safety | every write/edit | the content has no hard-coded credentials |
//!
//! Hooks never return `Err`: a command that cannot run is reported as a
//! failed gate with the reason in [`HookResult::error`], so a caller can treat
//! every outcome the same way.

pub mod coverage;
pub mod credentials;
pub mod runner;

pub use coverage::{CoverageSummary, FileCoverage};
pub use credentials::{CredentialViolation, ViolationKind};
pub use runner::{CommandTestRunner, TestRun, TestRunner, parse_test_counts};

use nightshift_config::HooksConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Errors raised while running a hook's commands or reading its reports.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("command '{command}' failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid report at {path}: {reason}")]
    InvalidReport { path: PathBuf, reason: String },
}

/// Workflow phases that have a gate in front of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    BeforeImplementation,
    BeforeQa,
    BeforeRefactor,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeImplementation => "before-implementation",
            Self::BeforeQa => "before-qa",
            Self::BeforeRefactor => "before-refactor",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before-implementation" | "implementation" => Ok(Self::BeforeImplementation),
            "before-qa" | "qa" => Ok(Self::BeforeQa),
            "before-refactor" | "refactor" => Ok(Self::BeforeRefactor),
            other => Err(format!("unknown phase '{other}'")),
        }
    }
}

/// Outcome of a hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookResult {
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl HookResult {
    pub fn pass(data: serde_json::Value) -> Self {
        Self {
            passed: true,
            error: None,
            data: Some(data),
            warnings: Vec::new(),
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            passed: false,
            error: Some(error.into()),
            data: None,
            warnings: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// What a gate is given: the project it checks.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    pub working_dir: PathBuf,
}

impl HookContext {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }
}

fn is_test_file(path: &Path, config: &HooksConfig) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if config.test_file_patterns.iter().any(|p| name.contains(p.as_str())) {
        return true;
    }
    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .is_some_and(|dir| matches!(dir, "tests" | "__tests__" | "test"))
}

/// Find test files under `root`, skipping the configured ignored directories.
pub fn find_test_files(root: &Path, config: &HooksConfig) -> Result<Vec<PathBuf>, HookError> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                let skip = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| config.ignored_dirs.iter().any(|d| d == n));
                if !skip {
                    stack.push(path);
                }
            } else if file_type.is_file() && is_test_file(&path, config) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Runs the gates with one configuration and test runner.
pub struct EnforcementHooks {
    config: HooksConfig,
    runner: Arc<dyn TestRunner>,
}

impl EnforcementHooks {
    /// Hooks backed by the configured shell commands.
    pub fn new(config: HooksConfig) -> Self {
        let runner = Arc::new(CommandTestRunner::new(&config));
        Self { config, runner }
    }

    pub fn with_runner(config: HooksConfig, runner: Arc<dyn TestRunner>) -> Self {
        Self { config, runner }
    }

    /// Run the gate in front of `phase`.
    pub async fn gate(&self, phase: Phase, ctx: &HookContext) -> HookResult {
        let result = match phase {
            Phase::BeforeImplementation => self.tdd_enforcement(ctx).await,
            Phase::BeforeQa => self.coverage_threshold(ctx).await,
            Phase::BeforeRefactor => self.test_passing(ctx).await,
        };
        info!(phase = %phase, passed = result.passed, "Gate evaluated");
        result
    }

    /// Tests must exist and must currently fail.
    pub async fn tdd_enforcement(&self, ctx: &HookContext) -> HookResult {
        let root = ctx.working_dir.clone();
        let config = self.config.clone();
        let files = match tokio::task::spawn_blocking(move || find_test_files(&root, &config)).await {
            Ok(Ok(files)) => files,
            Ok(Err(e)) => return HookResult::fail(format!("could not scan for tests: {e}")),
            Err(e) => return HookResult::fail(format!("test file scan did not finish: {e}")),
        };
        if files.is_empty() {
            return HookResult::fail("no test files found; write failing tests before implementing");
        }

        let run = match self.runner.run_tests(&ctx.working_dir).await {
            Ok(run) => run,
            Err(e) => return HookResult::fail(e.to_string()),
        };
        let data = serde_json::json!({
            "testFiles": files.len(),
            "passed": run.passed,
            "failed": run.failed,
        });

        if run.all_passed() {
            return HookResult::fail(
                "all tests pass; add a failing test for the new behaviour before implementing",
            )
            .with_data(data);
        }
        debug!(test_files = files.len(), "TDD gate: failing tests present");
        HookResult::pass(data)
    }

    /// Coverage must reach the configured percentage.
    pub async fn coverage_threshold(&self, ctx: &HookContext) -> HookResult {
        let mut warnings = Vec::new();
        match self.runner.run_coverage(&ctx.working_dir).await {
            Ok(run) if !run.exit_success => {
                warnings.push("coverage command exited non-zero; reading summary anyway".into());
            }
            Ok(_) => {}
            Err(e) => return HookResult::fail(e.to_string()),
        }

        let summary = match self.read_coverage_summary(&ctx.working_dir).await {
            Ok(s) => s,
            Err(e) => return HookResult::fail(e.to_string()).with_warnings(warnings),
        };

        let threshold = self.config.coverage_threshold_pct;
        let worst = summary.worst_files(self.config.worst_files_reported);
        let data = serde_json::json!({
            "totalLinesPct": summary.total_lines_pct,
            "threshold": threshold,
            "worstFiles": worst,
        });

        if summary.total_lines_pct < threshold {
            let names: Vec<String> = worst
                .iter()
                .map(|f| format!("{} ({:.1}%)", f.file, f.lines_pct))
                .collect();
            return HookResult::fail(format!(
                "line coverage {:.1}% is below the {threshold:.1}% threshold; worst files: {}",
                summary.total_lines_pct,
                names.join(", ")
            ))
            .with_data(data)
            .with_warnings(warnings);
        }

        warnings.extend(
            worst
                .iter()
                .filter(|f| f.lines_pct < threshold)
                .map(|f| format!("{} is below threshold at {:.1}%", f.file, f.lines_pct)),
        );
        HookResult::pass(data).with_warnings(warnings)
    }

    async fn read_coverage_summary(&self, working_dir: &Path) -> Result<CoverageSummary, HookError> {
        let path = working_dir.join(&self.config.coverage_summary_path);
        let content = tokio::fs::read_to_string(&path).await?;
        CoverageSummary::parse(&content).map_err(|reason| HookError::InvalidReport { path, reason })
    }

    /// Every test must pass.
    pub async fn test_passing(&self, ctx: &HookContext) -> HookResult {
        let run = match self.runner.run_tests(&ctx.working_dir).await {
            Ok(run) => run,
            Err(e) => return HookResult::fail(e.to_string()),
        };
        let data = serde_json::json!({ "passed": run.passed, "failed": run.failed });

        if run.has_failures() {
            let detail = match run.failed {
                Some(n) if n > 0 => format!("{n} test(s) failing"),
                _ => "test command exited non-zero".to_string(),
            };
            return HookResult::fail(format!("{detail}; fix them before refactoring")).with_data(data);
        }
        HookResult::pass(data)
    }

    /// Block a write whose content contains a hard-coded credential.
    pub fn check_write(&self, path: &Path, content: &str) -> HookResult {
        let path_str = path.to_string_lossy();
        if self
            .config
            .credential_exempt_suffixes
            .iter()
            .any(|s| path_str.ends_with(s.as_str()))
        {
            return HookResult::pass(serde_json::json!({ "exempt": true }));
        }

        let violations = credentials::scan(content);
        let Some(first) = violations.first() else {
            return HookResult::pass(serde_json::json!({ "violations": 0 }));
        };

        warn!(
            path = %path_str,
            kind = %first.kind,
            line = first.line,
            count = violations.len(),
            "Blocked write containing credentials"
        );
        let data = serde_json::json!({ "violations": violations });
        HookResult::fail(format!(
            "hard-coded {} in {path_str} at line {}: {}",
            first.kind, first.line, first.remediation
        ))
        .with_data(data)
    }
}
