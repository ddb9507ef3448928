//! Configuration loading, validation, and management for nightshift.
//!
//! Loads configuration from `nightshift.toml` with a small set of
//! environment variable overrides. The binary constructs an [`AppConfig`]
//! once at startup and passes the relevant sections down by reference; no
//! other crate reads the environment.

use nightshift_core::{Decision, Priority, SuggestedWorkflow, Tier, WorkSource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `nightshift.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Worker loop, budget, and state file settings
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Approval policy
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Stall detection thresholds
    #[serde(default)]
    pub stall: StallConfig,

    /// Context truncation and compaction
    #[serde(default)]
    pub context: ContextConfig,

    /// Enforcement hook commands and thresholds
    #[serde(default)]
    pub hooks: HooksConfig,

    /// Built-in work sources
    #[serde(default)]
    pub sources: SourcesConfig,

    /// External workflow executor
    #[serde(default)]
    pub executor: ExecutorConfig,
}

fn default_true() -> bool {
    true
}

// ── Worker ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Directory holding the queue, status, lock, stop-signal and audit files
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Identifier recorded as `assignedTo` on picked-up work
    #[serde(default = "default_worker_id")]
    pub worker_id: String,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Total spend after which auto-execution pauses
    #[serde(default = "default_max_budget_usd")]
    pub max_budget_usd: f64,

    /// Budget handed to the executor for a single item
    #[serde(default = "default_per_work_budget_usd")]
    pub per_work_budget_usd: f64,

    #[serde(default = "default_max_queue_items")]
    pub max_queue_items: usize,

    /// Estimated cost per workflow, fed to the policy's budget guard
    #[serde(default)]
    pub cost_estimates: HashMap<SuggestedWorkflow, f64>,

    #[serde(default = "default_queue_file")]
    pub queue_file: String,

    #[serde(default = "default_status_file")]
    pub status_file: String,

    #[serde(default = "default_lock_file")]
    pub lock_file: String,

    #[serde(default = "default_stop_file")]
    pub stop_file: String,

    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".nightshift")
}
fn default_worker_id() -> String {
    "nightshift-worker".into()
}
fn default_poll_interval_ms() -> u64 {
    60_000
}
fn default_max_budget_usd() -> f64 {
    10.0
}
fn default_per_work_budget_usd() -> f64 {
    2.0
}
fn default_max_queue_items() -> usize {
    100
}
fn default_queue_file() -> String {
    "work-queue.json".into()
}
fn default_status_file() -> String {
    "worker-status.json".into()
}
fn default_lock_file() -> String {
    "worker.lock".into()
}
fn default_stop_file() -> String {
    "worker.stop".into()
}
fn default_audit_file() -> String {
    "audit.jsonl".into()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            worker_id: default_worker_id(),
            poll_interval_ms: default_poll_interval_ms(),
            max_budget_usd: default_max_budget_usd(),
            per_work_budget_usd: default_per_work_budget_usd(),
            max_queue_items: default_max_queue_items(),
            cost_estimates: HashMap::new(),
            queue_file: default_queue_file(),
            status_file: default_status_file(),
            lock_file: default_lock_file(),
            stop_file: default_stop_file(),
            audit_file: default_audit_file(),
        }
    }
}

impl WorkerConfig {
    pub fn queue_path(&self) -> PathBuf {
        self.state_dir.join(&self.queue_file)
    }

    pub fn status_path(&self) -> PathBuf {
        self.state_dir.join(&self.status_file)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join(&self.lock_file)
    }

    pub fn stop_path(&self) -> PathBuf {
        self.state_dir.join(&self.stop_file)
    }

    pub fn audit_path(&self) -> PathBuf {
        self.state_dir.join(&self.audit_file)
    }

    /// A config rooted at `state_dir` with every other field defaulted.
    pub fn in_dir(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            ..Self::default()
        }
    }
}

// ── Policy ──────────────────────────────────────────────────────────────────

/// Approval policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub tier_defaults: TierDefaults,

    /// Per-source decision, beats priority overrides and tier defaults
    #[serde(default)]
    pub source_overrides: HashMap<WorkSource, Decision>,

    /// Per-priority decision, beats tier defaults
    #[serde(default)]
    pub priority_overrides: HashMap<Priority, Decision>,

    /// Auto-execute decisions with a larger cost estimate are demoted to confirm
    #[serde(
        default = "default_max_auto_execute_budget_usd",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_auto_execute_budget_usd: Option<f64>,
}

fn default_max_auto_execute_budget_usd() -> Option<f64> {
    Some(5.0)
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            tier_defaults: TierDefaults::default(),
            source_overrides: HashMap::new(),
            priority_overrides: HashMap::new(),
            max_auto_execute_budget_usd: default_max_auto_execute_budget_usd(),
        }
    }
}

/// Default decision for each automation tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierDefaults {
    #[serde(default = "default_auto")]
    pub tier_1: Decision,
    #[serde(default = "default_auto")]
    pub tier_2: Decision,
    #[serde(default = "default_confirm")]
    pub tier_3: Decision,
    #[serde(default = "default_escalate")]
    pub tier_4: Decision,
}

fn default_auto() -> Decision {
    Decision::AutoExecute
}
fn default_confirm() -> Decision {
    Decision::Confirm
}
fn default_escalate() -> Decision {
    Decision::Escalate
}

impl Default for TierDefaults {
    fn default() -> Self {
        Self {
            tier_1: Decision::AutoExecute,
            tier_2: Decision::AutoExecute,
            tier_3: Decision::Confirm,
            tier_4: Decision::Escalate,
        }
    }
}

impl TierDefaults {
    pub fn get(&self, tier: Tier) -> Decision {
        match tier.value() {
            1 => self.tier_1,
            2 => self.tier_2,
            3 => self.tier_3,
            _ => self.tier_4,
        }
    }
}

// ── Stall detection ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StallConfig {
    /// Consecutive identical calls that count as repetition
    #[serde(default = "default_repetition_threshold")]
    pub repetition_threshold: usize,

    /// Calls that must strictly alternate between two inputs
    #[serde(default = "default_oscillation_window_size")]
    pub oscillation_window_size: usize,

    /// Turns without file activity that count as idle
    #[serde(default = "default_idle_turn_threshold")]
    pub idle_turn_threshold: usize,

    /// Interventions before the caller should abort the turn loop
    #[serde(default = "default_max_interventions")]
    pub max_interventions: usize,

    /// Tool calls remembered for pattern detection
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_repetition_threshold() -> usize {
    3
}
fn default_oscillation_window_size() -> usize {
    6
}
fn default_idle_turn_threshold() -> usize {
    10
}
fn default_max_interventions() -> usize {
    3
}
fn default_history_size() -> usize {
    50
}

impl Default for StallConfig {
    fn default() -> Self {
        Self {
            repetition_threshold: default_repetition_threshold(),
            oscillation_window_size: default_oscillation_window_size(),
            idle_turn_threshold: default_idle_turn_threshold(),
            max_interventions: default_max_interventions(),
            history_size: default_history_size(),
        }
    }
}

// ── Context management ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Accumulated input tokens that trigger compaction
    #[serde(default = "default_compaction_threshold_tokens")]
    pub compaction_threshold_tokens: usize,

    /// Most recent assistant/user pairs that are never evicted
    #[serde(default = "default_keep_recent_turn_pairs")]
    pub keep_recent_turn_pairs: usize,

    #[serde(default)]
    pub truncation: TruncationConfig,
}

fn default_compaction_threshold_tokens() -> usize {
    150_000
}
fn default_keep_recent_turn_pairs() -> usize {
    4
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            compaction_threshold_tokens: default_compaction_threshold_tokens(),
            keep_recent_turn_pairs: default_keep_recent_turn_pairs(),
            truncation: TruncationConfig::default(),
        }
    }
}

/// Per-tool-family output limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncationConfig {
    #[serde(default = "default_shell_head_lines")]
    pub shell_head_lines: usize,
    #[serde(default = "default_shell_tail_lines")]
    pub shell_tail_lines: usize,
    #[serde(default = "default_file_max_chars")]
    pub file_max_chars: usize,
    #[serde(default = "default_search_max_chars")]
    pub search_max_chars: usize,
    #[serde(default = "default_listing_max_entries")]
    pub listing_max_entries: usize,
    #[serde(default = "default_generic_max_chars")]
    pub generic_max_chars: usize,
}

fn default_shell_head_lines() -> usize {
    100
}
fn default_shell_tail_lines() -> usize {
    100
}
fn default_file_max_chars() -> usize {
    20_000
}
fn default_search_max_chars() -> usize {
    10_000
}
fn default_listing_max_entries() -> usize {
    500
}
fn default_generic_max_chars() -> usize {
    15_000
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            shell_head_lines: default_shell_head_lines(),
            shell_tail_lines: default_shell_tail_lines(),
            file_max_chars: default_file_max_chars(),
            search_max_chars: default_search_max_chars(),
            listing_max_entries: default_listing_max_entries(),
            generic_max_chars: default_generic_max_chars(),
        }
    }
}

// ── Hooks ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HooksConfig {
    #[serde(default = "default_test_command")]
    pub test_command: String,

    #[serde(default = "default_coverage_command")]
    pub coverage_command: String,

    /// Istanbul-style `coverage-summary.json`, relative to the working dir
    #[serde(default = "default_coverage_summary_path")]
    pub coverage_summary_path: String,

    #[serde(default = "default_coverage_threshold_pct")]
    pub coverage_threshold_pct: f64,

    #[serde(default = "default_worst_files_reported")]
    pub worst_files_reported: usize,

    /// File-name fragments that mark a test file
    #[serde(default = "default_test_file_patterns")]
    pub test_file_patterns: Vec<String>,

    /// Directories skipped when looking for tests
    #[serde(default = "default_ignored_dirs")]
    pub ignored_dirs: Vec<String>,

    /// Path suffixes never scanned for credentials
    #[serde(default = "default_credential_exempt_suffixes")]
    pub credential_exempt_suffixes: Vec<String>,

    /// Upper bound for a single hook command
    #[serde(default = "default_hook_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_test_command() -> String {
    "npm test".into()
}
fn default_coverage_command() -> String {
    "npm run coverage".into()
}
fn default_coverage_summary_path() -> String {
    "coverage/coverage-summary.json".into()
}
fn default_coverage_threshold_pct() -> f64 {
    80.0
}
fn default_worst_files_reported() -> usize {
    5
}
fn default_test_file_patterns() -> Vec<String> {
    vec![
        ".test.".into(),
        ".spec.".into(),
        "_test.".into(),
        "test_".into(),
    ]
}
fn default_ignored_dirs() -> Vec<String> {
    vec![
        "node_modules".into(),
        ".git".into(),
        "target".into(),
        "dist".into(),
        "coverage".into(),
    ]
}
fn default_credential_exempt_suffixes() -> Vec<String> {
    vec![".env.example".into(), ".md".into()]
}
fn default_hook_timeout_secs() -> u64 {
    600
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            test_command: default_test_command(),
            coverage_command: default_coverage_command(),
            coverage_summary_path: default_coverage_summary_path(),
            coverage_threshold_pct: default_coverage_threshold_pct(),
            worst_files_reported: default_worst_files_reported(),
            test_file_patterns: default_test_file_patterns(),
            ignored_dirs: default_ignored_dirs(),
            credential_exempt_suffixes: default_credential_exempt_suffixes(),
            timeout_secs: default_hook_timeout_secs(),
        }
    }
}

// ── Sources ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub manual_queue: ManualQueueSourceConfig,

    #[serde(default)]
    pub validation_report: ValidationReportSourceConfig,
}

/// File-backed queue of human requests, drained on every poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualQueueSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// File name inside the worker state dir
    #[serde(default = "default_manual_queue_file")]
    pub file: String,
}

fn default_manual_queue_file() -> String {
    "manual-queue.json".into()
}

impl Default for ManualQueueSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: default_manual_queue_file(),
        }
    }
}

/// JSON report written by an external validation scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReportSourceConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_validation_report_path")]
    pub path: PathBuf,

    #[serde(default = "default_validation_priority")]
    pub priority: Priority,

    #[serde(default = "default_validation_tier")]
    pub tier: Tier,
}

fn default_validation_report_path() -> PathBuf {
    PathBuf::from("validation-report.json")
}
fn default_validation_priority() -> Priority {
    Priority::High
}
fn default_validation_tier() -> Tier {
    Tier::TWO
}

impl Default for ValidationReportSourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_validation_report_path(),
            priority: default_validation_priority(),
            tier: default_validation_tier(),
        }
    }
}

// ── Executor ────────────────────────────────────────────────────────────────

/// The external command that performs a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Program to run; empty means "not configured"
    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_executor_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_executor_timeout_secs() -> u64 {
    3_600
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            timeout_secs: default_executor_timeout_secs(),
        }
    }
}

impl ExecutorConfig {
    pub fn is_configured(&self) -> bool {
        !self.command.trim().is_empty()
    }
}

// ── Loading ─────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Default config file name, resolved against the current directory.
    pub const FILE_NAME: &'static str = "nightshift.toml";

    /// Load configuration from `path`, then apply environment overrides:
    /// - `NIGHTSHIFT_STATE_DIR`
    /// - `NIGHTSHIFT_MAX_BUDGET_USD`
    /// - `NIGHTSHIFT_POLL_INTERVAL_MS`
    ///
    /// This is the only place the environment is consulted.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;

        if let Ok(dir) = std::env::var("NIGHTSHIFT_STATE_DIR") {
            config.worker.state_dir = PathBuf::from(dir);
        }

        if let Ok(raw) = std::env::var("NIGHTSHIFT_MAX_BUDGET_USD") {
            config.worker.max_budget_usd = raw.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "NIGHTSHIFT_MAX_BUDGET_USD is not a number: {raw}"
                ))
            })?;
        }

        if let Ok(raw) = std::env::var("NIGHTSHIFT_POLL_INTERVAL_MS") {
            config.worker.poll_interval_ms = raw.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "NIGHTSHIFT_POLL_INTERVAL_MS is not an integer: {raw}"
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.worker;
        if w.max_queue_items == 0 {
            return Err(ConfigError::ValidationError(
                "worker.max_queue_items must be at least 1".into(),
            ));
        }
        if w.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "worker.poll_interval_ms must be greater than 0".into(),
            ));
        }
        if !is_amount(w.max_budget_usd) || !is_amount(w.per_work_budget_usd) {
            return Err(ConfigError::ValidationError(
                "worker budgets must be finite and non-negative".into(),
            ));
        }
        if w.cost_estimates.values().any(|c| !is_amount(*c)) {
            return Err(ConfigError::ValidationError(
                "worker.cost_estimates must be finite and non-negative".into(),
            ));
        }
        if matches!(self.policy.max_auto_execute_budget_usd, Some(b) if !is_amount(b)) {
            return Err(ConfigError::ValidationError(
                "policy.max_auto_execute_budget_usd must be finite and non-negative".into(),
            ));
        }

        let s = &self.stall;
        if s.repetition_threshold < 2 || s.idle_turn_threshold < 1 {
            return Err(ConfigError::ValidationError(
                "stall.repetition_threshold must be >= 2 and stall.idle_turn_threshold >= 1"
                    .into(),
            ));
        }
        if s.oscillation_window_size < 4 || s.oscillation_window_size % 2 != 0 {
            return Err(ConfigError::ValidationError(
                "stall.oscillation_window_size must be an even number >= 4".into(),
            ));
        }
        if s.history_size < s.oscillation_window_size.max(s.repetition_threshold) {
            return Err(ConfigError::ValidationError(
                "stall.history_size must cover the repetition threshold and oscillation window"
                    .into(),
            ));
        }

        if self.context.keep_recent_turn_pairs == 0 {
            return Err(ConfigError::ValidationError(
                "context.keep_recent_turn_pairs must be at least 1".into(),
            ));
        }

        let pct = self.hooks.coverage_threshold_pct;
        if !(0.0..=100.0).contains(&pct) {
            return Err(ConfigError::ValidationError(
                "hooks.coverage_threshold_pct must be between 0 and 100".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `init`).
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&Self::default())
    }
}

/// A dollar amount: finite and not negative.
fn is_amount(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
