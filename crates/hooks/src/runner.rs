//! Test and coverage command execution.

use crate::HookError;
use async_trait::async_trait;
use nightshift_config::HooksConfig;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Outcome of one test (or coverage) command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    /// The command exited with status 0
    pub exit_success: bool,
    pub passed: Option<usize>,
    pub failed: Option<usize>,
    pub output: String,
}

impl TestRun {
    /// Build a run from raw output, reading pass/fail counts from it.
    pub fn from_output(exit_success: bool, output: impl Into<String>) -> Self {
        let output = output.into();
        let (passed, failed) = parse_test_counts(&output);
        Self {
            exit_success,
            passed,
            failed,
            output,
        }
    }

    /// Every test passed: clean exit and no reported failures.
    pub fn all_passed(&self) -> bool {
        self.exit_success && self.failed.unwrap_or(0) == 0
    }

    pub fn has_failures(&self) -> bool {
        !self.exit_success || self.failed.unwrap_or(0) > 0
    }
}

fn count_regex(word: &str) -> Regex {
    Regex::new(&format!(r"(?i)(\d+)\s+(?:tests?\s+)?{word}"))
        .unwrap_or_else(|e| panic!("invalid test count pattern: {e}"))
}

/// Read the last reported `N passed` / `N failed` counts from test output.
///
/// Understands jest/vitest (`Tests: 2 failed, 8 passed`), mocha
/// (`8 passing`, `2 failing`) and cargo (`test result: ok. 8 passed; 0 failed`).
pub fn parse_test_counts(output: &str) -> (Option<usize>, Option<usize>) {
    static PASSED: OnceLock<Regex> = OnceLock::new();
    static FAILED: OnceLock<Regex> = OnceLock::new();
    let passed = PASSED.get_or_init(|| count_regex("(?:passed|passing)"));
    let failed = FAILED.get_or_init(|| count_regex("(?:failed|failing)"));

    let last = |re: &Regex| {
        re.captures_iter(output)
            .last()
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    };
    (last(passed), last(failed))
}

/// Runs the project's tests and coverage.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run_tests(&self, working_dir: &Path) -> Result<TestRun, HookError>;

    async fn run_coverage(&self, working_dir: &Path) -> Result<TestRun, HookError>;
}

/// Runs the configured shell commands.
pub struct CommandTestRunner {
    test_command: String,
    coverage_command: String,
    timeout: Duration,
}

impl CommandTestRunner {
    pub fn new(config: &HooksConfig) -> Self {
        Self {
            test_command: config.test_command.clone(),
            coverage_command: config.coverage_command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn run(&self, command: &str, working_dir: &Path) -> Result<TestRun, HookError> {
        debug!(command = %command, dir = %working_dir.display(), "Running hook command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(working_dir).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| HookError::CommandFailed {
                command: command.to_string(),
                reason: format!("timed out after {}s", self.timeout.as_secs()),
            })?
            .map_err(|e| HookError::CommandFailed {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let success = output.status.success();
        if !success {
            warn!(
                command = %command,
                exit_code = output.status.code().unwrap_or(-1),
                "Hook command exited non-zero"
            );
        }

        Ok(TestRun::from_output(success, format!("{stdout}\n{stderr}").trim()))
    }
}

#[async_trait]
impl TestRunner for CommandTestRunner {
    async fn run_tests(&self, working_dir: &Path) -> Result<TestRun, HookError> {
        self.run(&self.test_command, working_dir).await
    }

    async fn run_coverage(&self, working_dir: &Path) -> Result<TestRun, HookError> {
        self.run(&self.coverage_command, working_dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_jest_summary() {
        let (p, f) = parse_test_counts("Tests:       2 failed, 8 passed, 10 total");
        assert_eq!(p, Some(8));
        assert_eq!(f, Some(2));
    }

    #[test]
    fn parses_mocha_summary() {
        let (p, f) = parse_test_counts("  12 passing (30ms)\n  1 failing\n");
        assert_eq!(p, Some(12));
        assert_eq!(f, Some(1));
    }

    #[test]
    fn parses_cargo_summary_and_takes_last() {
        let out = "test result: ok. 3 passed; 0 failed;\n...\ntest result: FAILED. 5 passed; 2 failed;";
        assert_eq!(parse_test_counts(out), (Some(5), Some(2)));
    }

    #[test]
    fn missing_counts_are_none() {
        assert_eq!(parse_test_counts("no summary here"), (None, None));
    }

    #[test]
    fn exit_status_decides_when_counts_missing() {
        assert!(TestRun::from_output(true, "ok").all_passed());
        assert!(TestRun::from_output(false, "boom").has_failures());
        assert!(TestRun::from_output(true, "3 passed, 1 failed").has_failures());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_runner_executes_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let config = HooksConfig {
            test_command: "test -f marker.txt && echo '4 passed'".into(),
            coverage_command: "exit 3".into(),
            ..HooksConfig::default()
        };
        let runner = CommandTestRunner::new(&config);

        let run = runner.run_tests(dir.path()).await.unwrap();
        assert!(run.exit_success);
        assert_eq!(run.passed, Some(4));

        let cov = runner.run_coverage(dir.path()).await.unwrap();
        assert!(!cov.exit_success);
    }
}
