//! Workflow execution and confirmation seams.
//!
//! The worker never does the work itself. It hands a [`WorkflowType`], the
//! item description and a budget to a [`WorkflowExecutor`], and asks a
//! [`ConfirmationHandler`] before running items that need a human yes.

use async_trait::async_trait;
use nightshift_config::ExecutorConfig;
use nightshift_core::{ApprovalDecision, DiscoveredWork, SuggestedWorkflow, WorkflowResult};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Workflows an executor knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowType {
    BugFix,
    Refactor,
    NewFeature,
}

impl WorkflowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BugFix => "bug-fix",
            Self::Refactor => "refactor",
            Self::NewFeature => "new-feature",
        }
    }
}

impl std::fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the workflow for a suggestion. `None` means "needs a human".
pub fn map_work_to_workflow(suggested: SuggestedWorkflow) -> Option<WorkflowType> {
    match suggested {
        SuggestedWorkflow::BugFix | SuggestedWorkflow::Investigation => Some(WorkflowType::BugFix),
        SuggestedWorkflow::Refactor => Some(WorkflowType::Refactor),
        SuggestedWorkflow::NewFeature => Some(WorkflowType::NewFeature),
        SuggestedWorkflow::ManualReview => None,
    }
}

/// Runs one workflow to completion.
///
/// Failure is a normal result (`success: false`), not an error.
#[async_trait]
pub trait WorkflowExecutor: Send + Sync {
    async fn execute(
        &self,
        workflow: WorkflowType,
        description: &str,
        budget_usd: f64,
    ) -> WorkflowResult;
}

/// Asks a human whether a `confirm` item may run. May wait indefinitely.
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    async fn confirm(&self, work: &DiscoveredWork, decision: &ApprovalDecision) -> bool;
}

/// Runs an external agent command per work item.
///
/// The command gets `NIGHTSHIFT_WORKFLOW` and `NIGHTSHIFT_BUDGET_USD` in its
/// environment and the description on stdin. The last stdout line that
/// parses as a [`WorkflowResult`] is the result; a non-zero exit without
/// one, or no parseable line at all, is a failure with zero cost.
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            program: config.command.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn run(&self, workflow: WorkflowType, description: &str, budget_usd: f64) -> Result<WorkflowResult, String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("NIGHTSHIFT_WORKFLOW", workflow.as_str())
            .env("NIGHTSHIFT_BUDGET_USD", format!("{budget_usd:.2}"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to start '{}': {e}", self.program))?;

        // Fed from its own task so stdout keeps draining while stdin is full.
        // Commands that ignore stdin may exit before the write lands.
        let feeder = child.stdin.take().map(|mut stdin| {
            let description = description.to_owned();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(description.as_bytes()).await {
                    debug!(error = %e, "Executor did not read the description");
                }
            })
        });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output()).await;
        if let Some(feeder) = feeder {
            feeder.abort();
        }
        let output = output
            .map_err(|_| format!("timed out after {}s", self.timeout.as_secs()))?
            .map_err(|e| e.to_string())?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed = stdout
            .lines()
            .rev()
            .find_map(|line| serde_json::from_str::<WorkflowResult>(line.trim()).ok());

        match parsed {
            Some(result) => Ok(result),
            None if output.status.success() => Err("executor produced no result line".into()),
            None => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
                Err(format!(
                    "exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    tail.into_iter().rev().collect::<Vec<_>>().join("\n")
                ))
            }
        }
    }
}

#[async_trait]
impl WorkflowExecutor for CommandExecutor {
    async fn execute(&self, workflow: WorkflowType, description: &str, budget_usd: f64) -> WorkflowResult {
        debug!(program = %self.program, workflow = %workflow, budget_usd, "Launching executor");
        match self.run(workflow, description, budget_usd).await {
            Ok(result) => result,
            Err(reason) => {
                warn!(program = %self.program, workflow = %workflow, "Executor failed: {reason}");
                WorkflowResult::failed(0.0, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_mapping() {
        assert_eq!(map_work_to_workflow(SuggestedWorkflow::BugFix), Some(WorkflowType::BugFix));
        assert_eq!(
            map_work_to_workflow(SuggestedWorkflow::Investigation),
            Some(WorkflowType::BugFix)
        );
        assert_eq!(map_work_to_workflow(SuggestedWorkflow::Refactor), Some(WorkflowType::Refactor));
        assert_eq!(
            map_work_to_workflow(SuggestedWorkflow::NewFeature),
            Some(WorkflowType::NewFeature)
        );
        assert_eq!(map_work_to_workflow(SuggestedWorkflow::ManualReview), None);
    }

    fn sh(script: &str) -> CommandExecutor {
        CommandExecutor::new(&ExecutorConfig {
            command: "sh".into(),
            args: vec!["-c".into(), script.into()],
            timeout_secs: 10,
        })
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_executor_parses_last_json_line() {
        let exec = sh(
            r#"read desc; echo "working on $desc for $NIGHTSHIFT_WORKFLOW"; echo "{\"success\":true,\"costUsd\":0.42,\"resolution\":\"$NIGHTSHIFT_BUDGET_USD\"}""#,
        );
        let result = exec.execute(WorkflowType::Refactor, "login.js\n", 1.5).await;
        assert!(result.success);
        assert_eq!(result.cost_usd, 0.42);
        assert_eq!(result.resolution.as_deref(), Some("1.50"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_without_result_is_failure() {
        let exec = sh("echo oops >&2; exit 2");
        let result = exec.execute(WorkflowType::BugFix, "x", 1.0).await;
        assert!(!result.success);
        assert_eq!(result.cost_usd, 0.0);
        assert!(result.error.unwrap().contains("oops"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn chatty_executor_with_large_description_does_not_stall() {
        let exec = CommandExecutor::new(&ExecutorConfig {
            command: "sh".into(),
            args: vec![
                "-c".into(),
                r#"head -c 300000 /dev/zero | tr '\0' x; echo; cat > /dev/null; echo '{"success":true,"costUsd":0.1}'"#.into(),
            ],
            timeout_secs: 10,
        });
        let description = "d".repeat(1 << 20);

        let result = exec.execute(WorkflowType::BugFix, &description, 1.0).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.cost_usd, 0.1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_program_is_failure() {
        let exec = CommandExecutor::new(&ExecutorConfig {
            command: "/nonexistent/agent".into(),
            args: vec![],
            timeout_secs: 10,
        });
        let result = exec.execute(WorkflowType::BugFix, "x", 1.0).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("failed to start"));
    }
}
