//! `nightshift run`: start the autonomous worker.

use async_trait::async_trait;
use nightshift_config::AppConfig;
use nightshift_core::{ApprovalDecision, DiscoveredWork, WorkerEvent};
use nightshift_worker::{
    AutonomousWorker, CommandExecutor, ConfirmationHandler, CycleOutcome, CycleReport,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

/// Asks on the terminal before running an item that needs confirmation.
struct StdinConfirmation;

#[async_trait]
impl ConfirmationHandler for StdinConfirmation {
    async fn confirm(&self, work: &DiscoveredWork, decision: &ApprovalDecision) -> bool {
        let prompt = format!(
            "\n❓ {} [{} / {} / {}]\n   {}\n   Reason: {}\n   Run it? [y/N] ",
            work.summary, work.priority, work.tier, work.suggested_workflow, work.id, decision.reason
        );
        let mut stdout = tokio::io::stdout();
        if stdout.write_all(prompt.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            return false;
        }

        let mut line = String::new();
        match BufReader::new(tokio::io::stdin()).read_line(&mut line).await {
            Ok(_) => is_yes(&line),
            Err(_) => false,
        }
    }
}

/// Anything other than an explicit yes is a no.
fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn describe(report: &CycleReport) -> String {
    let outcome = match &report.outcome {
        CycleOutcome::Idle => "no pending work".to_string(),
        CycleOutcome::BudgetExhausted => "budget exhausted, nothing executed".to_string(),
        CycleOutcome::Escalated { work_id, reason } => format!("escalated {work_id}: {reason}"),
        CycleOutcome::Executed { work_id, result } if result.success => {
            format!("completed {work_id} (${:.2})", result.cost_usd)
        }
        CycleOutcome::Executed { work_id, result } => format!(
            "failed {work_id} (${:.2}): {}",
            result.cost_usd,
            result.error.as_deref().unwrap_or("unknown error")
        ),
    };
    let mut line = format!("discovered {}, {outcome}", report.discovered);
    if report.unmerged > 0 {
        line.push_str(&format!(" [{} item(s) not queued, retrying]", report.unmerged));
    }
    if !report.source_failures.is_empty() {
        line.push_str(&format!(" [failed sources: {}]", report.source_failures.join(", ")));
    }
    line
}

pub async fn run(
    config: &AppConfig,
    once: bool,
    interactive: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !config.executor.is_configured() {
        return Err("No executor configured: set [executor] command in the config file".into());
    }

    let executor = Arc::new(CommandExecutor::new(&config.executor));
    let mut worker = AutonomousWorker::from_app_config(config, executor);
    if interactive {
        worker = worker.with_confirmation(Arc::new(StdinConfirmation));
    }

    println!("🌙 nightshift worker");
    println!("   State dir:  {}", config.worker.state_dir.display());
    println!("   Executor:   {}", config.executor.command);
    println!("   Budget:     ${:.2}", config.worker.max_budget_usd);
    println!("   Queue:      {} item(s)", worker.queue().len());

    if once {
        worker.start()?;
        let report = worker.poll_once().await;
        worker.stop()?;
        println!("   {}", describe(&report?));
        return Ok(());
    }

    // Print lifecycle events as they happen
    let mut events = worker.events().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event.as_ref() {
                WorkerEvent::WorkPickedUp { work, .. } => {
                    println!("▶️  {} ({})", work.summary, work.id)
                }
                WorkerEvent::WorkCompleted { work, result, .. } if result.success => {
                    println!("✅ {} (${:.2})", work.summary, result.cost_usd)
                }
                WorkerEvent::WorkCompleted { work, result, .. } => println!(
                    "❌ {}: {}",
                    work.summary,
                    result.error.as_deref().unwrap_or("unknown error")
                ),
                WorkerEvent::WorkEscalated { work, reason, .. } => {
                    println!("🙋 {}: {reason}", work.summary)
                }
                WorkerEvent::WorkerStarted { .. } | WorkerEvent::WorkerStopped { .. } => {}
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current cycle");
            let _ = shutdown_tx.send(true);
        }
    });

    println!("   Polling every {}ms. Stop with Ctrl-C or `nightshift stop`.\n", config.worker.poll_interval_ms);
    worker.run(shutdown_rx).await?;
    println!("\n🌙 Worker stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nightshift_core::WorkflowResult;

    #[test]
    fn only_explicit_yes_confirms() {
        assert!(is_yes("y\n"));
        assert!(is_yes("  YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("sure"));
    }

    #[test]
    fn describe_reports_failures_and_sources() {
        let report = CycleReport {
            discovered: 2,
            source_failures: vec!["validation-report".into()],
            unmerged: 1,
            outcome: CycleOutcome::Executed {
                work_id: "w1".into(),
                result: WorkflowResult::failed(0.3, "tests red"),
            },
        };
        assert_eq!(
            describe(&report),
            "discovered 2, failed w1 ($0.30): tests red [1 item(s) not queued, retrying] [failed sources: validation-report]"
        );
    }

    #[tokio::test]
    async fn run_without_executor_is_an_error() {
        let config = AppConfig::default();
        let err = run(&config, true, false).await.unwrap_err();
        assert!(err.to_string().contains("No executor configured"));
    }
}
