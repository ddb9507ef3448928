//! `nightshift status`: show the last status written by a worker.

use nightshift_config::AppConfig;
use nightshift_worker::{StatusFile, WorkerLock, WorkerStatus};

fn render(status: &WorkerStatus) -> String {
    let mut out = String::new();
    let mut line = |s: String| {
        out.push_str(&s);
        out.push('\n');
    };

    line(format!("  Status:       {}", status.status));
    if let Some(pid) = status.pid {
        line(format!("  PID:          {pid}"));
    }
    if let Some(started) = status.started_at {
        line(format!("  Started:      {}", started.to_rfc3339()));
    }
    match status.last_poll_at {
        Some(at) => line(format!("  Last poll:    {}", at.to_rfc3339())),
        None => line("  Last poll:    never".to_string()),
    }
    if let Some(current) = &status.current_work {
        line(format!("  Working on:   {} ({})", current.summary, current.id));
    }
    line(format!(
        "  Processed:    {} completed, {} failed, {} escalated",
        status.stats.completed, status.stats.failed, status.stats.escalated
    ));
    line(format!(
        "  Queue:        {} pending, {} in progress, {} total",
        status.queue_stats.pending, status.queue_stats.in_progress, status.queue_stats.total
    ));
    line(format!(
        "  Budget:       ${:.2} of ${:.2}{}",
        status.budget.spent_usd,
        status.budget.max_usd,
        if status.budget.exhausted { " (exhausted)" } else { "" }
    ));
    out
}

pub fn run(config: &AppConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let status = StatusFile::new(config.worker.status_path()).read()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("🌙 nightshift status");
    println!("====================");
    println!("  State dir:    {}", config.worker.state_dir.display());

    match status {
        Some(status) => print!("{}", render(&status)),
        None => println!("  No worker has run here yet"),
    }

    let lock_path = config.worker.lock_path();
    if lock_path.exists() {
        match WorkerLock::read(&lock_path) {
            Some(info) => println!(
                "\n  🔒 Lock held by {} (pid {}) since {}",
                info.worker_id,
                info.pid,
                info.acquired_at.to_rfc3339()
            ),
            None => println!("\n  🔒 Lock file present but unreadable: {}", lock_path.display()),
        }
    }
    if config.worker.stop_path().exists() {
        println!("  🛑 Stop requested");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nightshift_worker::{BudgetStatus, CurrentWork, QueueSnapshot, WorkerState, WorkerStats};

    #[test]
    fn render_shows_budget_and_current_work() {
        let status = WorkerStatus {
            status: WorkerState::Processing,
            pid: Some(12),
            started_at: Some(Utc::now()),
            last_poll_at: None,
            current_work: Some(CurrentWork {
                id: "w7".into(),
                summary: "Fix flaky login test".into(),
                started_at: Utc::now(),
            }),
            stats: WorkerStats {
                completed: 4,
                escalated: 1,
                failed: 2,
                total_cost_usd: 3.5,
            },
            queue_stats: QueueSnapshot {
                pending: 5,
                in_progress: 1,
                total: 13,
            },
            budget: BudgetStatus {
                spent_usd: 10.0,
                max_usd: 10.0,
                exhausted: true,
            },
            updated_at: Utc::now(),
        };

        let text = render(&status);
        assert!(text.contains("Status:       processing"));
        assert!(text.contains("Last poll:    never"));
        assert!(text.contains("Fix flaky login test (w7)"));
        assert!(text.contains("4 completed, 2 failed, 1 escalated"));
        assert!(text.contains("$10.00 of $10.00 (exhausted)"));
    }
}
