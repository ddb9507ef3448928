//! `nightshift queue`: add manual requests or list the work queue.
//!
//! `add` appends to the manual queue file rather than the work queue, so a
//! running worker stays the only writer of the queue itself.

use clap::Subcommand;
use nightshift_config::AppConfig;
use nightshift_core::{Priority, SuggestedWorkflow, Tier, WorkStatus};
use nightshift_queue::PersistentQueue;
use nightshift_worker::{ManualQueueSource, ManualRequest};
use serde::de::DeserializeOwned;

#[derive(Subcommand)]
pub enum QueueAction {
    /// Queue a request for the worker
    Add {
        /// One-line summary
        summary: String,

        /// Full description handed to the executor
        #[arg(short, long)]
        description: Option<String>,

        /// critical, high, medium or low
        #[arg(short, long, default_value = "medium", value_parser = parse_wire::<Priority>)]
        priority: Priority,

        /// 1 (run unattended) to 4 (always escalate)
        #[arg(short, long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=4))]
        tier: u8,

        /// bug-fix, refactor, new-feature, investigation or manual-review
        #[arg(short, long, default_value = "bug-fix", value_parser = parse_wire::<SuggestedWorkflow>)]
        workflow: SuggestedWorkflow,

        /// Explicit id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// List queued work in rank order
    List {
        /// Include completed, failed and escalated items
        #[arg(short, long)]
        all: bool,
    },
}

/// Parse a CLI value using the type's JSON wire name.
fn parse_wire<T: DeserializeOwned>(value: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| format!("invalid value '{value}'"))
}

pub fn run(config: &AppConfig, action: QueueAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        QueueAction::Add {
            summary,
            description,
            priority,
            tier,
            workflow,
            id,
        } => {
            let tier = Tier::new(tier).ok_or("tier must be between 1 and 4")?;
            let request = ManualRequest {
                id,
                summary,
                description: description.unwrap_or_default(),
                priority,
                tier,
                workflow,
            };
            let path = config
                .worker
                .state_dir
                .join(&config.sources.manual_queue.file);
            let request = ManualQueueSource::append(&path, request)?;

            println!("✅ Queued: {} [{}]", request.summary, request.id.unwrap_or_default());
            println!("   {} / {} / {}", request.priority, request.tier, request.workflow);
            if !config.sources.manual_queue.enabled {
                println!("   ⚠️  sources.manual_queue is disabled; the worker will not pick this up");
            }
        }
        QueueAction::List { all } => {
            let queue = PersistentQueue::open(config.worker.queue_path(), config.worker.max_queue_items);
            let items: Vec<_> = queue
                .list()
                .into_iter()
                .filter(|w| all || !w.status.is_terminal())
                .collect();

            if items.is_empty() {
                println!("Queue is empty");
                return Ok(());
            }

            for work in &items {
                let marker = match work.status {
                    WorkStatus::Pending => "·",
                    WorkStatus::InProgress => "▶",
                    WorkStatus::Completed => "✓",
                    WorkStatus::Failed => "✗",
                    WorkStatus::Escalated => "↑",
                };
                println!(
                    "{marker} {:<9} {} {:<13} {}  [{}]",
                    work.priority.as_str(),
                    work.tier,
                    work.suggested_workflow.as_str(),
                    work.summary,
                    work.id
                );
            }

            let stats = queue.get_stats();
            println!(
                "\n{} pending, {} in progress, {} total",
                stats.pending(),
                stats.in_progress(),
                stats.total
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nightshift_config::WorkerConfig;
    use nightshift_core::WorkSourceProvider;

    #[test]
    fn parses_wire_names() {
        assert_eq!(parse_wire::<Priority>("critical").unwrap(), Priority::Critical);
        assert_eq!(
            parse_wire::<SuggestedWorkflow>("new-feature").unwrap(),
            SuggestedWorkflow::NewFeature
        );
        assert!(parse_wire::<Priority>("urgent").is_err());
    }

    #[tokio::test]
    async fn add_appends_to_manual_queue() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            worker: WorkerConfig::in_dir(dir.path()),
            ..AppConfig::default()
        };

        run(
            &config,
            QueueAction::Add {
                summary: "Upgrade lodash".into(),
                description: None,
                priority: Priority::High,
                tier: 3,
                workflow: SuggestedWorkflow::Refactor,
                id: Some("req-9".into()),
            },
        )
        .unwrap();

        let source = ManualQueueSource::from_config(&config.sources.manual_queue, dir.path());
        let items = source.poll().await.unwrap();
        source.commit().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "req-9");
        assert_eq!(items[0].tier, Tier::THREE);
        assert_eq!(items[0].description, "Upgrade lodash");
        assert!(!config.worker.queue_path().exists());
    }
}
