//! The autonomous worker: one poll cycle at a time, one item at a time.
//!
//! Each cycle polls every enabled source, merges new items into the queue,
//! picks the best pending item and routes it through the approval policy:
//! escalate, ask for confirmation, or execute under the remaining budget.
//! Nothing runs in parallel, so queue and budget state are only touched by
//! the task driving the worker.

use crate::audit::{AuditEvent, AuditLog, AuditOutcome};
use crate::budget::BudgetTracker;
use crate::error::WorkerError;
use crate::executor::{ConfirmationHandler, WorkflowExecutor, WorkflowType, map_work_to_workflow};
use crate::lock::WorkerLock;
use crate::sources::{ManualQueueSource, ValidationReportSource};
use crate::status::{
    CurrentWork, QueueSnapshot, StatusFile, WorkerState, WorkerStats, WorkerStatus,
};
use crate::stop::StopSignal;
use chrono::{DateTime, Utc};
use nightshift_config::{AppConfig, WorkerConfig};
use nightshift_core::{
    ApprovalDecision, Decision, DiscoveredWork, EventBus, WorkStatus, WorkerEvent,
    WorkSourceProvider, WorkflowResult,
};
use nightshift_policy::ApprovalPolicy;
use nightshift_queue::PersistentQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What a single poll cycle did with the selected item.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Nothing pending
    Idle,
    /// Spend already met the limit; nothing was selected
    BudgetExhausted,
    Escalated { work_id: String, reason: String },
    Executed { work_id: String, result: WorkflowResult },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// New items merged into the queue this cycle
    pub discovered: usize,
    /// Names of sources whose poll failed
    pub source_failures: Vec<String>,
    /// Discovered items that could not be written to the queue; their
    /// sources are left uncommitted and offer them again next cycle
    pub unmerged: usize,
    pub outcome: CycleOutcome,
}

/// What the discovery step merged.
struct Discovery {
    merged: usize,
    source_failures: Vec<String>,
    unmerged: usize,
}

impl Discovery {
    fn report(self, outcome: CycleOutcome) -> CycleReport {
        CycleReport {
            discovered: self.merged,
            source_failures: self.source_failures,
            unmerged: self.unmerged,
            outcome,
        }
    }
}

pub struct AutonomousWorker {
    config: WorkerConfig,
    policy: ApprovalPolicy,
    queue: PersistentQueue,
    sources: Vec<Arc<dyn WorkSourceProvider>>,
    executor: Arc<dyn WorkflowExecutor>,
    confirmation: Option<Arc<dyn ConfirmationHandler>>,
    events: Arc<EventBus>,
    audit: Arc<AuditLog>,
    budget: BudgetTracker,
    status_file: StatusFile,
    stop_signal: StopSignal,
    lock: Option<WorkerLock>,
    state: WorkerState,
    started_at: Option<DateTime<Utc>>,
    last_poll_at: Option<DateTime<Utc>>,
    current_work: Option<CurrentWork>,
    stats: WorkerStats,
    budget_exhaustion_logged: bool,
}

impl AutonomousWorker {
    /// Create a worker over the state directory named in `config`.
    ///
    /// The queue file is loaded immediately; the lock is not taken until
    /// [`start`](Self::start).
    pub fn new(
        config: WorkerConfig,
        policy: ApprovalPolicy,
        executor: Arc<dyn WorkflowExecutor>,
    ) -> Self {
        let queue = PersistentQueue::open(config.queue_path(), config.max_queue_items);
        let audit = Arc::new(AuditLog::to_file(config.audit_path()));
        let status_file = StatusFile::new(config.status_path());
        let stop_signal = StopSignal::new(config.stop_path());
        let budget = BudgetTracker::new(config.max_budget_usd);

        Self {
            config,
            policy,
            queue,
            sources: Vec::new(),
            executor,
            confirmation: None,
            events: Arc::new(EventBus::default()),
            audit,
            budget,
            status_file,
            stop_signal,
            lock: None,
            state: WorkerState::Idle,
            started_at: None,
            last_poll_at: None,
            current_work: None,
            stats: WorkerStats::default(),
            budget_exhaustion_logged: false,
        }
    }

    /// Build a worker from the full application config, registering the
    /// built-in sources and the configured per-workflow cost estimates.
    pub fn from_app_config(config: &AppConfig, executor: Arc<dyn WorkflowExecutor>) -> Self {
        let policy = ApprovalPolicy::new(config.policy.clone())
            .with_cost_estimates(config.worker.cost_estimates.clone());
        let manual = ManualQueueSource::from_config(
            &config.sources.manual_queue,
            &config.worker.state_dir,
        );
        let validation = ValidationReportSource::from_config(&config.sources.validation_report);

        Self::new(config.worker.clone(), policy, executor)
            .with_source(Arc::new(manual))
            .with_source(Arc::new(validation))
    }

    pub fn with_source(mut self, source: Arc<dyn WorkSourceProvider>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_confirmation(mut self, handler: Arc<dyn ConfirmationHandler>) -> Self {
        self.confirmation = Some(handler);
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Take the worker lock and mark the worker running.
    pub fn start(&mut self) -> Result<(), WorkerError> {
        if self.lock.is_some() {
            return Err(WorkerError::AlreadyStarted);
        }

        let lock = WorkerLock::acquire(self.config.lock_path(), &self.config.worker_id)?;
        let pid = lock.info().pid;
        self.lock = Some(lock);

        // A leftover request from a previous run must not stop this one.
        if self.stop_signal.consume() {
            debug!(path = %self.stop_signal.path().display(), "Cleared stale stop signal");
        }

        let now = Utc::now();
        self.state = WorkerState::Running;
        self.started_at = Some(now);

        info!(
            worker_id = %self.config.worker_id,
            pid,
            state_dir = %self.config.state_dir.display(),
            "Worker started"
        );
        self.events.publish(WorkerEvent::WorkerStarted { pid, timestamp: now });
        self.audit
            .log(AuditEvent::WorkerStarted, None, AuditOutcome::Success, None);
        self.write_status();
        Ok(())
    }

    /// Release the worker lock.
    pub fn stop(&mut self) -> Result<(), WorkerError> {
        let lock = self.lock.take().ok_or(WorkerError::NotStarted)?;
        lock.release()?;

        self.state = WorkerState::Idle;
        self.current_work = None;

        info!(
            worker_id = %self.config.worker_id,
            completed = self.stats.completed,
            escalated = self.stats.escalated,
            failed = self.stats.failed,
            spent_usd = self.budget.spent(),
            "Worker stopped"
        );
        self.events.publish(WorkerEvent::WorkerStopped {
            timestamp: Utc::now(),
        });
        self.audit
            .log(AuditEvent::WorkerStopped, None, AuditOutcome::Success, None);
        self.write_status();
        Ok(())
    }

    /// Start, poll every `poll_interval_ms` until the stop file appears or
    /// `shutdown` flips to `true`, then stop.
    ///
    /// An in-flight execution is never interrupted; shutdown is noticed
    /// between cycles.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
        self.start()?;
        let interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if self.stop_signal.consume() {
                info!("Stop signal received");
                break;
            }
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.poll_once().await {
                warn!(error = %e, "Poll cycle failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown requested");
                        break;
                    }
                }
            }
        }

        self.stop()
    }

    // ── Poll cycle ──────────────────────────────────────────────────────────

    /// Run one full cycle. The status file is rewritten afterwards whether
    /// or not the cycle succeeded.
    pub async fn poll_once(&mut self) -> Result<CycleReport, WorkerError> {
        self.last_poll_at = Some(Utc::now());
        let report = self.cycle().await;
        self.write_status();
        report
    }

    async fn cycle(&mut self) -> Result<CycleReport, WorkerError> {
        // Pick up operator edits made since the last cycle.
        self.queue.reload();

        let discovery = self.discover().await;

        if self.budget.is_exhausted() {
            if !self.budget_exhaustion_logged {
                warn!(
                    spent_usd = self.budget.spent(),
                    max_usd = self.config.max_budget_usd,
                    "Budget exhausted, pausing execution"
                );
                self.audit.log(
                    AuditEvent::BudgetExhausted {
                        spent_usd: self.budget.spent(),
                        max_usd: self.config.max_budget_usd,
                    },
                    None,
                    AuditOutcome::Skipped,
                    None,
                );
                self.budget_exhaustion_logged = true;
            }
            return Ok(discovery.report(CycleOutcome::BudgetExhausted));
        }

        let Some(work) = self.queue.get_next_work().cloned() else {
            debug!("No pending work");
            return Ok(discovery.report(CycleOutcome::Idle));
        };

        let decision = self.policy.evaluate(&work);
        debug!(
            work_id = %work.id,
            decision = %decision.decision,
            rule = %decision.rule,
            "Approval evaluated"
        );
        self.audit.log(
            AuditEvent::ApprovalEvaluated {
                decision: decision.decision.to_string(),
                rule: decision.rule.to_string(),
            },
            Some(&work.id),
            AuditOutcome::Success,
            Some(decision.reason.clone()),
        );

        let outcome = match decision.decision {
            Decision::Escalate => self.escalate(&work, decision.reason.clone())?,
            Decision::Confirm => {
                if self.request_confirmation(&work, &decision).await {
                    self.dispatch(&work).await?
                } else {
                    let reason = if self.confirmation.is_some() {
                        format!("confirmation rejected ({})", decision.reason)
                    } else {
                        format!("no confirmation handler ({})", decision.reason)
                    };
                    self.escalate(&work, reason)?
                }
            }
            Decision::AutoExecute => self.dispatch(&work).await?,
        };

        Ok(discovery.report(outcome))
    }

    /// Poll all enabled sources and merge new items into the queue.
    ///
    /// Neither a failing source nor a failing queue write stops the cycle. A
    /// source is committed only when every item it returned is in the queue.
    async fn discover(&mut self) -> Discovery {
        let enabled: Vec<Arc<dyn WorkSourceProvider>> = self
            .sources
            .iter()
            .filter(|s| s.enabled())
            .cloned()
            .collect();

        let polls = enabled.iter().map(|source| source.poll());
        let results = futures::future::join_all(polls).await;

        let mut discovery = Discovery {
            merged: 0,
            source_failures: Vec::new(),
            unmerged: 0,
        };

        for (source, result) in enabled.iter().zip(results) {
            let items = match result {
                Ok(items) => items,
                Err(e) => {
                    warn!(source = source.name(), error = %e, "Work source failed");
                    self.audit.log(
                        AuditEvent::SourceFailed {
                            source_name: source.name().to_string(),
                        },
                        None,
                        AuditOutcome::Failure,
                        Some(e.to_string()),
                    );
                    discovery.source_failures.push(source.name().to_string());
                    continue;
                }
            };

            let mut unmerged = 0;
            for item in items {
                if self.queue.contains(&item.id) {
                    continue;
                }
                let id = item.id.clone();
                match self.queue.add(item) {
                    Ok(_) => {
                        self.audit.log(
                            AuditEvent::WorkDiscovered {
                                source: source.source().to_string(),
                            },
                            Some(&id),
                            AuditOutcome::Success,
                            None,
                        );
                        discovery.merged += 1;
                    }
                    Err(e) => {
                        warn!(source = source.name(), work_id = %id, error = %e, "Could not queue discovered work");
                        self.audit.log(
                            AuditEvent::MergeFailed {
                                source_name: source.name().to_string(),
                            },
                            Some(&id),
                            AuditOutcome::Failure,
                            Some(e.to_string()),
                        );
                        unmerged += 1;
                    }
                }
            }

            if unmerged == 0 {
                if let Err(e) = source.commit().await {
                    warn!(source = source.name(), error = %e, "Work source commit failed");
                }
            }
            discovery.unmerged += unmerged;
        }

        if discovery.merged > 0 {
            info!(discovered = discovery.merged, queued = self.queue.len(), "Merged new work");
        }
        discovery
    }

    async fn request_confirmation(&self, work: &DiscoveredWork, decision: &ApprovalDecision) -> bool {
        let Some(handler) = self.confirmation.clone() else {
            return false;
        };
        info!(work_id = %work.id, summary = %work.summary, "Awaiting confirmation");
        handler.confirm(work, decision).await
    }

    fn escalate(&mut self, work: &DiscoveredWork, reason: String) -> Result<CycleOutcome, WorkerError> {
        let updated = self.queue.update(&work.id, |w| {
            w.status = WorkStatus::Escalated;
            w.completed_at = Some(Utc::now());
            w.resolution = Some(reason.clone());
        })?;
        self.stats.escalated += 1;

        info!(work_id = %work.id, reason = %reason, "Work escalated");
        self.audit.log(
            AuditEvent::WorkEscalated,
            Some(&work.id),
            AuditOutcome::Skipped,
            Some(reason.clone()),
        );
        self.events.publish(WorkerEvent::WorkEscalated {
            work: updated,
            reason: reason.clone(),
            timestamp: Utc::now(),
        });

        Ok(CycleOutcome::Escalated {
            work_id: work.id.clone(),
            reason,
        })
    }

    async fn dispatch(&mut self, work: &DiscoveredWork) -> Result<CycleOutcome, WorkerError> {
        match map_work_to_workflow(work.suggested_workflow) {
            Some(workflow) => self.execute(work, workflow).await,
            None => self.escalate(
                work,
                format!("no executable workflow for {}", work.suggested_workflow),
            ),
        }
    }

    async fn execute(
        &mut self,
        work: &DiscoveredWork,
        workflow: WorkflowType,
    ) -> Result<CycleOutcome, WorkerError> {
        let started_at = Utc::now();
        let worker_id = self.config.worker_id.clone();
        let picked = self.queue.update(&work.id, |w| {
            w.status = WorkStatus::InProgress;
            w.started_at = Some(started_at);
            w.assigned_to = Some(worker_id);
        })?;

        let budget_usd = self.config.per_work_budget_usd.min(self.budget.remaining());
        self.state = WorkerState::Processing;
        self.current_work = Some(CurrentWork::of(&picked, started_at));
        self.write_status();

        info!(work_id = %work.id, workflow = %workflow, budget_usd, "Executing work");
        self.events.publish(WorkerEvent::WorkPickedUp {
            work: picked,
            timestamp: started_at,
        });
        self.audit.log(
            AuditEvent::ExecutionStarted {
                workflow: workflow.to_string(),
                budget_usd,
            },
            Some(&work.id),
            AuditOutcome::Success,
            None,
        );

        let result = self
            .executor
            .execute(workflow, &work.description, budget_usd)
            .await;

        self.budget.record(result.cost_usd);
        let finished = self.queue.update(&work.id, |w| {
            w.completed_at = Some(Utc::now());
            if result.success {
                w.status = WorkStatus::Completed;
                w.resolution = result.resolution.clone();
            } else {
                w.status = WorkStatus::Failed;
                w.resolution = result.error.clone();
            }
        });

        self.current_work = None;
        self.state = if self.lock.is_some() {
            WorkerState::Running
        } else {
            WorkerState::Idle
        };
        let finished = finished?;

        if result.success {
            self.stats.completed += 1;
            self.stats.total_cost_usd += result.cost_usd;
            info!(work_id = %work.id, cost_usd = result.cost_usd, "Work completed");
        } else {
            self.stats.failed += 1;
            warn!(
                work_id = %work.id,
                cost_usd = result.cost_usd,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Work failed"
            );
        }

        self.audit.log(
            AuditEvent::ExecutionFinished {
                workflow: workflow.to_string(),
                cost_usd: result.cost_usd,
            },
            Some(&work.id),
            if result.success {
                AuditOutcome::Success
            } else {
                AuditOutcome::Failure
            },
            result.error.clone().or_else(|| result.resolution.clone()),
        );
        self.events.publish(WorkerEvent::WorkCompleted {
            work: finished,
            result: result.clone(),
            timestamp: Utc::now(),
        });

        Ok(CycleOutcome::Executed {
            work_id: work.id.clone(),
            result,
        })
    }

    // ── Status ──────────────────────────────────────────────────────────────

    fn write_status(&self) {
        if let Err(e) = self.status_file.write(&self.status()) {
            warn!(path = %self.status_file.path().display(), error = %e, "Failed to write worker status");
        }
    }

    /// Current status snapshot, as written to the status file.
    pub fn status(&self) -> WorkerStatus {
        let queue_stats = self.queue.get_stats();
        WorkerStatus {
            status: self.state,
            pid: self.lock.as_ref().map(|l| l.info().pid),
            started_at: self.started_at,
            last_poll_at: self.last_poll_at,
            current_work: self.current_work.clone(),
            stats: self.stats.clone(),
            queue_stats: QueueSnapshot {
                pending: queue_stats.pending(),
                in_progress: queue_stats.in_progress(),
                total: queue_stats.total,
            },
            budget: self.budget.status(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_started(&self) -> bool {
        self.lock.is_some()
    }

    pub fn is_budget_exhausted(&self) -> bool {
        self.budget.is_exhausted()
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn queue(&self) -> &PersistentQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut PersistentQueue {
        &mut self.queue
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop_signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nightshift_config::PolicyConfig;
    use nightshift_core::{Priority, SuggestedWorkflow, Tier, WorkSource};
    use std::sync::Mutex;

    struct FixedCost {
        cost: f64,
        calls: Mutex<Vec<(WorkflowType, f64)>>,
    }

    impl FixedCost {
        fn new(cost: f64) -> Arc<Self> {
            Arc::new(Self {
                cost,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl WorkflowExecutor for FixedCost {
        async fn execute(&self, workflow: WorkflowType, _description: &str, budget_usd: f64) -> WorkflowResult {
            self.calls.lock().unwrap().push((workflow, budget_usd));
            WorkflowResult::succeeded(self.cost, "done")
        }
    }

    fn worker(dir: &std::path::Path, executor: Arc<dyn WorkflowExecutor>) -> AutonomousWorker {
        let mut config = WorkerConfig::in_dir(dir);
        config.max_budget_usd = 1.0;
        config.per_work_budget_usd = 0.75;
        AutonomousWorker::new(config, ApprovalPolicy::new(PolicyConfig::default()), executor)
            .with_audit(Arc::new(AuditLog::new()))
    }

    fn item(tier: Tier, workflow: SuggestedWorkflow) -> DiscoveredWork {
        DiscoveredWork::new(
            WorkSource::UserRequest,
            Priority::Medium,
            tier,
            workflow,
            "summary",
            "description",
        )
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = worker(dir.path(), FixedCost::new(0.1));
        w.start().unwrap();
        assert!(matches!(w.start(), Err(WorkerError::AlreadyStarted)));
        w.stop().unwrap();
        assert!(matches!(w.stop(), Err(WorkerError::NotStarted)));
    }

    #[tokio::test]
    async fn executor_budget_is_capped_by_remaining_spend() {
        let dir = tempfile::tempdir().unwrap();
        let exec = FixedCost::new(0.5);
        let mut w = worker(dir.path(), exec.clone());
        w.queue_mut().add(item(Tier::ONE, SuggestedWorkflow::Investigation)).unwrap();
        w.queue_mut().add(item(Tier::ONE, SuggestedWorkflow::Refactor)).unwrap();

        w.poll_once().await.unwrap();
        w.poll_once().await.unwrap();

        let calls = exec.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], (WorkflowType::BugFix, 0.75));
        assert_eq!(calls[1].0, WorkflowType::Refactor);
        assert!((calls[1].1 - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn escalated_item_is_not_reselected() {
        let dir = tempfile::tempdir().unwrap();
        let exec = FixedCost::new(0.1);
        let mut w = worker(dir.path(), exec.clone());
        let tier4 = item(Tier::FOUR, SuggestedWorkflow::BugFix);
        let id = tier4.id.clone();
        w.queue_mut().add(tier4).unwrap();

        let first = w.poll_once().await.unwrap();
        assert!(matches!(first.outcome, CycleOutcome::Escalated { ref work_id, .. } if *work_id == id));
        let second = w.poll_once().await.unwrap();
        assert_eq!(second.outcome, CycleOutcome::Idle);

        let stored = w.queue().get(&id).unwrap();
        assert_eq!(stored.status, WorkStatus::Escalated);
        assert!(stored.resolution.as_deref().unwrap().contains("tier default"));
        assert_eq!(w.stats().escalated, 1);
        assert!(exec.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_execution_counts_toward_budget_not_cost_stats() {
        struct Failing;

        #[async_trait]
        impl WorkflowExecutor for Failing {
            async fn execute(&self, _: WorkflowType, _: &str, _: f64) -> WorkflowResult {
                WorkflowResult::failed(0.4, "tests still red")
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let mut w = worker(dir.path(), Arc::new(Failing));
        let work = item(Tier::ONE, SuggestedWorkflow::BugFix);
        let id = work.id.clone();
        w.queue_mut().add(work).unwrap();

        w.poll_once().await.unwrap();

        let stored = w.queue().get(&id).unwrap();
        assert_eq!(stored.status, WorkStatus::Failed);
        assert_eq!(stored.resolution.as_deref(), Some("tests still red"));
        assert_eq!(w.stats().failed, 1);
        assert_eq!(w.stats().total_cost_usd, 0.0);
        assert!((w.status().budget.spent_usd - 0.4).abs() < 1e-9);
    }

    /// Offers its items on every poll until committed.
    struct Redelivering {
        name: &'static str,
        items: Vec<DiscoveredWork>,
        commits: Mutex<usize>,
    }

    #[async_trait]
    impl WorkSourceProvider for Redelivering {
        fn name(&self) -> &str {
            self.name
        }
        fn source(&self) -> WorkSource {
            WorkSource::UserRequest
        }
        async fn poll(&self) -> Result<Vec<DiscoveredWork>, nightshift_core::SourceError> {
            if *self.commits.lock().unwrap() > 0 {
                return Ok(Vec::new());
            }
            Ok(self.items.clone())
        }
        async fn commit(&self) -> Result<(), nightshift_core::SourceError> {
            *self.commits.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_queue_writes_do_not_abort_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let audit = Arc::new(AuditLog::new());
        let first = Arc::new(Redelivering {
            name: "first",
            items: vec![item(Tier::FOUR, SuggestedWorkflow::BugFix)],
            commits: Mutex::new(0),
        });
        let second = Arc::new(Redelivering {
            name: "second",
            items: vec![item(Tier::FOUR, SuggestedWorkflow::Refactor)],
            commits: Mutex::new(0),
        });
        let mut w = worker(dir.path(), FixedCost::new(0.1))
            .with_audit(audit.clone())
            .with_source(first.clone())
            .with_source(second.clone());
        let queue_path = w.config().queue_path();
        std::fs::create_dir_all(&queue_path).unwrap();

        let report = w.poll_once().await.unwrap();
        assert_eq!(report.unmerged, 2);
        assert_eq!(report.discovered, 0);
        assert!(report.source_failures.is_empty());
        assert_eq!(audit.entries_by_outcome(AuditOutcome::Failure).len(), 2);
        assert_eq!(*first.commits.lock().unwrap(), 0);
        assert_eq!(*second.commits.lock().unwrap(), 0);

        std::fs::remove_dir(&queue_path).unwrap();
        let report = w.poll_once().await.unwrap();
        assert_eq!(report.discovered, 2);
        assert_eq!(report.unmerged, 0);
        assert_eq!(*first.commits.lock().unwrap(), 1);
        assert_eq!(*second.commits.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn events_follow_execution() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = worker(dir.path(), FixedCost::new(0.1));
        let mut rx = w.events().subscribe();
        w.queue_mut().add(item(Tier::ONE, SuggestedWorkflow::BugFix)).unwrap();

        w.poll_once().await.unwrap();

        assert_eq!(rx.recv().await.unwrap().name(), "work-picked-up");
        assert_eq!(rx.recv().await.unwrap().name(), "work-completed");
    }
}
