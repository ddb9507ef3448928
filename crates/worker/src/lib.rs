//! # nightshift worker
//!
//! The autonomous worker and everything it owns on disk: the cross-process
//! lock, the stop-signal file, the status file and the audit log. Execution
//! and human confirmation are injected through the [`WorkflowExecutor`] and
//! [`ConfirmationHandler`] traits.

pub mod audit;
pub mod budget;
pub mod error;
pub mod executor;
pub mod lock;
pub mod sources;
pub mod status;
pub mod stop;
pub mod worker;

pub use audit::{AuditEntry, AuditEvent, AuditLog, AuditOutcome, AuditSink, JsonlFileSink, TracingSink};
pub use budget::{BudgetStatus, BudgetTracker};
pub use error::WorkerError;
pub use executor::{
    CommandExecutor, ConfirmationHandler, WorkflowExecutor, WorkflowType, map_work_to_workflow,
};
pub use lock::{LockInfo, WorkerLock};
pub use sources::{ManualQueueSource, ManualRequest, ValidationFailure, ValidationReportSource};
pub use status::{CurrentWork, QueueSnapshot, StatusFile, WorkerState, WorkerStats, WorkerStatus};
pub use stop::StopSignal;
pub use worker::{AutonomousWorker, CycleOutcome, CycleReport};
