//! Worker lifecycle events.
//!
//! Events are published synchronously at the moment the worker changes state.
//! Subscribers (CLI progress output, dashboards, tests) receive them through
//! a broadcast channel without coupling to the worker internals.

use crate::work::{DiscoveredWork, WorkflowResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All lifecycle events emitted by the autonomous worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerEvent {
    /// The worker acquired its lock and began polling
    WorkerStarted {
        pid: u32,
        timestamp: DateTime<Utc>,
    },

    /// The worker released its lock
    WorkerStopped {
        timestamp: DateTime<Utc>,
    },

    /// An item was marked in-progress and handed to the executor
    WorkPickedUp {
        work: DiscoveredWork,
        timestamp: DateTime<Utc>,
    },

    /// The executor returned, successfully or not
    WorkCompleted {
        work: DiscoveredWork,
        result: WorkflowResult,
        timestamp: DateTime<Utc>,
    },

    /// An item was handed off to a human
    WorkEscalated {
        work: DiscoveredWork,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl WorkerEvent {
    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::WorkerStarted { .. } => "worker-started",
            Self::WorkerStopped { .. } => "worker-stopped",
            Self::WorkPickedUp { .. } => "work-picked-up",
            Self::WorkCompleted { .. } => "work-completed",
            Self::WorkEscalated { .. } => "work-escalated",
        }
    }
}

/// Fan-out of worker events over a `tokio::sync::broadcast` channel.
///
/// `publish` never waits on subscribers, so an event goes out in the same
/// step as the state change it reports. Slow subscribers lag and skip.
pub struct EventBus {
    sender: broadcast::Sender<Arc<WorkerEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: WorkerEvent) {
        tracing::debug!(event = event.name(), "Publishing worker event");
        // Err only means nobody is listening.
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<WorkerEvent>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
