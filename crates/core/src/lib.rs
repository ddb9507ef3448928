//! # nightshift core
//!
//! Domain types, traits, and error definitions for the nightshift autonomous
//! work queue. This crate has **no framework dependencies**: it defines the
//! domain model that every other crate builds against.
//!
//! ## Design Philosophy
//!
//! Every pluggable collaborator (work sources, executors, summarizers) is a
//! trait defined next to the data it consumes. Implementations live in their
//! respective crates. This keeps:
//! - the scheduler generic over where work comes from and how it runs
//! - tests cheap, because every seam accepts a small mock
//! - the dependency graph pointing inward at this crate

pub mod approval;
pub mod error;
pub mod event;
pub mod message;
pub mod source;
pub mod work;

// Re-export key types at crate root for ergonomics
pub use approval::{ApprovalDecision, Decision, DecisionRule};
pub use error::{QueueError, SourceError};
pub use event::{EventBus, WorkerEvent};
pub use message::{ContentBlock, Message, Role};
pub use source::WorkSourceProvider;
pub use work::{
    DiscoveredWork, Priority, SuggestedWorkflow, Tier, WorkSource, WorkStatus, WorkflowResult,
};
