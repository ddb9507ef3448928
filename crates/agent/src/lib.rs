//! Supervision of a single agent execution.
//!
//! Work items are executed by an external agent that runs a turn loop:
//! the model calls tools, the results come back, repeat. Two things go wrong
//! in long sessions, and this crate handles both:
//!
//! 1. **Stalls**: the agent repeats itself, flips between two actions, or
//!    stops touching files. [`StallDetector`] spots the pattern and
//!    [`InterventionTracker`] decides when nudging should give way to a
//!    hard stop.
//! 2. **Context growth**: tool output and history eventually exceed the
//!    model's input limit. [`context`] truncates each tool result before it
//!    re-enters the conversation and compacts the middle of the history when
//!    the token count crosses a threshold.
//!
//! Both operate inside one execution and never touch the work queue.

pub mod context;
pub mod stall;

pub use context::{
    CompactionResult, ContextManager, HeuristicSummarizer, Summarizer, ToolFamily,
    TruncationResult,
};
pub use stall::{
    Intervention, InterventionTracker, StallDetector, StallEvent, StallKind, ToolCallRecord,
    hash_input,
};
