//! Two-layer context size control for a running agent.
//!
//! | Layer | When | What |
//! |-------|------|------|
//! | 1. Truncation | every tool result | cut output per tool family, leave an omission marker |
//! | 2. Compaction | input tokens reach the threshold | summarize the middle of the history |

pub mod compact;
pub mod token;
pub mod truncate;

pub use compact::{CompactionResult, HeuristicSummarizer, Summarizer, compact};
pub use token::{estimate_message_tokens, estimate_messages_tokens, estimate_tokens};
pub use truncate::{ToolFamily, TruncationResult, parse_omitted_marker, truncate};

use nightshift_config::ContextConfig;
use nightshift_core::message::Message;
use tracing::{debug, info};

/// Applies truncation and compaction with one configuration.
pub struct ContextManager {
    config: ContextConfig,
    summarizer: Box<dyn Summarizer>,
}

impl ContextManager {
    /// A manager using the [`HeuristicSummarizer`].
    pub fn new(config: ContextConfig) -> Self {
        Self::with_summarizer(config, Box::new(HeuristicSummarizer))
    }

    pub fn with_summarizer(config: ContextConfig, summarizer: Box<dyn Summarizer>) -> Self {
        Self { config, summarizer }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Truncate the output of the tool called `tool_name`.
    pub fn truncate_tool_output(&self, tool_name: &str, output: &str) -> TruncationResult {
        let family = ToolFamily::from_tool_name(tool_name);
        let result = truncate(family, output, &self.config.truncation);
        if result.was_truncated {
            debug!(
                tool = tool_name,
                family = ?family,
                omitted = result.omitted,
                "Truncated tool output"
            );
        }
        result
    }

    /// Whether `input_tokens` has reached the compaction threshold.
    pub fn should_compact(&self, input_tokens: usize) -> bool {
        input_tokens >= self.config.compaction_threshold_tokens
    }

    /// Compact unconditionally.
    pub fn compact(&self, messages: &[Message]) -> CompactionResult {
        let result = compact(
            messages,
            self.config.keep_recent_turn_pairs,
            self.summarizer.as_ref(),
        );
        if result.turn_pairs_removed > 0 {
            info!(
                before = messages.len(),
                after = result.messages.len(),
                turn_pairs_removed = result.turn_pairs_removed,
                "Compacted conversation"
            );
        }
        result
    }

    /// Compact if `input_tokens` is at or over the threshold.
    ///
    /// When the caller has no provider-reported count, pass
    /// [`estimate_messages_tokens`] of the conversation.
    pub fn maybe_compact(&self, messages: &[Message], input_tokens: usize) -> Option<CompactionResult> {
        if !self.should_compact(input_tokens) {
            return None;
        }
        let result = self.compact(messages);
        (result.turn_pairs_removed > 0).then_some(result)
    }
}
