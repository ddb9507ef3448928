//! Rough token counts for deciding when compaction is due.
//!
//! Four characters per token, rounded up. Characters, not bytes, so the
//! estimate uses the same unit as tool-output truncation. The executor
//! reports real usage when it has it; this estimate covers the turns where
//! it does not.

use nightshift_core::message::Message;

/// Framing cost of one message (role and delimiters).
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Text, tool inputs and tool results of one message, plus framing.
pub fn estimate_message_tokens(message: &Message) -> usize {
    MESSAGE_OVERHEAD_TOKENS + message.char_len().div_ceil(4)
}

pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}
