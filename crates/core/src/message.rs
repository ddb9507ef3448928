//! Conversation message types used inside a single workflow execution.
//!
//! An agent conversation alternates between an assistant message (text and
//! tool calls) and a user message (tool results, or the original prompt).
//! The first user message is the task prompt; each following
//! assistant/user pair is one turn.

use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One block of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },

    /// A tool invocation requested by the assistant
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// The output of a tool invocation
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Create a plain-text user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Create a plain-text assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Create a message from explicit blocks.
    pub fn with_blocks(role: Role, content: Vec<ContentBlock>) -> Self {
        Self { role, content }
    }

    /// Concatenated text blocks, newline separated.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tool calls in this message as `(name, input)` pairs.
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.content.iter().filter_map(|b| match b {
            ContentBlock::ToolUse { name, input, .. } => Some((name.as_str(), input)),
            _ => None,
        })
    }

    /// Tool result contents in this message.
    pub fn tool_results(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(|b| match b {
            ContentBlock::ToolResult { content, .. } => Some(content.as_str()),
            _ => None,
        })
    }

    /// Total characters across all blocks (tool inputs counted as JSON).
    pub fn char_len(&self) -> usize {
        self.content
            .iter()
            .map(|b| match b {
                ContentBlock::Text { text } => text.chars().count(),
                ContentBlock::ToolUse { name, input, .. } => {
                    name.chars().count() + input.to_string().chars().count()
                }
                ContentBlock::ToolResult { content, .. } => content.chars().count(),
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_joins_text_blocks_only() {
        let msg = Message::with_blocks(
            Role::Assistant,
            vec![
                ContentBlock::Text { text: "first".into() },
                ContentBlock::ToolUse {
                    id: "t1".into(),
                    name: "Read".into(),
                    input: serde_json::json!({"file_path": "a.rs"}),
                },
                ContentBlock::Text { text: "second".into() },
            ],
        );
        assert_eq!(msg.text(), "first\nsecond");
        let uses: Vec<_> = msg.tool_uses().collect();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].0, "Read");
    }

    #[test]
    fn char_len_counts_characters() {
        let msg = Message::with_blocks(
            Role::User,
            vec![
                ContentBlock::Text { text: "héllo".into() },
                ContentBlock::ToolResult {
                    tool_use_id: "t1".into(),
                    content: "日本".into(),
                    is_error: false,
                },
            ],
        );
        assert_eq!(msg.char_len(), 7);
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::with_blocks(
            Role::User,
            vec![ContentBlock::ToolResult {
                tool_use_id: "t1".into(),
                content: "ok".into(),
                is_error: false,
            }],
        );
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("tool_result"));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
