//! Conversation compaction.
//!
//! A conversation is `[initial prompt, (assistant, user)*]`. Compaction keeps
//! the initial prompt and the most recent `keep_recent_turn_pairs` pairs,
//! summarizes everything between them, and folds the summary into the initial
//! message.

use nightshift_core::message::{ContentBlock, Message, Role};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Turns a run of evicted messages into summary text.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, evicted: &[Message]) -> String;
}

/// Output of a compaction pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionResult {
    pub messages: Vec<Message>,
    pub turn_pairs_removed: usize,
    /// Empty when nothing was compacted
    pub summary: String,
}

/// Summary built from tool calls and results, without a model.
#[derive(Debug, Clone, Default)]
pub struct HeuristicSummarizer;

/// Input keys that name the target of a tool call, most specific first.
const TARGET_KEYS: &[&str] = &["file_path", "path", "command", "pattern", "query", "url"];
const PATH_KEYS: &[&str] = &["file_path", "path"];
const MAX_TARGET_CHARS: usize = 80;

fn test_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(\d+\s+(passed|passing|failed|failing)\b|test result:|^tests?:\s+\d+|\bFAIL\b|\bPASS\b)",
        )
        .unwrap_or_else(|e| panic!("invalid test line pattern: {e}"))
    })
}

fn tool_target(input: &serde_json::Value) -> Option<String> {
    TARGET_KEYS.iter().find_map(|key| {
        input.get(*key).and_then(|v| v.as_str()).map(|s| {
            let single_line = s.lines().next().unwrap_or_default();
            if single_line.chars().count() > MAX_TARGET_CHARS {
                let cut: String = single_line.chars().take(MAX_TARGET_CHARS).collect();
                format!("{cut}…")
            } else {
                single_line.to_string()
            }
        })
    })
}

impl Summarizer for HeuristicSummarizer {
    fn summarize(&self, evicted: &[Message]) -> String {
        let mut turn_lines = Vec::new();
        let mut files = BTreeSet::new();
        let mut last_test_line: Option<String> = None;

        let mut turn = 0;
        for message in evicted {
            match message.role {
                Role::Assistant => {
                    turn += 1;
                    let calls: Vec<String> = message
                        .tool_uses()
                        .map(|(name, input)| {
                            for key in PATH_KEYS {
                                if let Some(p) = input.get(*key).and_then(|v| v.as_str()) {
                                    files.insert(p.to_string());
                                }
                            }
                            match tool_target(input) {
                                Some(target) => format!("{name}({target})"),
                                None => name.to_string(),
                            }
                        })
                        .collect();
                    if calls.is_empty() {
                        turn_lines.push(format!("- Turn {turn}: (no tool calls)"));
                    } else {
                        turn_lines.push(format!("- Turn {turn}: {}", calls.join(", ")));
                    }
                }
                Role::User => {
                    let bodies = message
                        .tool_results()
                        .map(str::to_string)
                        .chain(std::iter::once(message.text()));
                    for body in bodies {
                        for line in body.lines() {
                            if test_line_regex().is_match(line) {
                                last_test_line = Some(line.trim().to_string());
                            }
                        }
                    }
                }
            }
        }

        let mut out = format!("Summary of {turn} earlier turn(s):\n");
        out.push_str(&turn_lines.join("\n"));
        if !files.is_empty() {
            out.push_str("\nFiles touched: ");
            out.push_str(&files.into_iter().collect::<Vec<_>>().join(", "));
        }
        if let Some(line) = last_test_line {
            out.push_str("\nLast test result: ");
            out.push_str(&line);
        }
        out
    }
}

/// Compact `messages`, keeping the first message and the last
/// `keep_recent_turn_pairs` pairs.
///
/// The protected tail always starts at an assistant message so a tool call is
/// never separated from its result. When there is nothing between the
/// initial message and the tail, the input is returned as-is.
pub fn compact(
    messages: &[Message],
    keep_recent_turn_pairs: usize,
    summarizer: &dyn Summarizer,
) -> CompactionResult {
    let unchanged = || CompactionResult {
        messages: messages.to_vec(),
        turn_pairs_removed: 0,
        summary: String::new(),
    };

    let protected = keep_recent_turn_pairs.saturating_mul(2);
    if messages.len() <= 1 + protected {
        return unchanged();
    }

    let mut tail_start = messages.len() - protected;
    while tail_start > 1 && messages[tail_start].role != Role::Assistant {
        tail_start -= 1;
    }
    if tail_start <= 1 {
        return unchanged();
    }

    let evicted = &messages[1..tail_start];
    let summary = summarizer.summarize(evicted);
    let turn_pairs_removed = evicted.len().div_ceil(2);

    let mut initial = messages[0].clone();
    initial.content.push(ContentBlock::Text {
        text: format!("[Earlier context compacted]\n{summary}"),
    });

    let mut compacted = Vec::with_capacity(1 + messages.len() - tail_start);
    compacted.push(initial);
    compacted.extend_from_slice(&messages[tail_start..]);

    CompactionResult {
        messages: compacted,
        turn_pairs_removed,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_turn(i: usize, tool: &str, input: serde_json::Value, result: &str) -> [Message; 2] {
        [
            Message::with_blocks(
                Role::Assistant,
                vec![ContentBlock::ToolUse {
                    id: format!("t{i}"),
                    name: tool.into(),
                    input,
                }],
            ),
            Message::with_blocks(
                Role::User,
                vec![ContentBlock::ToolResult {
                    tool_use_id: format!("t{i}"),
                    content: result.into(),
                    is_error: false,
                }],
            ),
        ]
    }

    fn conversation(pairs: usize) -> Vec<Message> {
        let mut messages = vec![Message::user("Fix the failing login test")];
        for i in 0..pairs {
            messages.extend(tool_turn(
                i,
                "Read",
                json!({ "file_path": format!("src/file{i}.js") }),
                "contents",
            ));
        }
        messages
    }

    #[test]
    fn compaction_keeps_initial_and_recent_pairs() {
        let messages = conversation(6);
        let result = compact(&messages, 4, &HeuristicSummarizer);

        assert_eq!(result.turn_pairs_removed, 2);
        assert_eq!(result.messages.len(), 1 + 8);
        assert_eq!(result.messages[1], messages[5]);
        assert_eq!(result.messages.last(), messages.last());

        let initial = result.messages[0].text();
        assert!(initial.starts_with("Fix the failing login test"));
        assert!(initial.contains("src/file0.js"));
        assert!(initial.contains("src/file1.js"));
        assert!(!result.summary.contains("src/file2.js"));
    }

    #[test]
    fn compaction_is_noop_without_evictable_messages() {
        let messages = conversation(4);
        let result = compact(&messages, 4, &HeuristicSummarizer);
        assert_eq!(result.messages, messages);
        assert_eq!(result.turn_pairs_removed, 0);
        assert!(result.summary.is_empty());

        let short = vec![Message::user("hi")];
        assert_eq!(compact(&short, 1, &HeuristicSummarizer).messages, short);
    }

    #[test]
    fn tail_never_starts_with_a_tool_result() {
        // initial + 5 pairs + a dangling assistant message
        let mut messages = conversation(5);
        messages.push(Message::assistant("thinking"));
        let result = compact(&messages, 2, &HeuristicSummarizer);

        assert_eq!(result.messages[1].role, Role::Assistant);
        assert_eq!(result.messages.last(), messages.last());
    }

    #[test]
    fn summary_records_last_test_line() {
        let mut messages = vec![Message::user("task")];
        messages.extend(tool_turn(0, "Bash", json!({"command": "npm test"}), "Tests: 3 failed, 10 total"));
        messages.extend(tool_turn(1, "Edit", json!({"file_path": "src/auth.js"}), "ok"));
        messages.extend(tool_turn(2, "Bash", json!({"command": "npm test"}), "setup\n13 passed\ndone"));
        messages.extend(tool_turn(3, "Read", json!({"file_path": "README.md"}), "readme"));

        let result = compact(&messages, 1, &HeuristicSummarizer);
        assert_eq!(result.turn_pairs_removed, 3);
        assert!(result.summary.contains("Bash(npm test)"));
        assert!(result.summary.contains("Files touched: src/auth.js"));
        assert!(result.summary.contains("Last test result: 13 passed"));
    }

    struct FixedSummarizer;

    impl Summarizer for FixedSummarizer {
        fn summarize(&self, evicted: &[Message]) -> String {
            format!("{} messages elided", evicted.len())
        }
    }

    #[test]
    fn summarizer_is_pluggable() {
        let result = compact(&conversation(3), 1, &FixedSummarizer);
        assert_eq!(result.summary, "4 messages elided");
        assert!(result.messages[0].text().contains("4 messages elided"));
    }
}
