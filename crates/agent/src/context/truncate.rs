//! Per-tool output truncation.
//!
//! Tool results are cut down before they re-enter the conversation. Each
//! family of tool gets a strategy suited to where the useful part of its
//! output usually sits:
//!
//! | Family | Strategy | Unit |
//! |--------|----------|------|
//! | Shell | head + tail lines (errors up top, summary at the bottom) | lines |
//! | FileRead | head + tail characters | characters |
//! | Search | head characters, cut at a line boundary (earliest matches) | characters |
//! | Listing | first N entries | entries |
//! | Generic | head characters | characters |
//!
//! Whatever is cut is replaced by a marker of the form
//! `[... N <unit> omitted ...]`, which [`parse_omitted_marker`] can read back.

use nightshift_config::TruncationConfig;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Tool families with distinct truncation strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolFamily {
    Shell,
    FileRead,
    Search,
    Listing,
    Generic,
}

impl ToolFamily {
    /// Classify a tool by name.
    pub fn from_tool_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "bash" | "shell" | "exec" | "run_command" | "terminal" => Self::Shell,
            "read" | "read_file" | "file_read" | "view" | "cat" => Self::FileRead,
            "grep" | "search" | "rg" | "search_files" | "web_search" => Self::Search,
            "glob" | "ls" | "list" | "list_dir" | "list_files" | "find" => Self::Listing,
            _ => Self::Generic,
        }
    }
}

/// Outcome of truncating one tool output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TruncationResult {
    pub content: String,
    pub was_truncated: bool,
    /// Size of the input in the family's unit
    pub original_len: usize,
    /// How many units were cut
    pub omitted: usize,
}

impl TruncationResult {
    fn unchanged(content: &str, original_len: usize) -> Self {
        Self {
            content: content.to_string(),
            was_truncated: false,
            original_len,
            omitted: 0,
        }
    }
}

fn marker(omitted: usize, unit: &str) -> String {
    format!("[... {omitted} {unit} omitted ...]")
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[\.\.\. (\d+) (lines|characters|entries) omitted \.\.\.\]")
            .unwrap_or_else(|e| panic!("invalid omission marker pattern: {e}"))
    })
}

/// Read the first omission marker in `text` as `(count, unit)`.
pub fn parse_omitted_marker(text: &str) -> Option<(usize, String)> {
    let caps = marker_regex().captures(text)?;
    let count = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str().to_string();
    Some((count, unit))
}

/// Byte offset of the `n`th char, or the end of the string.
fn char_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

/// Truncate `output` with the strategy for `family`.
pub fn truncate(family: ToolFamily, output: &str, limits: &TruncationConfig) -> TruncationResult {
    match family {
        ToolFamily::Shell => head_tail_lines(output, limits.shell_head_lines, limits.shell_tail_lines),
        ToolFamily::FileRead => head_tail_chars(output, limits.file_max_chars),
        ToolFamily::Search => head_chars(output, limits.search_max_chars, true),
        ToolFamily::Listing => head_entries(output, limits.listing_max_entries),
        ToolFamily::Generic => head_chars(output, limits.generic_max_chars, false),
    }
}

fn head_tail_lines(output: &str, head: usize, tail: usize) -> TruncationResult {
    let lines: Vec<&str> = output.lines().collect();
    let total = lines.len();
    if total <= head + tail {
        return TruncationResult::unchanged(output, total);
    }

    let omitted = total - head - tail;
    let mut content = lines[..head].join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    content.push_str(&marker(omitted, "lines"));
    if tail > 0 {
        content.push('\n');
        content.push_str(&lines[total - tail..].join("\n"));
    }

    TruncationResult {
        content,
        was_truncated: true,
        original_len: total,
        omitted,
    }
}

fn head_tail_chars(output: &str, max: usize) -> TruncationResult {
    let total = output.chars().count();
    if total <= max {
        return TruncationResult::unchanged(output, total);
    }

    let head = max / 2;
    let tail = max - head;
    let omitted = total - max;
    let head_end = char_offset(output, head);
    let tail_start = char_offset(output, total - tail);

    TruncationResult {
        content: format!(
            "{}\n{}\n{}",
            &output[..head_end],
            marker(omitted, "characters"),
            &output[tail_start..]
        ),
        was_truncated: true,
        original_len: total,
        omitted,
    }
}

fn head_chars(output: &str, max: usize, line_boundary: bool) -> TruncationResult {
    let total = output.chars().count();
    if total <= max {
        return TruncationResult::unchanged(output, total);
    }

    let mut end = char_offset(output, max);
    if line_boundary {
        if let Some(nl) = output[..end].rfind('\n') {
            end = nl;
        }
    }
    let kept = output[..end].chars().count();
    let omitted = total - kept;

    TruncationResult {
        content: format!("{}\n{}", &output[..end], marker(omitted, "characters")),
        was_truncated: true,
        original_len: total,
        omitted,
    }
}

fn head_entries(output: &str, max: usize) -> TruncationResult {
    let entries: Vec<&str> = output.lines().filter(|l| !l.trim().is_empty()).collect();
    let total = entries.len();
    if total <= max {
        return TruncationResult::unchanged(output, total);
    }

    let omitted = total - max;
    let mut content = entries[..max].join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    content.push_str(&marker(omitted, "entries"));

    TruncationResult {
        content,
        was_truncated: true,
        original_len: total,
        omitted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> TruncationConfig {
        TruncationConfig {
            shell_head_lines: 2,
            shell_tail_lines: 2,
            file_max_chars: 10,
            search_max_chars: 12,
            listing_max_entries: 3,
            generic_max_chars: 5,
        }
    }

    #[test]
    fn classifies_tool_names() {
        assert_eq!(ToolFamily::from_tool_name("Bash"), ToolFamily::Shell);
        assert_eq!(ToolFamily::from_tool_name("Read"), ToolFamily::FileRead);
        assert_eq!(ToolFamily::from_tool_name("Grep"), ToolFamily::Search);
        assert_eq!(ToolFamily::from_tool_name("Glob"), ToolFamily::Listing);
        assert_eq!(ToolFamily::from_tool_name("WebFetch"), ToolFamily::Generic);
    }

    #[test]
    fn short_output_is_unchanged() {
        let result = truncate(ToolFamily::Shell, "one\ntwo", &limits());
        assert!(!result.was_truncated);
        assert_eq!(result.content, "one\ntwo");
        assert_eq!(result.omitted, 0);
        assert!(parse_omitted_marker(&result.content).is_none());
    }

    #[test]
    fn shell_keeps_head_and_tail_lines() {
        let output = (1..=10).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let result = truncate(ToolFamily::Shell, &output, &limits());

        assert!(result.was_truncated);
        assert_eq!(result.original_len, 10);
        assert_eq!(result.omitted, 6);
        assert!(result.content.starts_with("line 1\nline 2\n"));
        assert!(result.content.ends_with("line 9\nline 10"));
        assert_eq!(parse_omitted_marker(&result.content), Some((6, "lines".into())));
    }

    #[test]
    fn file_read_keeps_head_and_tail_chars() {
        let result = truncate(ToolFamily::FileRead, "abcdefghijklmnopqrst", &limits());
        assert!(result.was_truncated);
        assert!(result.content.starts_with("abcde\n"));
        assert!(result.content.ends_with("\npqrst"));
        assert_eq!(parse_omitted_marker(&result.content), Some((10, "characters".into())));
    }

    #[test]
    fn file_read_respects_char_boundaries() {
        let text = "é".repeat(30);
        let result = truncate(ToolFamily::FileRead, &text, &limits());
        assert!(result.was_truncated);
        assert_eq!(result.omitted, 20);
    }

    #[test]
    fn search_keeps_earliest_whole_lines() {
        let result = truncate(ToolFamily::Search, "a.rs:1\nb.rs:2\nc.rs:3\n", &limits());
        assert!(result.was_truncated);
        assert!(result.content.starts_with("a.rs:1\n"));
        assert!(!result.content.contains("c.rs"));
        let (omitted, unit) = parse_omitted_marker(&result.content).unwrap();
        assert_eq!(unit, "characters");
        assert_eq!(omitted, 21 - 6);
    }

    #[test]
    fn listing_caps_entry_count() {
        let result = truncate(ToolFamily::Listing, "a\nb\n\nc\nd\ne\n", &limits());
        assert!(result.was_truncated);
        assert_eq!(result.original_len, 5);
        assert_eq!(result.content, "a\nb\nc\n[... 2 entries omitted ...]");
    }

    #[test]
    fn generic_is_plain_char_cap() {
        let result = truncate(ToolFamily::Generic, "0123456789", &limits());
        assert_eq!(result.content, "01234\n[... 5 characters omitted ...]");
    }
}
