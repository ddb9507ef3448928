//! Stall detection over an agent's recent tool calls.
//!
//! The detector is fed one batch of [`ToolCallRecord`]s per agent turn and
//! checks three patterns, first match wins:
//!
//! | Pattern | Triggers when |
//! |---------|---------------|
//! | Repetition | the last `repetition_threshold` calls are identical |
//! | Oscillation | the last `oscillation_window_size` calls alternate A-B-A-B over exactly two distinct calls |
//! | Idle | `idle_turn_threshold` turns have passed without file activity |
//!
//! Calls are compared by `(tool_name, input_hash)`, where the hash is taken
//! over a key-sorted rendering of the input so property order never matters.

use nightshift_config::StallConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Hash a tool input independently of object key order.
pub fn hash_input(input: &serde_json::Value) -> String {
    let mut canonical = String::new();
    write_canonical(input, &mut canonical);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// One tool invocation as seen by the detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub input_hash: String,
    /// Whether the call wrote or edited a file
    pub had_file_activity: bool,
}

impl ToolCallRecord {
    pub fn new(tool_name: impl Into<String>, input: &serde_json::Value, had_file_activity: bool) -> Self {
        Self {
            tool_name: tool_name.into(),
            input_hash: hash_input(input),
            had_file_activity,
        }
    }

    fn same_call(&self, other: &Self) -> bool {
        self.tool_name == other.tool_name && self.input_hash == other.input_hash
    }

    fn label(&self) -> String {
        let short = self.input_hash.get(..8).unwrap_or(&self.input_hash);
        format!("{}#{short}", self.tool_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StallKind {
    Repetition,
    Oscillation,
    Idle,
}

impl std::fmt::Display for StallKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Repetition => "repetition",
            Self::Oscillation => "oscillation",
            Self::Idle => "idle",
        })
    }
}

/// A detected stall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StallEvent {
    #[serde(rename = "type")]
    pub kind: StallKind,
    pub description: String,
    pub evidence: Vec<String>,
}

/// Rolling-window stall detector.
///
/// Once a pattern is reported, the evidence behind it is consumed: the call
/// history is cleared after a repetition or oscillation, and the idle counter
/// is reset after an idle report. The same stall is therefore reported once
/// per occurrence rather than on every following turn.
#[derive(Debug)]
pub struct StallDetector {
    config: StallConfig,
    history: VecDeque<ToolCallRecord>,
    idle_turns: usize,
    turns: usize,
}

impl StallDetector {
    pub fn new(config: StallConfig) -> Self {
        Self {
            config,
            history: VecDeque::new(),
            idle_turns: 0,
            turns: 0,
        }
    }

    /// Turns observed since creation.
    pub fn turns(&self) -> usize {
        self.turns
    }

    /// Consecutive turns without file activity.
    pub fn idle_turns(&self) -> usize {
        self.idle_turns
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.idle_turns = 0;
    }

    /// Record the tool calls of one agent turn and check for a stall.
    pub fn record_turn(&mut self, calls: &[ToolCallRecord]) -> Option<StallEvent> {
        self.turns += 1;

        if calls.iter().any(|c| c.had_file_activity) {
            self.idle_turns = 0;
        } else {
            self.idle_turns += 1;
        }

        let cap = self.config.history_size.max(1);
        for call in calls {
            if self.history.len() == cap {
                self.history.pop_front();
            }
            self.history.push_back(call.clone());
        }

        let event = self
            .detect_repetition()
            .or_else(|| self.detect_oscillation())
            .or_else(|| self.detect_idle())?;

        match event.kind {
            StallKind::Repetition | StallKind::Oscillation => self.history.clear(),
            StallKind::Idle => self.idle_turns = 0,
        }

        warn!(kind = %event.kind, turn = self.turns, "{}", event.description);
        Some(event)
    }

    fn detect_repetition(&self) -> Option<StallEvent> {
        let n = self.config.repetition_threshold;
        if n == 0 || self.history.len() < n {
            return None;
        }

        let recent: Vec<&ToolCallRecord> = self.history.iter().rev().take(n).collect();
        let first = recent[0];
        if !recent.iter().all(|c| c.same_call(first)) {
            return None;
        }

        Some(StallEvent {
            kind: StallKind::Repetition,
            description: format!(
                "{} called {n} times in a row with identical input",
                first.tool_name
            ),
            evidence: recent.iter().rev().map(|c| c.label()).collect(),
        })
    }

    fn detect_oscillation(&self) -> Option<StallEvent> {
        let n = self.config.oscillation_window_size;
        if n < 2 || self.history.len() < n {
            return None;
        }

        let window: Vec<&ToolCallRecord> = self.history.iter().skip(self.history.len() - n).collect();
        let (a, b) = (window[0], window[1]);
        if a.same_call(b) {
            return None;
        }

        let alternates = window
            .iter()
            .enumerate()
            .all(|(i, c)| c.same_call(if i % 2 == 0 { a } else { b }));
        if !alternates {
            return None;
        }

        Some(StallEvent {
            kind: StallKind::Oscillation,
            description: format!(
                "alternating between {} and {} for {n} calls",
                a.tool_name, b.tool_name
            ),
            evidence: window.iter().map(|c| c.label()).collect(),
        })
    }

    fn detect_idle(&self) -> Option<StallEvent> {
        let threshold = self.config.idle_turn_threshold;
        if threshold == 0 || self.idle_turns < threshold {
            return None;
        }

        debug!(idle_turns = self.idle_turns, "Idle threshold reached");
        Some(StallEvent {
            kind: StallKind::Idle,
            description: format!("{} turns without any file changes", self.idle_turns),
            evidence: self.history.iter().rev().take(5).rev().map(|c| c.label()).collect(),
        })
    }
}

/// An intervention message to inject into the agent conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Intervention {
    pub kind: StallKind,
    pub message: String,
    /// How many interventions have been issued, this one included
    pub count: usize,
}

/// Counts interventions and decides when to stop nudging.
#[derive(Debug, Clone)]
pub struct InterventionTracker {
    max_interventions: usize,
    count: usize,
}

impl InterventionTracker {
    pub fn new(max_interventions: usize) -> Self {
        Self {
            max_interventions,
            count: 0,
        }
    }

    pub fn from_config(config: &StallConfig) -> Self {
        Self::new(config.max_interventions)
    }

    /// Build the intervention for `event` and count it.
    pub fn intervene(&mut self, event: &StallEvent) -> Intervention {
        self.count += 1;
        let message = match event.kind {
            StallKind::Repetition => format!(
                "You appear to be stuck: {}. Repeating the same call will not change the result. \
                 Re-read the last output and try a different approach.",
                event.description
            ),
            StallKind::Oscillation => format!(
                "You are going back and forth ({}). Stop and decide on one direction, \
                 then make a concrete change.",
                event.description
            ),
            StallKind::Idle => format!(
                "No files have changed recently ({}). Either start editing, or explain \
                 what is blocking progress.",
                event.description
            ),
        };
        debug!(kind = %event.kind, count = self.count, "Issuing stall intervention");
        Intervention {
            kind: event.kind,
            message,
            count: self.count,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// True once the intervention budget is spent.
    pub fn should_hard_stop(&self) -> bool {
        self.count >= self.max_interventions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detector() -> StallDetector {
        StallDetector::new(StallConfig::default())
    }

    fn bash(cmd: &str) -> ToolCallRecord {
        ToolCallRecord::new("Bash", &json!({ "command": cmd }), false)
    }

    fn write(path: &str) -> ToolCallRecord {
        ToolCallRecord::new("Write", &json!({ "file_path": path }), true)
    }

    #[test]
    fn hash_ignores_key_order() {
        let a = json!({"path": "src/a.rs", "opts": {"x": 1, "y": [1, 2]}});
        let b = json!({"opts": {"y": [1, 2], "x": 1}, "path": "src/a.rs"});
        assert_eq!(hash_input(&a), hash_input(&b));
        assert_ne!(hash_input(&a), hash_input(&json!({"path": "src/b.rs"})));
        assert_eq!(hash_input(&a).len(), 64);
    }

    #[test]
    fn hash_distinguishes_array_order() {
        assert_ne!(hash_input(&json!([1, 2])), hash_input(&json!([2, 1])));
    }

    #[test]
    fn repetition_fires_at_threshold_not_before() {
        let mut d = detector();
        assert!(d.record_turn(&[bash("npm test")]).is_none());
        assert!(d.record_turn(&[bash("npm test")]).is_none());

        let event = d.record_turn(&[bash("npm test")]).unwrap();
        assert_eq!(event.kind, StallKind::Repetition);
        assert_eq!(event.evidence.len(), 3);
        assert!(event.description.contains("Bash"));
    }

    #[test]
    fn repetition_within_a_single_turn() {
        let mut d = detector();
        let event = d
            .record_turn(&[bash("ls"), bash("ls"), bash("ls")])
            .unwrap();
        assert_eq!(event.kind, StallKind::Repetition);
    }

    #[test]
    fn different_inputs_do_not_repeat() {
        let mut d = detector();
        d.record_turn(&[bash("npm test")]);
        d.record_turn(&[bash("npm test")]);
        assert!(d.record_turn(&[bash("npm run lint")]).is_none());
    }

    #[test]
    fn repetition_is_reported_once_per_occurrence() {
        let mut d = detector();
        d.record_turn(&[bash("x"), bash("x")]);
        assert!(d.record_turn(&[bash("x")]).is_some());
        assert!(d.record_turn(&[bash("x")]).is_none());
    }

    #[test]
    fn oscillation_fires_on_full_window() {
        let mut d = detector();
        let a = bash("cat a.txt");
        let b = bash("cat b.txt");
        for _ in 0..2 {
            assert!(d.record_turn(&[a.clone()]).is_none());
            assert!(d.record_turn(&[b.clone()]).is_none());
        }
        assert!(d.record_turn(&[a.clone()]).is_none());

        let event = d.record_turn(&[b.clone()]).unwrap();
        assert_eq!(event.kind, StallKind::Oscillation);
        assert_eq!(event.evidence.len(), 6);
    }

    #[test]
    fn oscillation_needs_exactly_two_distinct_calls() {
        let mut d = detector();
        let calls = [bash("a"), bash("b"), bash("c"), bash("a"), bash("b"), bash("c")];
        for call in calls {
            assert!(d.record_turn(&[call]).is_none());
        }
    }

    #[test]
    fn repetition_wins_over_idle() {
        let config = StallConfig {
            idle_turn_threshold: 3,
            ..StallConfig::default()
        };
        let mut d = StallDetector::new(config);
        d.record_turn(&[bash("x")]);
        d.record_turn(&[bash("x")]);
        let event = d.record_turn(&[bash("x")]).unwrap();
        assert_eq!(event.kind, StallKind::Repetition);
    }

    #[test]
    fn idle_fires_on_tenth_idle_turn() {
        let mut d = detector();
        assert!(d.record_turn(&[write("src/a.rs")]).is_none());
        for i in 1..10 {
            assert!(d.record_turn(&[bash(&format!("cmd {i}"))]).is_none(), "turn {i}");
        }
        let event = d.record_turn(&[bash("cmd 10")]).unwrap();
        assert_eq!(event.kind, StallKind::Idle);
        assert!(event.description.contains("10 turns"));
    }

    #[test]
    fn file_activity_resets_idle_counter() {
        let mut d = detector();
        for i in 0..9 {
            assert!(d.record_turn(&[bash(&format!("cmd {i}"))]).is_none());
        }
        assert_eq!(d.idle_turns(), 9);
        assert!(d.record_turn(&[bash("ls"), write("src/b.rs")]).is_none());
        assert_eq!(d.idle_turns(), 0);
        for i in 0..9 {
            assert!(d.record_turn(&[bash(&format!("again {i}"))]).is_none());
        }
        assert_eq!(d.record_turn(&[]).unwrap().kind, StallKind::Idle);
    }

    #[test]
    fn interventions_escalate_to_hard_stop() {
        let mut tracker = InterventionTracker::new(3);
        let event = StallEvent {
            kind: StallKind::Idle,
            description: "10 turns without any file changes".into(),
            evidence: vec![],
        };

        let first = tracker.intervene(&event);
        assert_eq!(first.count, 1);
        assert!(!tracker.should_hard_stop());
        tracker.intervene(&event);
        assert!(!tracker.should_hard_stop());
        tracker.intervene(&event);
        assert!(tracker.should_hard_stop());
    }

    #[test]
    fn intervention_wording_differs_per_kind() {
        let mut tracker = InterventionTracker::new(10);
        let make = |kind| StallEvent {
            kind,
            description: "d".into(),
            evidence: vec![],
        };
        let rep = tracker.intervene(&make(StallKind::Repetition)).message;
        let osc = tracker.intervene(&make(StallKind::Oscillation)).message;
        let idle = tracker.intervene(&make(StallKind::Idle)).message;
        assert_ne!(rep, osc);
        assert_ne!(osc, idle);
        assert_ne!(rep, idle);
    }

    #[test]
    fn stall_event_serializes_type_field() {
        let event = StallEvent {
            kind: StallKind::Oscillation,
            description: "d".into(),
            evidence: vec!["Bash#12345678".into()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "oscillation");
    }
}
