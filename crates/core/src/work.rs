//! Work item domain types.
//!
//! A [`DiscoveredWork`] is a candidate task surfaced by a work source. It is
//! ranked by priority, then automation tier, then discovery time, and moves
//! through a small status machine as the worker processes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a work item was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkSource {
    /// A validation or lint scan reported a failure
    ValidationFailure,
    /// A runtime debugger / error tracker raised an alert
    DebuggerAlert,
    /// A human asked for it explicitly
    UserRequest,
    /// A test suite run failed
    TestFailure,
    /// A dependency audit flagged an outdated or vulnerable package
    DependencyAlert,
}

impl WorkSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationFailure => "validation-failure",
            Self::DebuggerAlert => "debugger-alert",
            Self::UserRequest => "user-request",
            Self::TestFailure => "test-failure",
            Self::DependencyAlert => "dependency-alert",
        }
    }
}

impl std::fmt::Display for WorkSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency of a work item.
///
/// Variants are declared from most to least urgent, so the derived `Ord`
/// sorts critical items first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Automation tier, 1 (most trusted to run unattended) through 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Tier(u8);

impl Tier {
    pub const ONE: Tier = Tier(1);
    pub const TWO: Tier = Tier(2);
    pub const THREE: Tier = Tier(3);
    pub const FOUR: Tier = Tier(4);

    /// Build a tier, rejecting values outside 1..=4.
    pub fn new(value: u8) -> Option<Self> {
        (1..=4).contains(&value).then_some(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Tier::new(value).ok_or_else(|| format!("tier must be between 1 and 4, got {value}"))
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> Self {
        tier.0
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tier {}", self.0)
    }
}

/// The kind of workflow a source suggests for the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuggestedWorkflow {
    BugFix,
    Refactor,
    NewFeature,
    Investigation,
    /// Never auto-executed, regardless of tier
    ManualReview,
}

impl SuggestedWorkflow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BugFix => "bug-fix",
            Self::Refactor => "refactor",
            Self::NewFeature => "new-feature",
            Self::Investigation => "investigation",
            Self::ManualReview => "manual-review",
        }
    }
}

impl std::fmt::Display for SuggestedWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing status of a work item.
///
/// Allowed transitions: `pending -> in-progress -> {completed | failed}` and
/// `pending -> escalated`. Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Escalated,
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Escalated => "escalated",
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    /// Staying in the same state is always allowed.
    pub fn can_transition_to(&self, next: WorkStatus) -> bool {
        use WorkStatus::*;
        *self == next
            || matches!(
                (self, next),
                (Pending, InProgress)
                    | (Pending, Escalated)
                    | (InProgress, Completed)
                    | (InProgress, Failed)
            )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Escalated)
    }
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredWork {
    /// Unique within a queue
    pub id: String,

    pub discovered_at: DateTime<Utc>,

    pub source: WorkSource,

    pub priority: Priority,

    pub tier: Tier,

    pub suggested_workflow: SuggestedWorkflow,

    /// One-line summary
    pub summary: String,

    /// Full description handed to the executor
    pub description: String,

    pub status: WorkStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,

    /// Resolution text, failure reason, or escalation reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

impl DiscoveredWork {
    /// Create a new pending work item with a generated id.
    pub fn new(
        source: WorkSource,
        priority: Priority,
        tier: Tier,
        suggested_workflow: SuggestedWorkflow,
        summary: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("work-{}", Uuid::new_v4()),
            discovered_at: Utc::now(),
            source,
            priority,
            tier,
            suggested_workflow,
            summary: summary.into(),
            description: description.into(),
            status: WorkStatus::Pending,
            started_at: None,
            completed_at: None,
            assigned_to: None,
            resolution: None,
        }
    }

    /// Replace the generated id with a caller-supplied one.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Override the discovery timestamp.
    pub fn with_discovered_at(mut self, at: DateTime<Utc>) -> Self {
        self.discovered_at = at;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == WorkStatus::Pending
    }
}

/// What the injected executor reports after running a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub success: bool,

    #[serde(default)]
    pub cost_usd: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowResult {
    pub fn succeeded(cost_usd: f64, resolution: impl Into<String>) -> Self {
        Self {
            success: true,
            cost_usd,
            resolution: Some(resolution.into()),
            error: None,
        }
    }

    pub fn failed(cost_usd: f64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            cost_usd,
            resolution: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_most_urgent_first() {
        let mut priorities = vec![Priority::Low, Priority::Critical, Priority::Medium, Priority::High];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![Priority::Critical, Priority::High, Priority::Medium, Priority::Low]
        );
    }

    #[test]
    fn tier_rejects_out_of_range() {
        assert!(Tier::new(0).is_none());
        assert!(Tier::new(5).is_none());
        assert_eq!(Tier::new(3), Some(Tier::THREE));
        assert!(serde_json::from_str::<Tier>("7").is_err());
        assert_eq!(serde_json::from_str::<Tier>("2").unwrap(), Tier::TWO);
    }

    #[test]
    fn status_transitions_follow_lifecycle() {
        use WorkStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(Pending.can_transition_to(Escalated));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(InProgress));
        assert!(!Escalated.can_transition_to(InProgress));
    }

    #[test]
    fn work_serializes_with_wire_names() {
        let work = DiscoveredWork::new(
            WorkSource::ValidationFailure,
            Priority::High,
            Tier::TWO,
            SuggestedWorkflow::BugFix,
            "Fix lint",
            "Lint failed in src/index.js",
        )
        .with_id("w-1");

        let json = serde_json::to_value(&work).unwrap();
        assert_eq!(json["id"], "w-1");
        assert_eq!(json["source"], "validation-failure");
        assert_eq!(json["suggestedWorkflow"], "bug-fix");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["tier"], 2);
        assert!(json["discoveredAt"].as_str().unwrap().contains('T'));
        assert!(json.get("startedAt").is_none());
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = DiscoveredWork::new(
            WorkSource::UserRequest,
            Priority::Low,
            Tier::ONE,
            SuggestedWorkflow::Refactor,
            "a",
            "a",
        );
        let b = DiscoveredWork::new(
            WorkSource::UserRequest,
            Priority::Low,
            Tier::ONE,
            SuggestedWorkflow::Refactor,
            "b",
            "b",
        );
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("work-"));
    }
}
