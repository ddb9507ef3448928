//! Approval outcomes produced by policy evaluation.

use crate::work::{Tier, WorkSource};
use serde::{Deserialize, Serialize};

/// The three possible approval outcomes for a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    /// Run unattended
    AutoExecute,
    /// Ask a human before running
    Confirm,
    /// Hand off to a human; never run automatically
    Escalate,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoExecute => "auto-execute",
            Self::Confirm => "confirm",
            Self::Escalate => "escalate",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which policy rule produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionRule {
    ManualReview,
    SourceOverride,
    PriorityOverride,
    TierDefault,
    BudgetCap,
}

impl std::fmt::Display for DecisionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ManualReview => "manual-review",
            Self::SourceOverride => "source override",
            Self::PriorityOverride => "priority override",
            Self::TierDefault => "tier default",
            Self::BudgetCap => "budget",
        })
    }
}

/// Result of evaluating a work item against an approval policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalDecision {
    pub decision: Decision,
    pub tier: Tier,
    pub source: WorkSource,
    pub rule: DecisionRule,
    /// Human-readable justification; always names the rule that fired
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_wire_names() {
        assert_eq!(
            serde_json::to_string(&Decision::AutoExecute).unwrap(),
            "\"auto-execute\""
        );
        let parsed: Decision = serde_json::from_str("\"escalate\"").unwrap();
        assert_eq!(parsed, Decision::Escalate);
    }

    #[test]
    fn rule_display_matches_reason_vocabulary() {
        assert_eq!(DecisionRule::SourceOverride.to_string(), "source override");
        assert_eq!(DecisionRule::BudgetCap.to_string(), "budget");
    }
}
