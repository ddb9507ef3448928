//! Approval policy: decides whether a work item may run unattended.
//!
//! Evaluation is a pure function of the work item, the policy and an
//! optional cost estimate. Rules are tried in a fixed order and the first
//! one that applies wins:
//!
//! 1. `manual-review` workflow always escalates
//! 2. source override
//! 3. priority override
//! 4. tier default
//!
//! A budget guard then demotes an `auto-execute` result to `confirm` when the
//! estimate exceeds the auto-execute cap. The guard never promotes and never
//! touches `confirm` or `escalate`.

use nightshift_config::PolicyConfig;
use nightshift_core::approval::{ApprovalDecision, Decision, DecisionRule};
use nightshift_core::work::{DiscoveredWork, SuggestedWorkflow};
use std::collections::HashMap;
use tracing::debug;

/// Extra inputs to [`evaluate`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvaluationOptions {
    pub estimated_cost_usd: Option<f64>,
}

impl EvaluationOptions {
    pub fn with_cost(estimated_cost_usd: f64) -> Self {
        Self {
            estimated_cost_usd: Some(estimated_cost_usd),
        }
    }
}

/// Evaluate `work` against `policy`.
pub fn evaluate(
    work: &DiscoveredWork,
    policy: &PolicyConfig,
    options: EvaluationOptions,
) -> ApprovalDecision {
    let decide = |decision: Decision, rule: DecisionRule, reason: String| ApprovalDecision {
        decision,
        tier: work.tier,
        source: work.source,
        rule,
        reason,
    };

    if work.suggested_workflow == SuggestedWorkflow::ManualReview {
        return decide(
            Decision::Escalate,
            DecisionRule::ManualReview,
            "manual-review workflow is never auto-executed".into(),
        );
    }

    let resolved = if let Some(&decision) = policy.source_overrides.get(&work.source) {
        decide(
            decision,
            DecisionRule::SourceOverride,
            format!("source override for {}: {decision}", work.source),
        )
    } else if let Some(&decision) = policy.priority_overrides.get(&work.priority) {
        decide(
            decision,
            DecisionRule::PriorityOverride,
            format!("priority override for {}: {decision}", work.priority),
        )
    } else {
        let decision = policy.tier_defaults.get(work.tier);
        decide(
            decision,
            DecisionRule::TierDefault,
            format!("tier default for {}: {decision}", work.tier),
        )
    };

    if resolved.decision != Decision::AutoExecute {
        return resolved;
    }

    match (options.estimated_cost_usd, policy.max_auto_execute_budget_usd) {
        (Some(cost), Some(cap)) if cost > cap => {
            debug!(work_id = %work.id, cost, cap, "Budget guard demoted auto-execute");
            decide(
                Decision::Confirm,
                DecisionRule::BudgetCap,
                format!(
                    "budget: estimated ${cost:.2} exceeds auto-execute cap ${cap:.2} ({} would auto-execute)",
                    resolved.rule
                ),
            )
        }
        _ => resolved,
    }
}

/// A policy bundled with per-workflow cost estimates.
///
/// The worker evaluates items through this so that the estimate fed to the
/// budget guard comes from configuration rather than the caller.
#[derive(Debug, Clone, Default)]
pub struct ApprovalPolicy {
    config: PolicyConfig,
    cost_estimates: HashMap<SuggestedWorkflow, f64>,
}

impl ApprovalPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            config,
            cost_estimates: HashMap::new(),
        }
    }

    pub fn with_cost_estimates(mut self, estimates: HashMap<SuggestedWorkflow, f64>) -> Self {
        self.cost_estimates = estimates;
        self
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn estimated_cost(&self, workflow: SuggestedWorkflow) -> Option<f64> {
        self.cost_estimates.get(&workflow).copied()
    }

    /// Evaluate using the configured estimate for the item's workflow.
    pub fn evaluate(&self, work: &DiscoveredWork) -> ApprovalDecision {
        let options = EvaluationOptions {
            estimated_cost_usd: self.estimated_cost(work.suggested_workflow),
        };
        evaluate(work, &self.config, options)
    }
}

impl From<&PolicyConfig> for ApprovalPolicy {
    fn from(config: &PolicyConfig) -> Self {
        Self::new(config.clone())
    }
}
