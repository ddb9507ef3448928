//! In-memory spend tracking for one worker process.

use serde::{Deserialize, Serialize};

/// Snapshot written into the status file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetStatus {
    pub spent_usd: f64,
    pub max_usd: f64,
    pub exhausted: bool,
}

#[derive(Debug, Clone)]
pub struct BudgetTracker {
    max_usd: f64,
    spent_usd: f64,
}

impl BudgetTracker {
    pub fn new(max_usd: f64) -> Self {
        Self {
            max_usd,
            spent_usd: 0.0,
        }
    }

    /// Add spend, whatever the outcome of the work that incurred it.
    /// Negative costs are ignored.
    pub fn record(&mut self, cost_usd: f64) {
        if cost_usd > 0.0 {
            self.spent_usd += cost_usd;
        }
    }

    pub fn spent(&self) -> f64 {
        self.spent_usd
    }

    pub fn remaining(&self) -> f64 {
        (self.max_usd - self.spent_usd).max(0.0)
    }

    /// Spend has met or passed the limit.
    pub fn is_exhausted(&self) -> bool {
        self.spent_usd >= self.max_usd
    }

    pub fn status(&self) -> BudgetStatus {
        BudgetStatus {
            spent_usd: self.spent_usd,
            max_usd: self.max_usd,
            exhausted: self.is_exhausted(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_at_or_over_limit() {
        let mut budget = BudgetTracker::new(1.0);
        budget.record(0.6);
        assert!(!budget.is_exhausted());
        assert!((budget.remaining() - 0.4).abs() < 1e-9);

        budget.record(0.6);
        assert!(budget.is_exhausted());
        assert_eq!(budget.remaining(), 0.0);
        assert!(budget.status().exhausted);
    }

    #[test]
    fn zero_budget_is_exhausted_immediately() {
        assert!(BudgetTracker::new(0.0).is_exhausted());
    }

    #[test]
    fn negative_cost_ignored() {
        let mut budget = BudgetTracker::new(1.0);
        budget.record(-5.0);
        assert_eq!(budget.spent(), 0.0);
    }
}
