//! Per-call token and cost accounting for the extraction agent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;

/// Token usage for one call or one whole extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl TokenUsage {
    #[must_use]
    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output, total: input + output }
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.input += other.input;
        self.output += other.output;
        self.total += other.total;
    }
}

/// One recorded model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEntry {
    /// What the call was for, e.g. `extract` or `extract_chunk`.
    pub call_type: String,
    pub metadata: Value,
    pub model: String,
    pub tokens: TokenUsage,
    pub cost: f64,
}

/// Running ledger with an optional hard spend limit. The limit is checked
/// *before* dispatching a call using a projected cost; crossing it raises
/// `COST_LIMIT_EXCEEDED` without making the call.
#[derive(Debug, Default)]
pub struct CostLedger {
    entries: Vec<CostEntry>,
    limit: Option<f64>,
}

impl CostLedger {
    #[must_use]
    pub fn new(limit: Option<f64>) -> Self {
        Self { entries: Vec::new(), limit }
    }

    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.entries.iter().map(|e| e.cost).sum()
    }

    #[must_use]
    pub fn total_tokens(&self) -> TokenUsage {
        let mut usage = TokenUsage::default();
        for entry in &self.entries {
            usage.add(entry.tokens);
        }
        usage
    }

    #[must_use]
    pub fn entries(&self) -> &[CostEntry] {
        &self.entries
    }

    /// Fail if spending `projected` more would cross the limit.
    pub fn check_budget(&self, projected: f64) -> Result<(), LlmError> {
        if let Some(limit) = self.limit {
            let spent = self.total_cost();
            if spent + projected > limit {
                return Err(LlmError::CostLimitExceeded { spent, projected, limit });
            }
        }
        Ok(())
    }

    pub fn record(&mut self, entry: CostEntry) {
        self.entries.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(cost: f64, input: u64, output: u64) -> CostEntry {
        CostEntry {
            call_type: "extract".into(),
            metadata: json!({}),
            model: "test-model".into(),
            tokens: TokenUsage::new(input, output),
            cost,
        }
    }

    #[test]
    fn totals_accumulate() {
        let mut ledger = CostLedger::new(None);
        ledger.record(entry(0.01, 100, 20));
        ledger.record(entry(0.02, 200, 30));
        assert!((ledger.total_cost() - 0.03).abs() < 1e-9);
        let usage = ledger.total_tokens();
        assert_eq!(usage.input, 300);
        assert_eq!(usage.output, 50);
        assert_eq!(usage.total, 350);
    }

    #[test]
    fn budget_check_fires_before_overspend() {
        let mut ledger = CostLedger::new(Some(0.05));
        ledger.record(entry(0.04, 10, 10));
        assert!(ledger.check_budget(0.005).is_ok());
        let err = ledger.check_budget(0.02).unwrap_err();
        assert!(matches!(err, LlmError::CostLimitExceeded { .. }));
    }

    #[test]
    fn no_limit_never_fires() {
        let ledger = CostLedger::new(None);
        assert!(ledger.check_budget(f64::MAX / 4.0).is_ok());
    }
}
