//! Per-run token and cost accounting.
//!
//! A `CostTracker` is owned by exactly one run and is append-only: records
//! are never removed and totals are never reset mid-run.

use agentflow_types::execution::{CostRecord, CostSummary, ModelCost};

/// Totals are rounded to this many decimal places after every addition.
pub const COST_PRECISION: i32 = 8;

/// Round a USD amount to [`COST_PRECISION`] decimal places.
pub fn round_cost(value: f64) -> f64 {
    let factor = 10f64.powi(COST_PRECISION);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, Default)]
pub struct CostTracker {
    records: Vec<CostRecord>,
    total_tokens: u64,
    total_cost: f64,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a tracker by replaying previously captured records.
    pub fn from_records(records: impl IntoIterator<Item = CostRecord>) -> Self {
        let mut tracker = Self::new();
        for record in records {
            tracker.add_step(record.model, record.tokens, record.cost);
        }
        tracker
    }

    pub fn add_step(&mut self, model: impl Into<String>, tokens: u64, cost: f64) {
        self.records.push(CostRecord {
            model: model.into(),
            tokens,
            cost,
        });
        self.total_tokens += tokens;
        self.total_cost = round_cost(self.total_cost + cost);
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    pub fn records(&self) -> &[CostRecord] {
        &self.records
    }

    /// Group records by model.
    pub fn summary(&self) -> CostSummary {
        let mut summary = CostSummary {
            total_tokens: self.total_tokens,
            total_cost: self.total_cost,
            step_count: self.records.len() as u32,
            ..Default::default()
        };

        for record in &self.records {
            let entry = summary
                .by_model
                .entry(record.model.clone())
                .or_insert_with(ModelCost::default);
            entry.tokens += record.tokens;
            entry.cost = round_cost(entry.cost + record.cost);
            entry.steps += 1;
        }

        summary
    }
}
