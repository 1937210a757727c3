//! Per-model pricing for LLM providers.
//!
//! Prices are USD per 1K tokens. Overrides from `agentflow.toml` are
//! consulted first, then the built-in table. Models in neither are free:
//! an unpriced call records its tokens with zero cost.

use agentflow_core::workflow::cost::round_cost;
use agentflow_types::config::ModelPricing;

/// Built-in prices: `(model, input per 1K, output per 1K)`.
const DEFAULT_PRICES: &[(&str, f64, f64)] = &[
    // OpenAI
    ("gpt-4o", 0.0025, 0.010),
    ("gpt-4o-mini", 0.000150, 0.000600),
    // Anthropic
    ("claude-sonnet-4-5-20250929", 0.003, 0.015),
    ("claude-haiku-4-5-20251001", 0.0008, 0.004),
    // Google
    ("gemini-2.0-flash", 0.0001, 0.0004),
];

/// Price lookup shared by all providers of one router.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    overrides: Vec<ModelPricing>,
}

impl PriceTable {
    pub fn new(overrides: Vec<ModelPricing>) -> Self {
        Self { overrides }
    }

    /// `(input, output)` price per 1K tokens, if the model is priced.
    pub fn price_for(&self, model: &str) -> Option<(f64, f64)> {
        if let Some(p) = self.overrides.iter().find(|p| p.model == model) {
            return Some((p.input_per_1k, p.output_per_1k));
        }
        DEFAULT_PRICES
            .iter()
            .find(|(name, _, _)| *name == model)
            .map(|(_, input, output)| (*input, *output))
    }

    /// Cost of one call in USD, rounded to 8 decimal places.
    pub fn calculate_cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        let Some((input_price, output_price)) = self.price_for(model) else {
            tracing::debug!(model, "no price for model, recording zero cost");
            return 0.0;
        };
        let input = f64::from(input_tokens) / 1000.0 * input_price;
        let output = f64::from(output_tokens) / 1000.0 * output_price;
        round_cost(input + output)
    }
}
