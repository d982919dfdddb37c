//! Built-in pricing table for common LLM models.
//!
//! Prices are in USD per 1 million tokens. Each model has an input and
//! output price. Custom pricing can be supplied via config; unknown models
//! cost 0.0 so a missing table entry never blocks a run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1M input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD.
    pub output_per_m: f64,
}

impl ModelPricing {
    /// Create a new pricing entry.
    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    /// Compute cost for the given token counts.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_per_m + output_tokens as f64 * self.output_per_m)
            / 1_000_000.0
    }
}

/// Pricing table with built-in defaults and custom overrides.
pub struct PricingTable {
    prices: HashMap<String, ModelPricing>,
}

impl PricingTable {
    /// Create a pricing table with built-in model prices.
    pub fn with_defaults() -> Self {
        let mut prices = HashMap::new();

        // ── OpenAI ─────────────────────────────────────────────────
        prices.insert("gpt-4o".into(), ModelPricing::new(2.5, 10.0));
        prices.insert("gpt-4o-mini".into(), ModelPricing::new(0.15, 0.6));
        prices.insert("gpt-4-turbo".into(), ModelPricing::new(10.0, 30.0));
        prices.insert("o1".into(), ModelPricing::new(15.0, 60.0));
        prices.insert("o1-mini".into(), ModelPricing::new(3.0, 12.0));
        prices.insert("o3-mini".into(), ModelPricing::new(1.1, 4.4));

        // ── Anthropic ──────────────────────────────────────────────
        prices.insert("claude-sonnet-4".into(), ModelPricing::new(3.0, 15.0));
        prices.insert("claude-opus-4".into(), ModelPricing::new(15.0, 75.0));
        prices.insert("claude-3.5-sonnet".into(), ModelPricing::new(3.0, 15.0));
        prices.insert("claude-3.5-haiku".into(), ModelPricing::new(0.8, 4.0));

        // ── DeepSeek ───────────────────────────────────────────────
        prices.insert("deepseek-v3".into(), ModelPricing::new(0.27, 1.1));
        prices.insert("deepseek-r1".into(), ModelPricing::new(0.55, 2.19));

        Self { prices }
    }

    /// Create an empty pricing table.
    pub fn empty() -> Self {
        Self {
            prices: HashMap::new(),
        }
    }

    /// Add or update pricing for a model.
    pub fn set(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.prices.insert(model.into(), pricing);
    }

    /// Look up pricing for a model. Returns None if not found.
    pub fn get(&self, model: &str) -> Option<&ModelPricing> {
        self.prices.get(model)
    }

    /// Compute cost for a model call, returning 0.0 if the model is not in
    /// the table.
    ///
    /// Matching: exact match first; then the bare name with any provider
    /// prefix stripped (`openai/gpt-4o` → `gpt-4o`); then the longest table
    /// key that is a prefix of the bare name, since backends often report a
    /// dated variant (`gpt-4o-mini-2024-07-18` matches `gpt-4o-mini`).
    pub fn compute_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        if let Some(p) = self.prices.get(model) {
            return p.cost(input_tokens, output_tokens);
        }

        let bare = model.rsplit('/').next().unwrap_or(model).to_lowercase();
        if let Some(p) = self.prices.get(bare.as_str()) {
            return p.cost(input_tokens, output_tokens);
        }

        let mut best: Option<(&String, &ModelPricing)> = None;
        for (key, pricing) in &self.prices {
            if bare.starts_with(&key.to_lowercase())
                && best.is_none_or(|(k, _)| key.len() > k.len())
            {
                best = Some((key, pricing));
            }
        }

        best.map(|(_, p)| p.cost(input_tokens, output_tokens))
            .unwrap_or(0.0)
    }

    /// Number of models in the pricing table.
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}
