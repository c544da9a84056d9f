//! Static per-model pricing used to estimate cost when a backend reports none.

use serde::{Deserialize, Serialize};

use crate::usage::UsageInfo;

/// Price per million tokens, in US dollars
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
}

impl ModelPricing {
    pub const fn new(input: f64, output: f64, cache_read: f64, cache_write: f64) -> Self {
        Self {
            input,
            output,
            cache_read,
            cache_write,
        }
    }

    /// Estimate the dollar cost of a usage record at these prices
    pub fn estimate(&self, usage: &UsageInfo) -> f64 {
        let input = (usage.input_tokens as f64 / 1_000_000.0) * self.input;
        let output = (usage.output_tokens as f64 / 1_000_000.0) * self.output;
        let cache_read = (usage.cache_read_tokens as f64 / 1_000_000.0) * self.cache_read;
        let cache_write = (usage.cache_creation_tokens as f64 / 1_000_000.0) * self.cache_write;
        input + output + cache_read + cache_write
    }
}

/// Built-in rows, keyed by model-name prefix.
const BUILTIN_PRICING: &[(&str, ModelPricing)] = &[
    ("claude-opus-4-5", ModelPricing::new(5.0, 25.0, 0.5, 6.25)),
    ("claude-opus-4", ModelPricing::new(15.0, 75.0, 1.5, 18.75)),
    ("claude-sonnet-4", ModelPricing::new(3.0, 15.0, 0.3, 3.75)),
    ("claude-3-7-sonnet", ModelPricing::new(3.0, 15.0, 0.3, 3.75)),
    ("claude-3-5-sonnet", ModelPricing::new(3.0, 15.0, 0.3, 3.75)),
    ("claude-haiku-4-5", ModelPricing::new(1.0, 5.0, 0.1, 1.25)),
    ("claude-3-5-haiku", ModelPricing::new(0.8, 4.0, 0.08, 1.0)),
    ("claude-3-haiku", ModelPricing::new(0.25, 1.25, 0.03, 0.3)),
    ("gpt-5", ModelPricing::new(1.25, 10.0, 0.125, 0.0)),
    ("gpt-4.1", ModelPricing::new(2.0, 8.0, 0.5, 0.0)),
    ("gemini-2.5-pro", ModelPricing::new(1.25, 10.0, 0.31, 0.0)),
    ("gemini-2.5-flash", ModelPricing::new(0.3, 2.5, 0.075, 0.0)),
];

/// Prefix-matched pricing lookup table
#[derive(Debug, Clone, PartialEq)]
pub struct PricingTable {
    rows: Vec<(String, ModelPricing)>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PricingTable {
    /// The built-in table
    pub fn builtin() -> Self {
        Self {
            rows: BUILTIN_PRICING
                .iter()
                .map(|(prefix, pricing)| (prefix.to_string(), *pricing))
                .collect(),
        }
    }

    /// An empty table (every model prices at zero)
    pub fn empty() -> Self {
        Self { rows: Vec::new() }
    }

    /// Add or replace the row for a prefix
    pub fn set(&mut self, prefix: impl Into<String>, pricing: ModelPricing) {
        let prefix = prefix.into();
        match self.rows.iter_mut().find(|(p, _)| *p == prefix) {
            Some(row) => row.1 = pricing,
            None => self.rows.push((prefix, pricing)),
        }
    }

    /// Find pricing for a model name. The longest matching prefix wins.
    pub fn lookup(&self, model: &str) -> Option<&ModelPricing> {
        let name = model.rsplit('/').next().unwrap_or(model).to_lowercase();
        self.rows
            .iter()
            .filter(|(prefix, _)| name.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, pricing)| pricing)
    }

    /// Estimate cost for one model's usage; unknown models cost nothing.
    pub fn estimate(&self, model: &str, usage: &UsageInfo) -> f64 {
        match self.lookup(model) {
            Some(pricing) => pricing.estimate(usage),
            None => {
                tracing::debug!("No pricing for model '{}', estimating zero cost", model);
                0.0
            }
        }
    }
}
