//! Token usage and cost accounting

use serde::{Deserialize, Serialize};

/// Token usage and cost for a turn, an API round-trip, or a whole session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageInfo {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
    /// Cost in US dollars
    pub cost_usd: f64,
}

impl UsageInfo {
    /// Input plus output tokens (cache traffic is not counted)
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    /// Whether every counter is zero
    pub fn is_empty(&self) -> bool {
        self.input_tokens == 0
            && self.output_tokens == 0
            && self.cache_read_tokens == 0
            && self.cache_creation_tokens == 0
            && self.cost_usd == 0.0
    }

    /// Add another usage record into this one. Token counters saturate.
    pub fn accumulate(&mut self, other: &UsageInfo) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(other.cache_read_tokens);
        self.cache_creation_tokens = self
            .cache_creation_tokens
            .saturating_add(other.cache_creation_tokens);
        self.cost_usd += other.cost_usd;
    }
}

/// Usage attributed to one named model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelUsageInfo {
    #[serde(flatten)]
    pub usage: UsageInfo,
    /// Context window size of the model, when the backend reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
}

impl ModelUsageInfo {
    /// Merge another report for the same model
    pub fn accumulate(&mut self, other: &ModelUsageInfo) {
        self.usage.accumulate(&other.usage);
        if other.context_window.is_some() {
            self.context_window = other.context_window;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_tokens_excludes_cache() {
        let usage = UsageInfo {
            input_tokens: 100,
            output_tokens: 50,
            cache_read_tokens: 1000,
            cache_creation_tokens: 200,
            cost_usd: 0.0,
        };
        assert_eq!(usage.total_tokens(), 150);
    }

    #[test]
    fn test_default_is_empty() {
        assert!(UsageInfo::default().is_empty());
        let usage = UsageInfo {
            output_tokens: 1,
            ..Default::default()
        };
        assert!(!usage.is_empty());
    }

    #[test]
    fn test_accumulate() {
        let mut total = UsageInfo::default();
        total.accumulate(&UsageInfo {
            input_tokens: 10,
            output_tokens: 5,
            cache_read_tokens: 3,
            cache_creation_tokens: 2,
            cost_usd: 0.5,
        });
        total.accumulate(&UsageInfo {
            input_tokens: 1,
            output_tokens: 1,
            cache_read_tokens: 1,
            cache_creation_tokens: 1,
            cost_usd: 0.25,
        });
        assert_eq!(total.input_tokens, 11);
        assert_eq!(total.output_tokens, 6);
        assert_eq!(total.cache_read_tokens, 4);
        assert_eq!(total.cache_creation_tokens, 3);
        assert!((total.cost_usd - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_accumulate_saturates() {
        let huge = UsageInfo {
            input_tokens: u64::MAX,
            output_tokens: u64::MAX,
            ..Default::default()
        };
        let mut total = huge.clone();
        total.accumulate(&huge);
        assert_eq!(total.input_tokens, u64::MAX);
        assert_eq!(total.output_tokens, u64::MAX);
        assert_eq!(total.total_tokens(), u64::MAX);
    }

    #[test]
    fn test_missing_fields_default_to_zero() {
        let usage: UsageInfo = serde_json::from_str(r#"{"output_tokens": 7}"#).unwrap();
        assert_eq!(usage.output_tokens, 7);
        assert_eq!(usage.input_tokens, 0);
        assert_eq!(usage.cost_usd, 0.0);
    }

    #[test]
    fn test_model_usage_flattened() {
        let json = r#"{"input_tokens": 4, "output_tokens": 2, "context_window": 200000}"#;
        let model: ModelUsageInfo = serde_json::from_str(json).unwrap();
        assert_eq!(model.usage.input_tokens, 4);
        assert_eq!(model.context_window, Some(200000));
    }

    #[test]
    fn test_model_usage_accumulate_keeps_window() {
        let mut a = ModelUsageInfo {
            usage: UsageInfo {
                output_tokens: 1,
                ..Default::default()
            },
            context_window: Some(200_000),
        };
        a.accumulate(&ModelUsageInfo {
            usage: UsageInfo {
                output_tokens: 2,
                ..Default::default()
            },
            context_window: None,
        });
        assert_eq!(a.usage.output_tokens, 3);
        assert_eq!(a.context_window, Some(200_000));
    }
}
