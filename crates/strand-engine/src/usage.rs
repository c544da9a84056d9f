//! Turn tracking and usage aggregation
//!
//! Keeps the session's cumulative usage, the per-model breakdown and the
//! context-window tracker. Only the main agent feeds the context tracker;
//! subagents run in their own windows.

use std::collections::HashMap;

use serde::Serialize;
use strand_types::{ModelUsageInfo, PricingTable, UsageInfo};

/// Snapshot of session-level accounting and state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionUsage {
    /// Cumulative usage of completed main-agent turns
    pub total: UsageInfo,
    /// Cumulative usage per model
    pub model_usage: HashMap<String, ModelUsageInfo>,
    /// Largest context window reported by any model
    pub context_window: Option<u64>,
    /// Last raw usage snapshot from the main agent
    pub context: Option<UsageInfo>,
    /// Output tokens produced since the current turn started, across all agents
    pub in_turn_output_tokens: u64,
    /// Completed main-agent turns
    pub turns: u32,
    pub is_working: bool,
    pub is_compacting: bool,
    pub model: Option<String>,
    pub permission_mode: Option<String>,
}

/// Cost of a turn. A reported cost wins; when the backend reports zero, each
/// model's own cost is used, or its pricing estimate when that is zero too.
pub fn turn_cost(
    cost_usd: f64,
    model_usage: &HashMap<String, ModelUsageInfo>,
    pricing: &PricingTable,
) -> f64 {
    if cost_usd > 0.0 || model_usage.is_empty() {
        return cost_usd;
    }
    model_usage
        .iter()
        .map(|(model, info)| {
            if info.usage.cost_usd > 0.0 {
                info.usage.cost_usd
            } else {
                pricing.estimate(model, &info.usage)
            }
        })
        .sum()
}

#[derive(Debug, Default)]
pub struct TurnTracker {
    session: SessionUsage,
    had_output: bool,
}

impl TurnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> &SessionUsage {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionUsage {
        &mut self.session
    }

    /// A main-agent turn began
    pub fn start_turn(&mut self) {
        self.session.is_working = true;
        self.session.in_turn_output_tokens = 0;
        self.had_output = false;
    }

    /// The main agent produced an entry this turn
    pub fn note_output(&mut self) {
        self.had_output = true;
    }

    pub fn had_output(&self) -> bool {
        self.had_output
    }

    /// Count one API round-trip. Returns `true` if the context tracker moved.
    pub fn record_step(&mut self, step: &UsageInfo, is_main: bool) -> bool {
        self.session.in_turn_output_tokens = self
            .session
            .in_turn_output_tokens
            .saturating_add(step.output_tokens);
        if is_main {
            self.session.context = Some(step.clone());
        }
        is_main
    }

    /// Fold a completed main-agent turn into the session totals. Returns the
    /// turn's effective cost. Per-model costs are only estimated when the turn
    /// itself reported none.
    pub fn complete_turn(
        &mut self,
        usage: &UsageInfo,
        model_usage: &HashMap<String, ModelUsageInfo>,
        cost_usd: f64,
        pricing: &PricingTable,
    ) -> f64 {
        let cost = turn_cost(cost_usd, model_usage, pricing);
        let estimated = cost_usd <= 0.0;

        let mut turn = if usage.is_empty() {
            model_usage.values().fold(UsageInfo::default(), |mut acc, m| {
                acc.accumulate(&m.usage);
                acc
            })
        } else {
            usage.clone()
        };
        turn.cost_usd = cost;
        self.session.total.accumulate(&turn);

        for (model, info) in model_usage {
            let mut info = info.clone();
            if estimated && info.usage.cost_usd <= 0.0 {
                info.usage.cost_usd = pricing.estimate(model, &info.usage);
            }
            self.session
                .model_usage
                .entry(model.clone())
                .or_default()
                .accumulate(&info);
        }
        self.session.context_window = self
            .session
            .model_usage
            .values()
            .filter_map(|m| m.context_window)
            .max()
            .or(self.session.context_window);

        self.session.turns = self.session.turns.saturating_add(1);
        self.session.is_working = false;
        self.session.in_turn_output_tokens = 0;
        self.had_output = false;
        cost
    }

    /// Abandon the turn in progress. Cumulative totals are kept.
    pub fn interrupt(&mut self) {
        self.session.is_working = false;
        self.session.is_compacting = false;
        self.session.in_turn_output_tokens = 0;
        self.had_output = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_usage(input: u64, output: u64, cost: f64) -> ModelUsageInfo {
        ModelUsageInfo {
            usage: UsageInfo {
                input_tokens: input,
                output_tokens: output,
                cost_usd: cost,
                ..Default::default()
            },
            context_window: Some(200_000),
        }
    }

    #[test]
    fn test_reported_cost_wins() {
        let mut models = HashMap::new();
        models.insert("claude-sonnet-4-5".to_string(), model_usage(1_000_000, 0, 0.0));
        assert_eq!(turn_cost(0.42, &models, &PricingTable::builtin()), 0.42);
    }

    #[test]
    fn test_cost_fallback_sums_estimates() {
        let mut models = HashMap::new();
        models.insert("claude-sonnet-4-5".to_string(), model_usage(1_000_000, 1_000_000, 0.0));
        models.insert("claude-haiku-4-5".to_string(), model_usage(1_000_000, 0, 0.0));
        let cost = turn_cost(0.0, &models, &PricingTable::builtin());
        assert!((cost - (3.0 + 15.0 + 1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_cost_fallback_prefers_model_cost() {
        let mut models = HashMap::new();
        models.insert("claude-sonnet-4-5".to_string(), model_usage(1_000_000, 0, 0.5));
        models.insert("mystery-model".to_string(), model_usage(1_000_000, 0, 0.0));
        let cost = turn_cost(0.0, &models, &PricingTable::builtin());
        assert!((cost - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_complete_turn_accumulates() {
        let mut tracker = TurnTracker::new();
        let pricing = PricingTable::builtin();
        let usage = UsageInfo {
            input_tokens: 10,
            output_tokens: 5,
            ..Default::default()
        };
        tracker.start_turn();
        tracker.complete_turn(&usage, &HashMap::new(), 0.01, &pricing);
        tracker.start_turn();
        tracker.complete_turn(&usage, &HashMap::new(), 0.02, &pricing);

        let session = tracker.session();
        assert_eq!(session.total.input_tokens, 20);
        assert_eq!(session.total.output_tokens, 10);
        assert!((session.total.cost_usd - 0.03).abs() < 1e-9);
        assert_eq!(session.turns, 2);
        assert!(!session.is_working);
    }

    #[test]
    fn test_complete_turn_derives_usage_from_models() {
        let mut tracker = TurnTracker::new();
        let mut models = HashMap::new();
        models.insert("claude-opus-4-1".to_string(), model_usage(100, 200, 0.0));
        tracker.complete_turn(&UsageInfo::default(), &models, 0.0, &PricingTable::builtin());

        let session = tracker.session();
        assert_eq!(session.total.input_tokens, 100);
        assert_eq!(session.total.output_tokens, 200);
        assert!(session.total.cost_usd > 0.0);
        assert_eq!(session.context_window, Some(200_000));
        assert!(session.model_usage["claude-opus-4-1"].usage.cost_usd > 0.0);
    }

    #[test]
    fn test_reported_cost_leaves_model_costs_alone() {
        let mut tracker = TurnTracker::new();
        let mut models = HashMap::new();
        models.insert("claude-sonnet-4-5".to_string(), model_usage(1_000_000, 0, 0.0));
        let pricing = PricingTable::builtin();
        let cost = tracker.complete_turn(&UsageInfo::default(), &models, 0.42, &pricing);

        let session = tracker.session();
        assert_eq!(cost, 0.42);
        assert_eq!(session.total.cost_usd, 0.42);
        assert_eq!(session.model_usage["claude-sonnet-4-5"].usage.cost_usd, 0.0);
    }

    #[test]
    fn test_counters_saturate() {
        let mut tracker = TurnTracker::new();
        let huge = UsageInfo {
            input_tokens: u64::MAX,
            output_tokens: u64::MAX,
            ..Default::default()
        };
        tracker.record_step(&huge, true);
        tracker.record_step(&huge, true);
        assert_eq!(tracker.session().in_turn_output_tokens, u64::MAX);

        let pricing = PricingTable::empty();
        tracker.complete_turn(&huge, &HashMap::new(), 0.0, &pricing);
        tracker.complete_turn(&huge, &HashMap::new(), 0.0, &pricing);
        assert_eq!(tracker.session().total.input_tokens, u64::MAX);
        assert_eq!(tracker.session().turns, 2);
    }

    #[test]
    fn test_subagent_steps_skip_context() {
        let mut tracker = TurnTracker::new();
        let step = UsageInfo {
            input_tokens: 900,
            output_tokens: 7,
            ..Default::default()
        };
        assert!(!tracker.record_step(&step, false));
        assert_eq!(tracker.session().context, None);
        assert_eq!(tracker.session().in_turn_output_tokens, 7);

        assert!(tracker.record_step(&step, true));
        assert_eq!(tracker.session().context, Some(step));
        assert_eq!(tracker.session().in_turn_output_tokens, 14);
    }

    #[test]
    fn test_start_turn_resets_output_flag() {
        let mut tracker = TurnTracker::new();
        tracker.note_output();
        tracker.record_step(
            &UsageInfo {
                output_tokens: 3,
                ..Default::default()
            },
            true,
        );
        tracker.start_turn();
        assert!(!tracker.had_output());
        assert_eq!(tracker.session().in_turn_output_tokens, 0);
        assert!(tracker.session().is_working);
    }

    #[test]
    fn test_interrupt_keeps_totals() {
        let mut tracker = TurnTracker::new();
        let usage = UsageInfo {
            input_tokens: 4,
            ..Default::default()
        };
        tracker.complete_turn(&usage, &HashMap::new(), 0.0, &PricingTable::empty());
        tracker.start_turn();
        tracker.session_mut().is_compacting = true;
        tracker.interrupt();

        let session = tracker.session();
        assert_eq!(session.total.input_tokens, 4);
        assert!(!session.is_working);
        assert!(!session.is_compacting);
    }
}
