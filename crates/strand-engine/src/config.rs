//! Engine configuration

use std::time::Duration;

use strand_types::PricingTable;

/// Default interval between batched "state changed" notifications
pub const DEFAULT_NOTIFY_INTERVAL: Duration = Duration::from_millis(50);

/// Default maximum title length, in characters
pub const DEFAULT_MAX_TITLE_CHARS: usize = 60;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often streaming deltas may trigger a notification
    pub notify_interval: Duration,
    /// Whether to generate conversation titles from the first user input
    pub generate_titles: bool,
    /// Maximum title length, in characters
    pub max_title_chars: usize,
    /// Pricing used when a backend reports zero cost
    pub pricing: PricingTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            notify_interval: DEFAULT_NOTIFY_INTERVAL,
            generate_titles: true,
            max_title_chars: DEFAULT_MAX_TITLE_CHARS,
            pricing: PricingTable::builtin(),
        }
    }
}
