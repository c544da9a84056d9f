//! Configuration file support

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use strand_engine::EngineConfig;
use strand_types::{ModelPricing, PricingTable};

/// Configuration for strand
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log filter used when neither `--verbose` nor `RUST_LOG` is given
    pub log_level: Option<String>,
    /// Engine tuning
    pub engine: EngineSettings,
    /// Pricing overrides keyed by model-name prefix, USD per million tokens
    pub pricing: BTreeMap<String, ModelPricing>,
}

/// The `[engine]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub notify_interval_ms: Option<u64>,
    pub generate_titles: Option<bool>,
    pub max_title_chars: Option<usize>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("strand")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("STRAND_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        // Logging is not set up yet, so problems go straight to stderr
        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to a file
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let defaults = EngineConfig::default();
        let config = Config {
            log_level: Some("warn".to_string()),
            engine: EngineSettings {
                notify_interval_ms: Some(defaults.notify_interval.as_millis() as u64),
                generate_titles: Some(defaults.generate_titles),
                max_title_chars: Some(defaults.max_title_chars),
            },
            pricing: BTreeMap::new(),
        };

        config.save_to(&path)?;
        Ok(path)
    }

    /// Tracing filter directive
    pub fn log_filter(&self, verbose: bool) -> String {
        if verbose {
            return "strand=debug".to_string();
        }
        self.log_level.clone().unwrap_or_else(|| "warn".to_string())
    }

    /// Build the engine configuration, layering file settings over defaults
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        if let Some(ms) = self.engine.notify_interval_ms {
            config.notify_interval = Duration::from_millis(ms);
        }
        if let Some(generate) = self.engine.generate_titles {
            config.generate_titles = generate;
        }
        if let Some(max) = self.engine.max_title_chars {
            config.max_title_chars = max;
        }

        let mut pricing = PricingTable::builtin();
        for (prefix, row) in &self.pricing {
            pricing.set(prefix.to_lowercase(), *row);
        }
        config.pricing = pricing;
        config
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# strand configuration file
# Place at ~/.config/strand/config.toml (Linux), ~/Library/Application Support/strand/config.toml (Mac)
# or %APPDATA%\strand\config.toml (Windows). STRAND_CONFIG_PATH overrides the location.

# Log filter when --verbose and RUST_LOG are not given (error, warn, info, debug, trace)
log_level = "warn"

[engine]
# Minimum time between "state changed" notifications while streaming
notify_interval_ms = 50

# Title conversations from the first line of the first user input
generate_titles = true
max_title_chars = 60

# Pricing overrides, USD per million tokens, used when a backend reports zero cost.
# The longest matching model-name prefix wins.
# [pricing."claude-sonnet-4"]
# input = 3.0
# output = 15.0
# cache_read = 0.3
# cache_write = 3.75
"#
}
