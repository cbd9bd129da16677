// =============================================================================
// Engine Configuration — JSON file, environment overlay, validation
// =============================================================================
//
// Load order:
//   1. `EngineConfig::load(path)` (every field has a serde default, so a
//      partial or empty file is fine; a missing file falls back to defaults)
//   2. `apply_env()` overlays RISK_PROFILE, CUSTOM_STOP_LOSS,
//      CUSTOM_POSITION_SIZE, CUSTOM_TAKE_PROFIT (percent), LLM_API_KEY,
//      LLM_MODEL, LLM_BASE_URL and SENTINEL_ASSETS
//   3. `validate()` builds the immutable RiskProfile and checks every
//      section; any violation is a fatal ConfigError before the first cycle.
//
// Saving uses an atomic tmp + rename.
// =============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::regime::RegimeThresholds;
use crate::remote::RetryPolicy;
use crate::risk::{RiskOverrides, RiskProfile};
use crate::signals::WeightTable;
use crate::types::RiskLevel;

// =============================================================================
// Default-value helpers
// =============================================================================

fn default_assets() -> Vec<String> {
    vec!["BTC".to_string(), "ETH".to_string(), "SOL".to_string()]
}

fn default_cycle_interval_secs() -> u64 {
    3_600
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_max_bars() -> usize {
    500
}

fn default_starting_value() -> f64 {
    10_000.0
}

fn default_journal_capacity() -> usize {
    crate::journal::DEFAULT_CAPACITY
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_max_concurrent() -> usize {
    4
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskSection {
    #[serde(default)]
    pub level: RiskLevel,
    #[serde(default)]
    pub overrides: RiskOverrides,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Never written back to disk.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Global cap on in-flight remote calls.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl RemoteConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
        }
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_assets")]
    pub assets: Vec<String>,
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,
    /// Directory holding `<ASSET>.json` bar files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_max_bars")]
    pub max_bars: usize,
    /// Starting value of the paper portfolio.
    #[serde(default = "default_starting_value")]
    pub starting_value: f64,
    #[serde(default = "default_journal_capacity")]
    pub journal_capacity: usize,
    /// Correlation of each asset with the existing book, in [-1, 1].
    #[serde(default)]
    pub correlations: BTreeMap<String, f64>,
    #[serde(default)]
    pub risk: RiskSection,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub regime: RegimeThresholds,
    #[serde(default)]
    pub weights: WeightTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            assets: default_assets(),
            cycle_interval_secs: default_cycle_interval_secs(),
            data_dir: default_data_dir(),
            max_bars: default_max_bars(),
            starting_value: default_starting_value(),
            journal_capacity: default_journal_capacity(),
            correlations: BTreeMap::new(),
            risk: RiskSection::default(),
            remote: RemoteConfig::default(),
            regime: RegimeThresholds::default(),
            weights: WeightTable::default(),
        }
    }
}

/// Parse a percent string ("5" or "5%") into a fraction.
fn parse_percent(var: &str, raw: &str) -> Result<f64, ConfigError> {
    raw.trim()
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .map(|p| p / 100.0)
        .map_err(|_| ConfigError::Invalid(format!("{var} = '{raw}' is not a number")))
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            assets = ?config.assets,
            risk_level = %config.risk.level,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration with an atomic write (tmp, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self).context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable lookup.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(level) = var("RISK_PROFILE") {
            self.risk.level = level.parse::<RiskLevel>().map_err(ConfigError::Invalid)?;
        }
        if let Some(raw) = var("CUSTOM_STOP_LOSS") {
            self.risk.overrides.stop_loss = Some(parse_percent("CUSTOM_STOP_LOSS", &raw)?);
        }
        if let Some(raw) = var("CUSTOM_POSITION_SIZE") {
            self.risk.overrides.position_size = Some(parse_percent("CUSTOM_POSITION_SIZE", &raw)?);
        }
        if let Some(raw) = var("CUSTOM_TAKE_PROFIT") {
            self.risk.overrides.take_profit = Some(parse_percent("CUSTOM_TAKE_PROFIT", &raw)?);
        }
        if let Some(key) = var("LLM_API_KEY") {
            self.remote.api_key = Some(key.trim().to_string());
            self.remote.enabled = true;
        }
        if let Some(model) = var("LLM_MODEL") {
            self.remote.model = model.trim().to_string();
        }
        if let Some(url) = var("LLM_BASE_URL") {
            self.remote.base_url = url.trim().to_string();
            self.remote.enabled = true;
        }
        if let Some(assets) = var("SENTINEL_ASSETS") {
            self.assets = assets
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        Ok(())
    }

    /// Check every section and resolve the immutable risk profile.
    pub fn validate(&self) -> Result<RiskProfile, ConfigError> {
        if self.assets.is_empty() {
            return Err(ConfigError::Invalid("no assets configured".to_string()));
        }
        if self.cycle_interval_secs == 0 {
            return Err(ConfigError::Invalid("cycle_interval_secs must be positive".to_string()));
        }
        if self.max_bars == 0 {
            return Err(ConfigError::Invalid("max_bars must be positive".to_string()));
        }
        if !(self.starting_value.is_finite() && self.starting_value > 0.0) {
            return Err(ConfigError::Invalid("starting_value must be positive".to_string()));
        }
        if let Some((asset, c)) = self.correlations.iter().find(|(_, c)| !(-1.0..=1.0).contains(*c)) {
            return Err(ConfigError::Invalid(format!(
                "correlation for {asset} = {c} is outside [-1, 1]"
            )));
        }
        if self.remote.enabled {
            if self.remote.base_url.trim().is_empty() {
                return Err(ConfigError::Invalid("remote.base_url is empty".to_string()));
            }
            if self.remote.timeout_secs == 0 || self.remote.max_concurrent == 0 {
                return Err(ConfigError::Invalid(
                    "remote.timeout_secs and remote.max_concurrent must be positive".to_string(),
                ));
            }
        }
        self.regime.validate().map_err(ConfigError::Invalid)?;
        self.weights.validate()?;

        RiskProfile::for_level(self.risk.level).with_overrides(&self.risk.overrides)
    }
}
