// =============================================================================
// Risk Profiles — immutable per-cycle risk parameters
// =============================================================================
//
//   parameter            low          medium       high
//   max position size    2 %          4 %          6 %
//   aggregate exposure   10 %         15 %         20 %
//   base stop-loss       4 %          7 %          10 %
//   stop-loss bounds     3 - 5 %      6 - 8 %      9 - 12 %
//   Kelly fraction       0.10         0.15         0.18
//   Kelly blend          0.30         0.50         0.60
//   signal threshold     0.25         0.20         0.15
//   reward : risk        1.5          2.0          2.5
//   trailing stop        -            -            +3 % activation, 6 % trail
//   daily loss limit     2 %          5 %          10 %
//   loss streak          3            5            7
//   trades per day       10           25           50
//   min remote conf.     0.70         0.50         0.30
//   volatility class     low          <= medium    any
//
// User overrides replace individual parameters and are bounds-checked once,
// at configuration load; an out-of-range override is a fatal ConfigError.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::info;

use super::breaker::BreakerLimits;
use crate::error::ConfigError;
use crate::types::RiskLevel;

const BOUND_EPSILON: f64 = 1e-12;

/// Trailing-stop parameters (fractions of price).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingConfig {
    /// Unrealized gain at which the trail arms.
    pub activation_gain: f64,
    /// Distance of the trail below (long) / above (short) the best price.
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub level: RiskLevel,
    /// Per-trade ceiling, fraction of portfolio value.
    pub max_position_size: f64,
    /// Ceiling on total open exposure, fraction of portfolio value.
    pub max_aggregate_risk: f64,
    pub base_stop_loss: f64,
    pub min_stop_loss: f64,
    pub max_stop_loss_bound: f64,
    pub kelly_fraction: f64,
    /// Weight of the Kelly term in the final size blend.
    pub kelly_blend: f64,
    pub signal_threshold: f64,
    /// Take-profit as a multiple of the stop distance.
    pub reward_ratio: f64,
    /// Fixed take-profit overriding `reward_ratio` when set.
    pub fixed_take_profit: Option<f64>,
    pub trailing: Option<TrailingConfig>,
    /// Payoff assumptions used until enough realized outcomes exist.
    pub assumed_avg_win: f64,
    pub assumed_avg_loss: f64,
    /// Permitted assets; empty means unrestricted.
    pub universe: Vec<String>,
    /// Bars older than this make every indicator stale.
    pub max_data_age_secs: i64,
    pub breakers: BreakerLimits,
    /// Reject assets whose volatility class exceeds `level`.
    pub volatility_screen: bool,
}

/// Optional per-parameter overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskOverrides {
    #[serde(default)]
    pub position_size: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    #[serde(default)]
    pub max_aggregate_risk: Option<f64>,
    #[serde(default)]
    pub kelly_fraction: Option<f64>,
    #[serde(default)]
    pub signal_threshold: Option<f64>,
    #[serde(default)]
    pub reward_ratio: Option<f64>,
    #[serde(default)]
    pub trailing_distance: Option<f64>,
    #[serde(default)]
    pub universe: Option<Vec<String>>,
    #[serde(default)]
    pub max_data_age_secs: Option<i64>,
    #[serde(default)]
    pub max_daily_loss: Option<f64>,
    #[serde(default)]
    pub max_consecutive_losses: Option<u32>,
    #[serde(default)]
    pub max_trades_per_day: Option<u32>,
    #[serde(default)]
    pub min_remote_confidence: Option<f64>,
    #[serde(default)]
    pub volatility_screen: Option<bool>,
}

impl RiskProfile {
    pub fn for_level(level: RiskLevel) -> Self {
        let (max_pos, aggregate, stop, min_stop, max_stop, kelly, blend, threshold, rr) = match level {
            RiskLevel::Low => (0.02, 0.10, 0.04, 0.03, 0.05, 0.10, 0.30, 0.25, 1.5),
            RiskLevel::Medium => (0.04, 0.15, 0.07, 0.06, 0.08, 0.15, 0.50, 0.20, 2.0),
            RiskLevel::High => (0.06, 0.20, 0.10, 0.09, 0.12, 0.18, 0.60, 0.15, 2.5),
        };
        let trailing = (level == RiskLevel::High).then_some(TrailingConfig {
            activation_gain: 0.03,
            distance: 0.06,
        });

        Self {
            level,
            max_position_size: max_pos,
            max_aggregate_risk: aggregate,
            base_stop_loss: stop,
            min_stop_loss: min_stop,
            max_stop_loss_bound: max_stop,
            kelly_fraction: kelly,
            kelly_blend: blend,
            signal_threshold: threshold,
            reward_ratio: rr,
            fixed_take_profit: None,
            trailing,
            assumed_avg_win: 0.02,
            assumed_avg_loss: 0.015,
            universe: Vec::new(),
            max_data_age_secs: 7_200,
            breakers: BreakerLimits::for_level(level),
            volatility_screen: true,
        }
    }

    /// Documented override range for the per-trade position size.
    pub fn position_size_bounds(level: RiskLevel) -> (f64, f64) {
        match level {
            RiskLevel::Low => (0.01, 0.02),
            RiskLevel::Medium => (0.02, 0.04),
            RiskLevel::High => (0.04, 0.06),
        }
    }

    /// Apply `overrides`, rejecting any value outside its documented range.
    pub fn with_overrides(mut self, overrides: &RiskOverrides) -> Result<Self, ConfigError> {
        if let Some(size) = overrides.position_size {
            let (min, max) = Self::position_size_bounds(self.level);
            self.max_position_size = check("position_size", size, min, max)?;
        }
        if let Some(stop) = overrides.stop_loss {
            self.base_stop_loss = check("stop_loss", stop, self.min_stop_loss, self.max_stop_loss_bound)?;
        }
        if let Some(tp) = overrides.take_profit {
            self.fixed_take_profit = Some(check("take_profit", tp, 0.01, 0.5)?);
        }
        if let Some(agg) = overrides.max_aggregate_risk {
            self.max_aggregate_risk = check("max_aggregate_risk", agg, self.max_position_size, 0.5)?;
        }
        if let Some(kelly) = overrides.kelly_fraction {
            self.kelly_fraction = check("kelly_fraction", kelly, 0.01, 0.5)?;
        }
        if let Some(threshold) = overrides.signal_threshold {
            self.signal_threshold = check("signal_threshold", threshold, 0.05, 0.5)?;
        }
        if let Some(rr) = overrides.reward_ratio {
            self.reward_ratio = check("reward_ratio", rr, 1.0, 5.0)?;
        }
        if let Some(distance) = overrides.trailing_distance {
            let trailing = self.trailing.as_mut().ok_or_else(|| {
                ConfigError::Invalid(format!("trailing stop is not available for the {} profile", self.level))
            })?;
            trailing.distance = check("trailing_distance", distance, 0.05, 0.07)?;
        }
        if let Some(universe) = &overrides.universe {
            self.universe = universe.iter().map(|a| a.trim().to_uppercase()).collect();
        }
        if let Some(age) = overrides.max_data_age_secs {
            if age <= 0 {
                return Err(ConfigError::Invalid("max_data_age_secs must be positive".to_string()));
            }
            self.max_data_age_secs = age;
        }
        if let Some(loss) = overrides.max_daily_loss {
            self.breakers.max_daily_loss = check("max_daily_loss", loss, 0.005, 0.5)?;
        }
        if let Some(streak) = overrides.max_consecutive_losses {
            self.breakers.max_consecutive_losses = check_count("max_consecutive_losses", streak, 1, 50)?;
        }
        if let Some(trades) = overrides.max_trades_per_day {
            self.breakers.max_trades_per_day = check_count("max_trades_per_day", trades, 1, 1_000)?;
        }
        if let Some(confidence) = overrides.min_remote_confidence {
            self.breakers.min_remote_confidence = check("min_remote_confidence", confidence, 0.0, 1.0)?;
        }
        if let Some(screen) = overrides.volatility_screen {
            self.volatility_screen = screen;
        }

        if self.max_aggregate_risk < self.max_position_size {
            return Err(ConfigError::Invalid(format!(
                "max_aggregate_risk {} is below max_position_size {}",
                self.max_aggregate_risk, self.max_position_size
            )));
        }

        info!(
            level = %self.level,
            max_position = self.max_position_size,
            stop_loss = self.base_stop_loss,
            aggregate = self.max_aggregate_risk,
            daily_loss = self.breakers.max_daily_loss,
            loss_streak = self.breakers.max_consecutive_losses,
            trades_per_day = self.breakers.max_trades_per_day,
            "risk profile resolved"
        );
        Ok(self)
    }

    pub fn permits(&self, asset: &str) -> bool {
        self.universe.is_empty() || self.universe.iter().any(|a| a.eq_ignore_ascii_case(asset))
    }
}

fn check(field: &'static str, value: f64, min: f64, max: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= min - BOUND_EPSILON && value <= max + BOUND_EPSILON {
        Ok(value)
    } else {
        Err(ConfigError::OutOfBounds { field, value, min, max })
    }
}

fn check_count(field: &'static str, value: u32, min: u32, max: u32) -> Result<u32, ConfigError> {
    check(field, f64::from(value), f64::from(min), f64::from(max)).map(|_| value)
}
