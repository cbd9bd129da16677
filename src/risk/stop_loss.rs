// =============================================================================
// Stop-Loss — volatility-scaled fixed stop and ratcheting trailing stop
// =============================================================================
//
// Fixed stop:
//   stop = profile.base_stop_loss * clamp(realized / historical vol, 0.5, 2.0)
//   then clamped into [profile.min_stop_loss, profile.max_stop_loss_bound].
//
// Trailing stop (profiles with a TrailingConfig only):
//   - arms once unrealized gain >= activation_gain
//   - stop sits `distance` below the best price (above, for shorts)
//   - the stop only ever moves in the position's favour
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::profile::{RiskProfile, TrailingConfig};

const MIN_VOL_SCALE: f64 = 0.5;
const MAX_VOL_SCALE: f64 = 2.0;

/// Volatility-adjusted stop-loss fraction; always within the profile bounds.
pub fn stop_loss(profile: &RiskProfile, volatility_ratio: Option<f64>) -> f64 {
    let scale = match volatility_ratio {
        Some(r) if r.is_finite() && r > 0.0 => r.clamp(MIN_VOL_SCALE, MAX_VOL_SCALE),
        _ => 1.0,
    };
    (profile.base_stop_loss * scale).clamp(profile.min_stop_loss, profile.max_stop_loss_bound)
}

/// Take-profit fraction for a given stop distance.
pub fn take_profit(profile: &RiskProfile, stop_loss: f64) -> f64 {
    profile.fixed_take_profit.unwrap_or(stop_loss * profile.reward_ratio)
}

// =============================================================================
// TrailingStopState
// =============================================================================

/// Per-position trailing-stop state, owned by the portfolio and updated by
/// the risk manager on each observed price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingStopState {
    pub is_long: bool,
    pub entry_price: f64,
    /// Highest price seen for longs, lowest for shorts.
    pub best_price: f64,
    pub activation_gain: f64,
    pub distance: f64,
    /// `None` until armed.
    pub stop_price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailUpdate {
    pub stop_price: Option<f64>,
    /// The stop moved on this update.
    pub tightened: bool,
    /// Price crossed the armed stop.
    pub hit: bool,
}

impl TrailingStopState {
    pub fn new(is_long: bool, entry_price: f64, config: TrailingConfig) -> Self {
        Self {
            is_long,
            entry_price,
            best_price: entry_price,
            activation_gain: config.activation_gain,
            distance: config.distance,
            stop_price: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.stop_price.is_some()
    }

    fn unrealized_gain(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        if self.is_long {
            price / self.entry_price - 1.0
        } else {
            1.0 - price / self.entry_price
        }
    }

    /// Feed the latest price.  Non-finite or non-positive prices are ignored.
    pub fn update(&mut self, price: f64) -> TrailUpdate {
        if !price.is_finite() || price <= 0.0 {
            return TrailUpdate {
                stop_price: self.stop_price,
                tightened: false,
                hit: false,
            };
        }

        if let Some(stop) = self.stop_price {
            let hit = if self.is_long { price <= stop } else { price >= stop };
            if hit {
                info!(
                    is_long = self.is_long,
                    price = format!("{:.4}", price),
                    stop = format!("{:.4}", stop),
                    "trailing stop hit"
                );
                return TrailUpdate {
                    stop_price: Some(stop),
                    tightened: false,
                    hit: true,
                };
            }
        }

        let improved = if self.is_long { price > self.best_price } else { price < self.best_price };
        if improved {
            self.best_price = price;
        }

        if self.stop_price.is_none() && self.unrealized_gain(self.best_price) < self.activation_gain {
            return TrailUpdate {
                stop_price: None,
                tightened: false,
                hit: false,
            };
        }

        let candidate = if self.is_long {
            self.best_price * (1.0 - self.distance)
        } else {
            self.best_price * (1.0 + self.distance)
        };

        let tightened = match self.stop_price {
            None => {
                info!(
                    is_long = self.is_long,
                    entry = format!("{:.4}", self.entry_price),
                    stop = format!("{:.4}", candidate),
                    "trailing stop armed"
                );
                true
            }
            Some(stop) if self.is_long => candidate > stop,
            Some(stop) => candidate < stop,
        };

        if tightened {
            debug!(stop = format!("{:.4}", candidate), "trailing stop tightened");
            self.stop_price = Some(candidate);
        }

        TrailUpdate {
            stop_price: self.stop_price,
            tightened,
            hit: false,
        }
    }
}
