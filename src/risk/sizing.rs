// =============================================================================
// Position Sizing — volatility, correlation and fractional-Kelly blend
// =============================================================================
//
//   base        = profile.max_position_size
//   vol factor  = max(0, 1 - 0.5 * max(0, realized / historical - 1))
//   corr factor = 1 - 0.3 * clamp(correlation with holdings, 0, 1)
//   adjusted    = base * vol factor * corr factor
//
//   p           = clamp(0.45 + 0.2 * confidence, 0.45, 0.65)
//   b           = avg_win / avg_loss   (reported outcomes once enough exist)
//   kelly       = (b * p - (1 - p)) / b
//   size        = (1 - blend) * adjusted + blend * max(0, kelly) * kelly_fraction
//                 clipped to [0, profile.max_position_size]
// =============================================================================

use serde::{Deserialize, Serialize};

use super::profile::RiskProfile;
use crate::portfolio::OutcomeStats;

const MIN_WIN_RATE: f64 = 0.45;
const MAX_WIN_RATE: f64 = 0.65;
const CORRELATION_PENALTY: f64 = 0.3;
const VOLATILITY_PENALTY: f64 = 0.5;

/// Closed trades required before reported payoff stats replace the assumed ones.
pub const MIN_REPORTED_TRADES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingInputs {
    pub confidence: f64,
    /// Realized / historical volatility, when both are known.
    pub volatility_ratio: Option<f64>,
    pub correlation: f64,
}

/// Every intermediate term, kept for the decision journal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizingBreakdown {
    pub base: f64,
    pub volatility_factor: f64,
    pub correlation_factor: f64,
    pub win_rate: f64,
    pub payoff_ratio: f64,
    pub kelly: f64,
    pub size: f64,
}

pub fn estimated_win_rate(confidence: f64) -> f64 {
    let confidence = if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 };
    (MIN_WIN_RATE + 0.2 * confidence).clamp(MIN_WIN_RATE, MAX_WIN_RATE)
}

/// Win/loss payoff ratio `b`.
pub fn payoff_ratio(profile: &RiskProfile, stats: &OutcomeStats) -> f64 {
    if stats.closed_trades() >= MIN_REPORTED_TRADES && stats.avg_win > 0.0 && stats.avg_loss > 0.0 {
        stats.avg_win / stats.avg_loss
    } else {
        profile.assumed_avg_win / profile.assumed_avg_loss
    }
}

/// Raw Kelly fraction `(b*p - q) / b`; may be negative.
pub fn kelly_criterion(win_rate: f64, payoff: f64) -> f64 {
    if payoff <= 0.0 || !payoff.is_finite() {
        return 0.0;
    }
    (payoff * win_rate - (1.0 - win_rate)) / payoff
}

pub fn volatility_factor(volatility_ratio: Option<f64>) -> f64 {
    match volatility_ratio {
        Some(r) if r.is_finite() => (1.0 - VOLATILITY_PENALTY * (r - 1.0).max(0.0)).max(0.0),
        _ => 1.0,
    }
}

pub fn correlation_factor(correlation: f64) -> f64 {
    let c = if correlation.is_finite() { correlation.clamp(0.0, 1.0) } else { 0.0 };
    1.0 - CORRELATION_PENALTY * c
}

pub fn position_size(profile: &RiskProfile, inputs: &SizingInputs, stats: &OutcomeStats) -> SizingBreakdown {
    let base = profile.max_position_size;
    let vol = volatility_factor(inputs.volatility_ratio);
    let corr = correlation_factor(inputs.correlation);
    let adjusted = base * vol * corr;

    let win_rate = estimated_win_rate(inputs.confidence);
    let payoff = payoff_ratio(profile, stats);
    let kelly = kelly_criterion(win_rate, payoff);

    let blended = (1.0 - profile.kelly_blend) * adjusted
        + profile.kelly_blend * kelly.max(0.0) * profile.kelly_fraction;
    let size = if blended.is_finite() {
        blended.clamp(0.0, profile.max_position_size)
    } else {
        0.0
    };

    SizingBreakdown {
        base,
        volatility_factor: vol,
        correlation_factor: corr,
        win_rate,
        payoff_ratio: payoff,
        kelly,
        size,
    }
}
