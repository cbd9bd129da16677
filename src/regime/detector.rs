// =============================================================================
// Market Regime Detector
// =============================================================================
//
// Pure function of an `IndicatorSet`; no state is carried between cycles.
//
// Classification:
//
//   1. TRENDING        — Hurst > trend threshold (0.6)
//   2. MEAN_REVERTING  — Hurst < mean-reversion threshold (0.4)
//   3. VOLATILE        — ambiguous Hurst and high relative volatility
//                        (realized / historical σ, or ATR % of price)
//   4. MEAN_REVERTING  — ambiguous Hurst, calm volatility (conservative
//                        default, low confidence)
//
// Confidence grows with |H - 0.5| (or with the volatility excess for the
// volatile case) and is scaled by the stability of recent volatility.  A
// missing Hurst exponent is read as 0.5 and halves the confidence.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::indicators::{IndicatorName, IndicatorSet};

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    /// Persistent directional move.
    Trending,
    /// Anti-persistent, range-bound price action.
    MeanReverting,
    /// No persistence signal but unusually wide swings.
    Volatile,
}

impl MarketRegime {
    pub const ALL: [MarketRegime; 3] = [Self::Trending, Self::MeanReverting, Self::Volatile];
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trending => write!(f, "trending"),
            Self::MeanReverting => write!(f, "mean_reverting"),
            Self::Volatile => write!(f, "volatile"),
        }
    }
}

/// Classified regime plus the metrics that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeAssessment {
    pub regime: MarketRegime,
    /// Confidence in the classification, in [0, 1].
    pub confidence: f64,
    pub hurst: Option<f64>,
    /// Realized / historical volatility.
    pub volatility_ratio: Option<f64>,
    pub volatility_stability: Option<f64>,
}

fn default_trending_hurst() -> f64 {
    0.6
}

fn default_mean_reverting_hurst() -> f64 {
    0.4
}

fn default_high_volatility_ratio() -> f64 {
    1.5
}

fn default_high_atr_percent() -> f64 {
    4.0
}

/// Tunable classification thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeThresholds {
    #[serde(default = "default_trending_hurst")]
    pub trending_hurst: f64,
    #[serde(default = "default_mean_reverting_hurst")]
    pub mean_reverting_hurst: f64,
    /// Realized / historical σ at or above which the market counts as volatile.
    #[serde(default = "default_high_volatility_ratio")]
    pub high_volatility_ratio: f64,
    /// ATR as a percent of price at or above which the market counts as
    /// volatile (used when historical volatility is unavailable).
    #[serde(default = "default_high_atr_percent")]
    pub high_atr_percent: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            trending_hurst: default_trending_hurst(),
            mean_reverting_hurst: default_mean_reverting_hurst(),
            high_volatility_ratio: default_high_volatility_ratio(),
            high_atr_percent: default_high_atr_percent(),
        }
    }
}

impl RegimeThresholds {
    pub fn validate(&self) -> Result<(), String> {
        let ordered = 0.0 < self.mean_reverting_hurst
            && self.mean_reverting_hurst <= 0.5
            && 0.5 <= self.trending_hurst
            && self.trending_hurst < 1.0;
        if !ordered {
            return Err(format!(
                "Hurst thresholds must satisfy 0 < {} <= 0.5 <= {} < 1",
                self.mean_reverting_hurst, self.trending_hurst
            ));
        }
        if !(self.high_volatility_ratio > 1.0 && self.high_atr_percent > 0.0) {
            return Err("volatility thresholds must be positive (ratio > 1)".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// RegimeDetector
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct RegimeDetector {
    thresholds: RegimeThresholds,
}

impl RegimeDetector {
    pub fn new(thresholds: RegimeThresholds) -> Self {
        Self { thresholds }
    }

    pub fn detect(&self, indicators: &IndicatorSet) -> RegimeAssessment {
        let hurst = indicators.get(IndicatorName::Hurst);
        let volatility_ratio = match (
            indicators.get(IndicatorName::RealizedVolatility),
            indicators.get(IndicatorName::HistoricalVolatility),
        ) {
            (Some(cur), Some(hist)) if hist > 0.0 => Some(cur / hist),
            _ => None,
        };
        let atr_percent = indicators.get(IndicatorName::AtrPercent);
        let stability = indicators.get(IndicatorName::VolatilityStability);

        let (regime, core) = classify(&self.thresholds, hurst.unwrap_or(0.5), volatility_ratio, atr_percent);

        let mut confidence = core * (0.6 + 0.4 * stability.unwrap_or(0.5).clamp(0.0, 1.0));
        if hurst.is_none() {
            confidence *= 0.5;
        }
        let confidence = confidence.clamp(0.0, 1.0);

        debug!(
            regime = %regime,
            hurst = ?hurst.map(|h| format!("{h:.4}")),
            vol_ratio = ?volatility_ratio.map(|v| format!("{v:.3}")),
            confidence = format!("{:.2}", confidence),
            "Regime detected"
        );

        RegimeAssessment {
            regime,
            confidence,
            hurst,
            volatility_ratio,
            volatility_stability: stability,
        }
    }
}

// =============================================================================
// Classification logic
// =============================================================================

/// Regime and an unscaled core confidence.
fn classify(
    t: &RegimeThresholds,
    hurst: f64,
    volatility_ratio: Option<f64>,
    atr_percent: Option<f64>,
) -> (MarketRegime, f64) {
    let distance = (hurst - 0.5).abs();

    if hurst > t.trending_hurst {
        return (MarketRegime::Trending, remap(distance, 0.1, 0.4, 0.5, 1.0));
    }
    if hurst < t.mean_reverting_hurst {
        return (MarketRegime::MeanReverting, remap(distance, 0.1, 0.4, 0.5, 1.0));
    }

    // Ambiguous persistence: let volatility decide.
    let ratio_excess = volatility_ratio.map(|r| r / t.high_volatility_ratio);
    let atr_excess = atr_percent.map(|a| a / t.high_atr_percent);
    let excess = match (ratio_excess, atr_excess) {
        (Some(r), _) => r,
        (None, Some(a)) => a,
        (None, None) => 0.0,
    };

    if excess >= 1.0 {
        return (MarketRegime::Volatile, remap(excess, 1.0, 2.0, 0.5, 0.9));
    }

    trace!(hurst, excess, "Regime: ambiguous, defaulting to MEAN_REVERTING");
    (MarketRegime::MeanReverting, remap(distance, 0.0, 0.1, 0.2, 0.4))
}

/// Linearly remap `value` from `[in_lo, in_hi]` to `[out_lo, out_hi]`, clamped
/// to the output range. Works regardless of whether `in_lo < in_hi` or vice
/// versa.
pub(crate) fn remap(value: f64, in_lo: f64, in_hi: f64, out_lo: f64, out_hi: f64) -> f64 {
    let t = if (in_hi - in_lo).abs() < f64::EPSILON {
        0.5
    } else {
        (value - in_lo) / (in_hi - in_lo)
    };
    out_lo + t.clamp(0.0, 1.0) * (out_hi - out_lo)
}
