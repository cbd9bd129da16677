// Volatility risk class of an asset, from its own indicators.
//
//   score = (0.4 * min(1, 20 * realized_vol) + 0.3 * min(1, 20 * atr)) / 0.7
//
//   score <= 0.3  -> low
//   score <= 0.7  -> medium
//   otherwise     -> high
//
// realized_vol is the per-bar return deviation, atr the ATR as a fraction of
// price.  A profile only trades assets whose class is at or below its level.

use crate::indicators::{IndicatorName, IndicatorSet};
use crate::types::RiskLevel;

const VOL_WEIGHT: f64 = 0.4;
const ATR_WEIGHT: f64 = 0.3;
const SATURATION: f64 = 20.0;

pub fn risk_score(realized_vol: f64, atr_fraction: f64) -> f64 {
    let vol = (realized_vol * SATURATION).clamp(0.0, 1.0);
    let atr = (atr_fraction * SATURATION).clamp(0.0, 1.0);
    (VOL_WEIGHT * vol + ATR_WEIGHT * atr) / (VOL_WEIGHT + ATR_WEIGHT)
}

pub fn class_for_score(score: f64) -> RiskLevel {
    if score <= 0.3 {
        RiskLevel::Low
    } else if score <= 0.7 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

/// `None` when either input indicator is invalid.
pub fn classify(indicators: &IndicatorSet) -> Option<RiskLevel> {
    let vol = indicators.get(IndicatorName::RealizedVolatility)?;
    let atr_percent = indicators.get(IndicatorName::AtrPercent)?;
    Some(class_for_score(risk_score(vol, atr_percent / 100.0)))
}
