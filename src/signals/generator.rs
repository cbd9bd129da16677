// =============================================================================
// Signal Generator — weighted sub-signal combination
// =============================================================================
//
// Sub-signals, each in [-1, 1]:
//
//   trend           0.7 * clamp(40 * (SMA20 - SMA50) / SMA50)
//                 + 0.3 * sign(close - SMA20), scaled by ADX strength
//                   (ADX 15 -> 0.5x, ADX 40 -> 1.0x, unknown -> 0.75x)
//   momentum        0.6 * clamp(ROC% / 3) + 0.4 * MACD histogram term
//                   (level vs 0.2 % of price, slope vs 0.05 % of price);
//                   damped 20 % when OBV slope disagrees
//   mean-reversion  0.5 * RSI distance from 30/70 + 0.5 * (0.5 - %B) * 2
//   volatility      no direction; shrinks confidence as realized volatility
//                   rises above its historical level (and on fat tails)
//
//   score      = Σ weight_i * sub_signal_i
//   action     = buy if score > threshold, sell if < -threshold, else hold
//   confidence = agreement of directional sub-signals with the action
//                * regime confidence * volatility damping
// =============================================================================

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::weights::{SignalWeights, WeightTable};
use crate::indicators::{IndicatorName, IndicatorSet};
use crate::regime::detector::remap;
use crate::regime::{MarketRegime, RegimeAssessment};
use crate::risk::RiskProfile;
use crate::types::Action;

/// Sub-signals with |value| at or below this count as neutral.
const NEUTRAL_BAND: f64 = 0.25;

/// Kurtosis above which return tails are treated as fat.
const FAT_TAIL_KURTOSIS: f64 = 3.0;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalComponent {
    Trend,
    Momentum,
    MeanReversion,
    Volatility,
}

impl std::fmt::Display for SignalComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trend => write!(f, "trend"),
            Self::Momentum => write!(f, "momentum"),
            Self::MeanReversion => write!(f, "mean_reversion"),
            Self::Volatility => write!(f, "volatility"),
        }
    }
}

/// Auditable breakdown of one sub-signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalContribution {
    pub component: SignalComponent,
    /// Normalised sub-signal value.  For volatility this is the confidence
    /// damping factor in [0, 1], not a direction.
    pub value: f64,
    pub weight: f64,
    /// Contribution to the composite score.
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub action: Action,
    /// Composite score clamped to [-1, 1].
    pub strength: f64,
    pub confidence: f64,
    pub regime: MarketRegime,
    pub contributions: Vec<SignalContribution>,
}

impl TradeSignal {
    pub fn contribution(&self, component: SignalComponent) -> Option<&SignalContribution> {
        self.contributions.iter().find(|c| c.component == component)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("required indicators invalid: {}", join(.0))]
    MissingIndicators(Vec<IndicatorName>),
}

fn join(names: &[IndicatorName]) -> String {
    names.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", ")
}

// =============================================================================
// SignalGenerator
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct SignalGenerator {
    weights: WeightTable,
}

impl SignalGenerator {
    pub fn new(weights: WeightTable) -> Self {
        Self { weights }
    }

    pub fn weights(&self, regime: MarketRegime, profile: &RiskProfile) -> SignalWeights {
        self.weights.get(regime, profile.level)
    }

    /// Indicators that the active weighting needs; zero-weighted sub-signals
    /// impose no requirement.
    pub fn required_indicators(weights: &SignalWeights) -> Vec<IndicatorName> {
        let mut required = Vec::new();
        if weights.trend > 0.0 {
            required.extend([IndicatorName::SmaShort, IndicatorName::SmaLong]);
        }
        if weights.momentum > 0.0 {
            required.extend([IndicatorName::RateOfChange, IndicatorName::MacdHistogram]);
        }
        if weights.mean_reversion > 0.0 {
            required.extend([IndicatorName::Rsi, IndicatorName::BollingerPercentB]);
        }
        if weights.volatility > 0.0 {
            required.push(IndicatorName::RealizedVolatility);
        }
        required
    }

    pub fn generate(
        &self,
        indicators: &IndicatorSet,
        regime: &RegimeAssessment,
        profile: &RiskProfile,
    ) -> Result<TradeSignal, SignalError> {
        let w = self.weights(regime.regime, profile);
        let missing = indicators.missing(&Self::required_indicators(&w));
        if !missing.is_empty() {
            return Err(SignalError::MissingIndicators(missing));
        }

        let trend = if w.trend > 0.0 { trend_signal(indicators) } else { 0.0 };
        let momentum = if w.momentum > 0.0 { momentum_signal(indicators) } else { 0.0 };
        let mean_rev = if w.mean_reversion > 0.0 { mean_reversion_signal(indicators) } else { 0.0 };
        let damping = volatility_damping(indicators);

        let score = w.trend * trend + w.momentum * momentum + w.mean_reversion * mean_rev;
        let strength = score.clamp(-1.0, 1.0);
        let threshold = profile.signal_threshold;

        let action = if strength > threshold {
            Action::Buy
        } else if strength < -threshold {
            Action::Sell
        } else {
            Action::Hold
        };

        let directional: Vec<f64> = [(w.trend, trend), (w.momentum, momentum), (w.mean_reversion, mean_rev)]
            .iter()
            .filter(|(weight, _)| *weight > 0.0)
            .map(|(_, s)| *s)
            .collect();
        let agreement = agreement_fraction(&directional, action);
        let vol_factor = (1.0 - 2.0 * w.volatility * (1.0 - damping)).clamp(0.0, 1.0);
        let confidence = (agreement * regime.confidence * vol_factor).clamp(0.0, 1.0);

        let contributions = vec![
            SignalContribution {
                component: SignalComponent::Trend,
                value: trend,
                weight: w.trend,
                contribution: w.trend * trend,
            },
            SignalContribution {
                component: SignalComponent::Momentum,
                value: momentum,
                weight: w.momentum,
                contribution: w.momentum * momentum,
            },
            SignalContribution {
                component: SignalComponent::MeanReversion,
                value: mean_rev,
                weight: w.mean_reversion,
                contribution: w.mean_reversion * mean_rev,
            },
            SignalContribution {
                component: SignalComponent::Volatility,
                value: damping,
                weight: w.volatility,
                contribution: 0.0,
            },
        ];

        debug!(
            regime = %regime.regime,
            level = %profile.level,
            trend = format!("{:.3}", trend),
            momentum = format!("{:.3}", momentum),
            mean_reversion = format!("{:.3}", mean_rev),
            damping = format!("{:.3}", damping),
            score = format!("{:.4}", strength),
            action = %action,
            confidence = format!("{:.3}", confidence),
            "Signal generated"
        );

        Ok(TradeSignal {
            action,
            strength,
            confidence,
            regime: regime.regime,
            contributions,
        })
    }
}

// =============================================================================
// Sub-signals
// =============================================================================

fn unit(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn trend_signal(ind: &IndicatorSet) -> f64 {
    let (Some(short), Some(long)) = (ind.get(IndicatorName::SmaShort), ind.get(IndicatorName::SmaLong)) else {
        return 0.0;
    };
    if long <= 0.0 {
        return 0.0;
    }
    let divergence = unit(40.0 * (short - long) / long);
    let side = sign(ind.last_close - short);
    let strength = ind
        .get(IndicatorName::Adx)
        .map(|adx| remap(adx, 15.0, 40.0, 0.5, 1.0))
        .unwrap_or(0.75);
    unit((0.7 * divergence + 0.3 * side) * strength)
}

fn momentum_signal(ind: &IndicatorSet) -> f64 {
    let price = ind.last_close;
    if price <= 0.0 {
        return 0.0;
    }
    let roc = ind.get(IndicatorName::RateOfChange).map(|r| unit(r / 3.0)).unwrap_or(0.0);
    let hist = ind.get(IndicatorName::MacdHistogram).unwrap_or(0.0);
    let slope = ind.get(IndicatorName::MacdHistogramSlope).unwrap_or(0.0);
    let macd = unit(0.6 * hist / (0.002 * price) + 0.4 * slope / (0.0005 * price));

    let momentum = 0.6 * roc + 0.4 * macd;
    let obv_disagrees = ind
        .get(IndicatorName::ObvSlope)
        .is_some_and(|obv| obv * momentum < 0.0);
    unit(if obv_disagrees { momentum * 0.8 } else { momentum })
}

fn mean_reversion_signal(ind: &IndicatorSet) -> f64 {
    let rsi_term = ind
        .get(IndicatorName::Rsi)
        .map(|rsi| {
            if rsi > 70.0 {
                -(rsi - 70.0) / 30.0
            } else if rsi < 30.0 {
                (30.0 - rsi) / 30.0
            } else {
                (50.0 - rsi) / 100.0
            }
        })
        .unwrap_or(0.0);
    let band_term = ind
        .get(IndicatorName::BollingerPercentB)
        .map(|pb| unit((0.5 - pb) * 2.0))
        .unwrap_or(0.0);
    unit(0.5 * rsi_term + 0.5 * band_term)
}

/// Confidence damping in [0, 1]; 1 means calm volatility.
fn volatility_damping(ind: &IndicatorSet) -> f64 {
    let ratio = match (
        ind.get(IndicatorName::RealizedVolatility),
        ind.get(IndicatorName::HistoricalVolatility),
    ) {
        (Some(cur), Some(hist)) if hist > 0.0 => cur / hist,
        _ => 1.0,
    };
    let mut damping = (1.0 - 0.5 * (ratio - 1.0).max(0.0)).clamp(0.0, 1.0);
    if ind
        .get(IndicatorName::ReturnKurtosis)
        .is_some_and(|k| k > FAT_TAIL_KURTOSIS)
    {
        damping *= 0.9;
    }
    damping
}

/// Fraction of directional sub-signals agreeing with `action`.
fn agreement_fraction(signals: &[f64], action: Action) -> f64 {
    if signals.is_empty() {
        return 0.0;
    }
    let agreeing = signals
        .iter()
        .filter(|&&s| match action {
            Action::Buy => s > 0.0,
            Action::Sell => s < 0.0,
            Action::Hold => s.abs() <= NEUTRAL_BAND,
        })
        .count();
    agreeing as f64 / signals.len() as f64
}
