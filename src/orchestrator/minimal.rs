// =============================================================================
// Minimal stage — single-indicator RSI rule, the guaranteed terminus
// =============================================================================
//
//   RSI < 30  -> buy      confidence = (30 - RSI) / 30
//   RSI > 70  -> sell     confidence = (RSI - 70) / 30
//   otherwise -> hold
//   RSI invalid -> hold
//
// Total over every RSI value.  Trades are still risk-checked.
// =============================================================================

use tracing::debug;

use super::decision::Decision;
use super::stage::EvaluationContext;
use crate::indicators::rsi::{RsiZone, OVERBOUGHT, OVERSOLD};
use crate::indicators::IndicatorName;
use crate::risk::PositionPlan;
use crate::types::{Action, Provenance};

#[derive(Debug, Clone, Copy, Default)]
pub struct MinimalStage;

impl MinimalStage {
    /// Action and confidence for an RSI reading.
    pub fn rule(rsi: Option<f64>) -> (Action, f64) {
        match rsi.filter(|v| v.is_finite()) {
            Some(v) => match RsiZone::classify(v) {
                RsiZone::Oversold => (Action::Buy, ((OVERSOLD - v) / OVERSOLD).clamp(0.0, 1.0)),
                RsiZone::Overbought => (Action::Sell, ((v - OVERBOUGHT) / (100.0 - OVERBOUGHT)).clamp(0.0, 1.0)),
                RsiZone::Neutral => (Action::Hold, 0.0),
            },
            None => (Action::Hold, 0.0),
        }
    }

    pub fn decide(&self, ctx: &EvaluationContext<'_>) -> Decision {
        let rsi = ctx.indicators.get(IndicatorName::Rsi);
        let (action, confidence) = Self::rule(rsi);
        debug!(asset = ctx.asset, rsi = ?rsi, action = %action, "minimal rule applied");

        let Some(rsi) = rsi else {
            return Decision::new(
                ctx.asset,
                Action::Hold,
                PositionPlan::flat(ctx.profile),
                Provenance::Minimal,
                ctx.indicators.last_close,
                "minimal: RSI unavailable, holding",
            )
            .with_regime(ctx.regime.regime)
            .with_timestamp(ctx.now);
        };

        let reasoning = format!("minimal: RSI {rsi:.1} is {}", RsiZone::classify(rsi));
        ctx.finalize(action, confidence, &[IndicatorName::Rsi], Provenance::Minimal, reasoning)
    }
}
