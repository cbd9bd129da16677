// =============================================================================
// Quant stage — deterministic signal generation plus risk sizing
// =============================================================================

use async_trait::async_trait;
use tracing::debug;

use super::stage::{DecisionStage, EvaluationContext, StageOutcome};
use crate::signals::{SignalComponent, SignalGenerator, TradeSignal};
use crate::types::Provenance;

pub struct QuantStage {
    generator: SignalGenerator,
}

impl QuantStage {
    pub fn new(generator: SignalGenerator) -> Self {
        Self { generator }
    }
}

fn describe(signal: &TradeSignal, threshold: f64) -> String {
    let value = |c: SignalComponent| signal.contribution(c).map_or(0.0, |s| s.value);
    format!(
        "quant: {} score {:+.3} vs threshold {:.2} in {} regime; trend {:+.2}, momentum {:+.2}, \
         mean reversion {:+.2}, volatility damping {:.2}",
        signal.action,
        signal.strength,
        threshold,
        signal.regime,
        value(SignalComponent::Trend),
        value(SignalComponent::Momentum),
        value(SignalComponent::MeanReversion),
        value(SignalComponent::Volatility),
    )
}

#[async_trait]
impl DecisionStage for QuantStage {
    fn provenance(&self) -> Provenance {
        Provenance::Quant
    }

    async fn attempt(&self, ctx: &EvaluationContext<'_>) -> StageOutcome {
        let signal = match self.generator.generate(ctx.indicators, ctx.regime, ctx.profile) {
            Ok(signal) => signal,
            Err(err) => {
                debug!(asset = ctx.asset, error = %err, "quant path unavailable");
                return StageOutcome::NeedsFallback(err.to_string());
            }
        };

        let weights = self.generator.weights(ctx.regime.regime, ctx.profile);
        let required = SignalGenerator::required_indicators(&weights);
        let reasoning = describe(&signal, ctx.profile.signal_threshold);
        StageOutcome::Ready(ctx.finalize(
            signal.action,
            signal.confidence,
            &required,
            Provenance::Quant,
            reasoning,
        ))
    }
}
