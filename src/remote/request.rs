// =============================================================================
// Inference Request — structured context sent to the remote model
// =============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::indicators::IndicatorSet;
use crate::portfolio::PortfolioState;
use crate::regime::{MarketRegime, RegimeAssessment};
use crate::risk::RiskProfile;
use crate::types::RiskLevel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_value: f64,
    pub aggregate_exposure: f64,
    /// Signed exposure already held in the requested asset.
    pub asset_exposure: f64,
    pub open_positions: usize,
    pub win_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub level: RiskLevel,
    pub max_position_size: f64,
    pub max_aggregate_risk: f64,
    pub base_stop_loss: f64,
    pub signal_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub asset: String,
    pub as_of: DateTime<Utc>,
    pub last_close: f64,
    /// Every indicator, `None` when invalid.
    pub indicators: BTreeMap<String, Option<f64>>,
    pub regime: MarketRegime,
    pub regime_confidence: f64,
    pub hurst: Option<f64>,
    pub volatility_ratio: Option<f64>,
    pub volatility_stability: Option<f64>,
    pub portfolio: PortfolioSummary,
    pub risk: RiskSummary,
}

const SYSTEM_PROMPT: &str = "You are a disciplined trading analyst. \
Given the market context as JSON, answer with a single JSON object \
{\"action\": \"buy\" | \"sell\" | \"hold\", \"confidence\": number between 0 and 1, \
\"reasoning\": short string}. Respect the risk limits in the context. \
Do not add any other text.";

impl InferenceRequest {
    pub fn build(
        asset: &str,
        indicators: &IndicatorSet,
        regime: &RegimeAssessment,
        portfolio: &PortfolioState,
        profile: &RiskProfile,
    ) -> Self {
        Self {
            asset: asset.to_string(),
            as_of: indicators.last_timestamp,
            last_close: indicators.last_close,
            indicators: indicators
                .iter()
                .map(|(name, value)| (name.as_str().to_string(), value.value()))
                .collect(),
            regime: regime.regime,
            regime_confidence: regime.confidence,
            hurst: regime.hurst,
            volatility_ratio: regime.volatility_ratio,
            volatility_stability: regime.volatility_stability,
            portfolio: PortfolioSummary {
                total_value: portfolio.total_value,
                aggregate_exposure: portfolio.aggregate_exposure(),
                asset_exposure: portfolio.exposure(asset),
                open_positions: portfolio.holdings.len(),
                win_rate: portfolio.stats.win_rate(),
            },
            risk: RiskSummary {
                level: profile.level,
                max_position_size: profile.max_position_size,
                max_aggregate_risk: profile.max_aggregate_risk,
                base_stop_loss: profile.base_stop_loss,
                signal_threshold: profile.signal_threshold,
            },
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT
    }

    /// User message: the context document as pretty JSON.
    pub fn user_prompt(&self) -> serde_json::Result<String> {
        let context = serde_json::to_string_pretty(self)?;
        Ok(format!(
            "Market context for {}:\n{}\nDecide the next action for {}.",
            self.asset, context, self.asset
        ))
    }
}
