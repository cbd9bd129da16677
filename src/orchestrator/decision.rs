// =============================================================================
// Decision — auditable record of one (asset, cycle) evaluation
// =============================================================================
//
// Every evaluation ends in exactly one Decision.  Besides the action and
// plan it records which stage produced it, why earlier stages were skipped
// and, when risk validation degraded the action to hold, the rejection.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::regime::MarketRegime;
use crate::risk::{PositionPlan, RejectionReason, TrailingStopState};
use crate::types::{Action, Provenance};

/// A stage that handed over to the next one, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackStep {
    pub stage: Provenance,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub asset: String,
    /// Epoch of the cycle that produced it.
    pub cycle: u64,
    pub action: Action,
    pub plan: PositionPlan,
    pub confidence: f64,
    pub reasoning: String,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regime: Option<MarketRegime>,
    /// Last close the decision was made against.
    pub reference_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectionReason>,
    /// Updated trailing-stop state of an open position in this asset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trailing_stop: Option<TrailingStopState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_trail: Vec<FallbackStep>,
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    pub fn new(
        asset: impl Into<String>,
        action: Action,
        plan: PositionPlan,
        provenance: Provenance,
        reference_price: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            asset: asset.into(),
            cycle: 0,
            action,
            plan,
            confidence: 0.0,
            reasoning: reasoning.into(),
            provenance,
            regime: None,
            reference_price,
            rejection: None,
            trailing_stop: None,
            fallback_trail: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 };
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_regime(mut self, regime: MarketRegime) -> Self {
        self.regime = Some(regime);
        self
    }

    /// Attach a risk rejection; the reason is appended to the reasoning.
    pub fn with_rejection(mut self, rejection: Option<RejectionReason>) -> Self {
        if let Some(reason) = &rejection {
            self.reasoning = format!("{}; rejected: {}", self.reasoning, reason);
        }
        self.rejection = rejection;
        self
    }

    pub fn is_rejected(&self) -> bool {
        self.rejection.is_some()
    }
}
