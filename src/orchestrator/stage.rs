// =============================================================================
// Decision stages — one link of the fallback chain
// =============================================================================
//
// A stage either produces a finished, risk-checked Decision or hands over to
// the next stage with a reason.  Only the terminal minimal stage is
// infallible, and it does not implement this trait.
// =============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::decision::Decision;
use crate::indicators::{IndicatorName, IndicatorSet};
use crate::portfolio::RiskBook;
use crate::regime::RegimeAssessment;
use crate::risk::{RiskManager, RiskProfile, TradeProposal};
use crate::scheduler::CycleToken;
use crate::types::{Action, Provenance};

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Ready(Decision),
    NeedsFallback(String),
}

/// Read-only inputs shared by every stage of one evaluation.
pub struct EvaluationContext<'a> {
    pub asset: &'a str,
    pub indicators: &'a IndicatorSet,
    pub regime: &'a RegimeAssessment,
    pub profile: &'a RiskProfile,
    pub book: &'a RiskBook,
    pub manager: &'a RiskManager,
    pub token: &'a CycleToken,
    pub now: DateTime<Utc>,
}

impl EvaluationContext<'_> {
    /// Plan, validate and reserve a proposed action, producing the final
    /// Decision.  A rejected proposal comes back as a hold.
    pub fn finalize(
        &self,
        action: Action,
        confidence: f64,
        required: &[IndicatorName],
        provenance: Provenance,
        reasoning: String,
    ) -> Decision {
        let portfolio = self.book.snapshot();
        let plan = self.manager.plan_position(
            self.asset,
            action,
            confidence,
            self.indicators,
            self.profile,
            &portfolio,
        );
        let proposal = TradeProposal {
            asset: self.asset,
            action,
            plan: &plan,
            indicators: self.indicators,
            required,
            confidence,
            provenance,
        };
        let outcome = self.book.check_and_reserve(self.manager, &proposal, self.profile, self.now);

        Decision::new(
            self.asset,
            outcome.action,
            outcome.plan,
            provenance,
            self.indicators.last_close,
            reasoning,
        )
        .with_confidence(confidence)
        .with_regime(self.regime.regime)
        .with_rejection(outcome.rejection)
        .with_timestamp(self.now)
    }
}

#[async_trait]
pub trait DecisionStage: Send + Sync {
    fn provenance(&self) -> Provenance;

    async fn attempt(&self, ctx: &EvaluationContext<'_>) -> StageOutcome;
}
