// =============================================================================
// Decision Orchestrator — remote -> quant -> minimal fallback chain
// =============================================================================
//
//   ATTEMPT_REMOTE --fail--> ATTEMPT_QUANT --fail--> ATTEMPT_MINIMAL
//         |                        |                        |
//         +--------- ready --------+--------- ready --------+--> DECISION_READY
//
// Stages run in order until one is ready; the minimal stage is infallible,
// so `evaluate` always returns a Decision.  The only await is inside the
// remote stage, which is bounded by the invoker's timeout/retry policy.
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::decision::{Decision, FallbackStep};
use super::minimal::MinimalStage;
use super::quant::QuantStage;
use super::remote_stage::RemoteStage;
use super::stage::{DecisionStage, EvaluationContext, StageOutcome};
use crate::indicators::{IndicatorEngine, IndicatorSet};
use crate::market_data::PriceSeries;
use crate::portfolio::RiskBook;
use crate::regime::RegimeDetector;
use crate::remote::RemoteInvoker;
use crate::risk::{RiskManager, RiskProfile};
use crate::scheduler::CycleToken;
use crate::signals::SignalGenerator;

pub struct DecisionOrchestrator {
    engine: IndicatorEngine,
    detector: RegimeDetector,
    manager: RiskManager,
    stages: Vec<Box<dyn DecisionStage>>,
    terminal: MinimalStage,
}

impl DecisionOrchestrator {
    pub fn new(
        engine: IndicatorEngine,
        detector: RegimeDetector,
        generator: SignalGenerator,
        remote: Option<Arc<RemoteInvoker>>,
    ) -> Self {
        Self {
            engine,
            detector,
            manager: RiskManager::new(),
            stages: vec![Box::new(RemoteStage::new(remote)), Box::new(QuantStage::new(generator))],
            terminal: MinimalStage,
        }
    }

    pub fn engine(&self) -> &IndicatorEngine {
        &self.engine
    }

    /// Compute indicators for `series` and run the chain.
    pub async fn evaluate(
        &self,
        asset: &str,
        series: &PriceSeries,
        profile: &RiskProfile,
        book: &RiskBook,
        token: &CycleToken,
        now: DateTime<Utc>,
    ) -> Decision {
        let indicators = self.engine.compute(series);
        self.decide(asset, &indicators, profile, book, token, now).await
    }

    /// Run the chain over an already computed indicator set.
    pub async fn decide(
        &self,
        asset: &str,
        indicators: &IndicatorSet,
        profile: &RiskProfile,
        book: &RiskBook,
        token: &CycleToken,
        now: DateTime<Utc>,
    ) -> Decision {
        let regime = self.detector.detect(indicators);
        let trailing = book.update_trailing(&self.manager, asset, indicators.last_close);
        if let Some((state, update)) = &trailing {
            if update.hit {
                info!(
                    asset,
                    price = indicators.last_close,
                    stop = ?state.stop_price,
                    "trailing stop hit on open position"
                );
            }
        }

        let ctx = EvaluationContext {
            asset,
            indicators,
            regime: &regime,
            profile,
            book,
            manager: &self.manager,
            token,
            now,
        };

        let mut trail = Vec::new();
        let mut ready = None;
        for stage in &self.stages {
            match stage.attempt(&ctx).await {
                StageOutcome::Ready(decision) => {
                    ready = Some(decision);
                    break;
                }
                StageOutcome::NeedsFallback(reason) => trail.push(FallbackStep {
                    stage: stage.provenance(),
                    reason,
                }),
            }
        }

        let mut decision = match ready {
            Some(decision) => decision,
            None => self.terminal.decide(&ctx),
        };
        decision.cycle = token.epoch();
        decision.timestamp = now;
        decision.fallback_trail = trail;
        decision.trailing_stop = trailing.map(|(state, _)| state);

        info!(
            asset,
            cycle = decision.cycle,
            action = %decision.action,
            provenance = %decision.provenance,
            regime = %regime.regime,
            size = format!("{:.4}", decision.plan.size),
            stop_loss = format!("{:.4}", decision.plan.stop_loss),
            confidence = format!("{:.2}", decision.confidence),
            rejected = decision.is_rejected(),
            "decision ready"
        );
        decision
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::error::RemoteServiceError;
    use crate::indicators::{detect_backend, IndicatorName};
    use crate::market_data::fixtures;
    use crate::portfolio::{Holding, PortfolioState};
    use crate::remote::testing::ScriptedRemote;
    use crate::remote::RetryPolicy;
    use crate::risk::RejectionReason;
    use crate::scheduler::CycleClock;
    use crate::types::{Action, Provenance, RiskLevel};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(50),
            max_retries: 1,
            backoff_base: Duration::from_millis(5),
        }
    }

    fn orchestrator(remote: Option<Arc<ScriptedRemote>>) -> DecisionOrchestrator {
        let invoker = remote.map(|r| Arc::new(RemoteInvoker::new(r, policy(), 2)));
        DecisionOrchestrator::new(
            IndicatorEngine::new(detect_backend()),
            RegimeDetector::default(),
            SignalGenerator::default(),
            invoker,
        )
    }

    fn unavailable() -> Arc<ScriptedRemote> {
        Arc::new(ScriptedRemote::new(vec![
            Err(RemoteServiceError::Transport("connection refused".into())),
            Err(RemoteServiceError::Transport("connection refused".into())),
        ]))
    }

    // ---- scenario A --------------------------------------------------------

    #[tokio::test]
    async fn uptrend_low_risk_falls_back_to_quant_buy() {
        let now = Utc::now();
        let series = fixtures::uptrend(200, now);
        let profile = RiskProfile::for_level(RiskLevel::Low);
        let book = RiskBook::new(PortfolioState::new(10_000.0));
        let remote = unavailable();

        let d = orchestrator(Some(remote.clone()))
            .evaluate("BTC", &series, &profile, &book, &CycleToken::detached(), now)
            .await;

        assert_eq!(d.provenance, Provenance::Quant);
        assert_eq!(d.action, Action::Buy);
        assert!(d.plan.size > 0.0 && d.plan.size <= 0.02);
        assert!(d.plan.stop_loss >= 0.03 && d.plan.stop_loss <= 0.05);
        assert!(d.plan.take_profit.is_some());
        assert!(!d.plan.trailing);
        assert_eq!(remote.calls(), 2);
        assert_eq!(d.fallback_trail.len(), 1);
        assert_eq!(d.fallback_trail[0].stage, Provenance::Remote);
        assert!((book.snapshot().exposure("BTC") - d.plan.size).abs() < 1e-12);
    }

    // ---- scenario B --------------------------------------------------------

    #[tokio::test]
    async fn flat_series_minimal_path_holds() {
        let now = Utc::now();
        let set = IndicatorEngine::new(detect_backend()).compute(&fixtures::flat(60, now));
        assert_eq!(set.get(IndicatorName::Rsi), Some(50.0));

        let profile = RiskProfile::for_level(RiskLevel::Medium);
        let book = RiskBook::default();
        let regime = RegimeDetector::default().detect(&set);
        let token = CycleToken::detached();
        let ctx = EvaluationContext {
            asset: "BTC",
            indicators: &set,
            regime: &regime,
            profile: &profile,
            book: &book,
            manager: &RiskManager,
            token: &token,
            now,
        };
        let d = MinimalStage.decide(&ctx);
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.provenance, Provenance::Minimal);
        assert_eq!(d.plan.size, 0.0);
    }

    // ---- scenario C --------------------------------------------------------

    #[tokio::test]
    async fn aggregate_budget_breach_degrades_to_hold() {
        let now = Utc::now();
        let series = fixtures::uptrend(200, now);
        let profile = RiskProfile::for_level(RiskLevel::Low);
        let mut state = PortfolioState::new(10_000.0);
        for asset in ["ETH", "SOL", "ADA", "DOT", "XRP"] {
            state.holdings.insert(
                asset.into(),
                Holding {
                    exposure: 0.02,
                    entry_price: 10.0,
                    trailing: None,
                },
            );
        }
        let book = RiskBook::new(state);

        let d = orchestrator(None)
            .evaluate("BTC", &series, &profile, &book, &CycleToken::detached(), now)
            .await;

        assert_eq!(d.provenance, Provenance::Quant);
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.plan.size, 0.0);
        assert!(matches!(d.rejection, Some(RejectionReason::ExceedsAggregateBudget { .. })));
        assert!(d.reasoning.contains("exceeds aggregate risk budget"));
        assert_eq!(book.snapshot().exposure("BTC"), 0.0);
    }

    // ---- scenario D --------------------------------------------------------

    #[tokio::test]
    async fn malformed_remote_reply_falls_back_without_retry() {
        let now = Utc::now();
        let series = fixtures::uptrend(200, now);
        let profile = RiskProfile::for_level(RiskLevel::Medium);
        let remote = Arc::new(ScriptedRemote::new(vec![
            Ok(r#"{"action":"LONG!!","confidence":0.9}"#.into()),
            Ok(r#"{"action":"buy","confidence":0.9}"#.into()),
        ]));

        let d = orchestrator(Some(remote.clone()))
            .evaluate("BTC", &series, &profile, &RiskBook::default(), &CycleToken::detached(), now)
            .await;

        assert_eq!(d.provenance, Provenance::Quant);
        assert_eq!(remote.calls(), 1);
        assert!(d.fallback_trail[0].reason.contains("malformed"));
    }

    // ---- remote path -------------------------------------------------------

    #[tokio::test]
    async fn remote_decision_is_still_risk_checked() {
        let now = Utc::now();
        let series = fixtures::flat(200, now);
        let mut profile = RiskProfile::for_level(RiskLevel::High);
        let remote = Arc::new(ScriptedRemote::new(vec![Ok(
            r#"{"action":"buy","confidence":0.8,"reasoning":"breakout"}"#.into(),
        )]));
        let orch = orchestrator(Some(remote));

        let d = orch
            .evaluate("BTC", &series, &profile, &RiskBook::default(), &CycleToken::detached(), now)
            .await;
        assert_eq!(d.provenance, Provenance::Remote);
        assert_eq!(d.action, Action::Buy);
        assert!(d.plan.size <= profile.max_position_size);
        assert!(d.plan.trailing);
        assert_eq!(d.reasoning, "remote: breakout");

        profile.universe = vec!["ETH".into()];
        let remote = Arc::new(ScriptedRemote::new(vec![Ok(r#"{"action":"buy","confidence":0.8}"#.into())]));
        let d = orchestrator(Some(remote))
            .evaluate("BTC", &series, &profile, &RiskBook::default(), &CycleToken::detached(), now)
            .await;
        assert_eq!(d.provenance, Provenance::Remote);
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.rejection, Some(RejectionReason::NotInUniverse));
    }

    // ---- timeouts and short data -------------------------------------------

    #[tokio::test]
    async fn hanging_remote_still_yields_one_decision_in_bounded_time() {
        let now = Utc::now();
        let profile = RiskProfile::for_level(RiskLevel::Medium);
        let orch = orchestrator(Some(Arc::new(ScriptedRemote::hanging())));

        for series in [fixtures::uptrend(200, now), fixtures::random_walk(30, 9, now)] {
            let started = std::time::Instant::now();
            let d = orch
                .evaluate("BTC", &series, &profile, &RiskBook::default(), &CycleToken::detached(), now)
                .await;
            assert!(matches!(d.provenance, Provenance::Quant | Provenance::Minimal));
            assert!(started.elapsed() < policy().worst_case() + Duration::from_secs(1));
            assert!(d.fallback_trail[0].reason.contains("timed out"));
        }
    }

    #[tokio::test]
    async fn short_series_reaches_minimal() {
        let now = Utc::now();
        let d = orchestrator(None)
            .evaluate(
                "BTC",
                &fixtures::uptrend(30, now),
                &RiskProfile::for_level(RiskLevel::Medium),
                &RiskBook::default(),
                &CycleToken::detached(),
                now,
            )
            .await;
        assert_eq!(d.provenance, Provenance::Minimal);
        let stages: Vec<Provenance> = d.fallback_trail.iter().map(|s| s.stage).collect();
        assert_eq!(stages, vec![Provenance::Remote, Provenance::Quant]);
        assert!(d.fallback_trail[1].reason.contains("sma_long"));
    }

    #[tokio::test]
    async fn single_bar_series_holds() {
        let now = Utc::now();
        let d = orchestrator(None)
            .evaluate(
                "BTC",
                &fixtures::flat(1, now),
                &RiskProfile::for_level(RiskLevel::High),
                &RiskBook::default(),
                &CycleToken::detached(),
                now,
            )
            .await;
        assert_eq!(d.provenance, Provenance::Minimal);
        assert_eq!(d.action, Action::Hold);
        assert!(d.plan.stop_loss > 0.0);
    }

    #[tokio::test]
    async fn superseded_cycle_skips_remote() {
        let now = Utc::now();
        let clock = CycleClock::new();
        let token = clock.advance();
        clock.advance();
        let remote = Arc::new(ScriptedRemote::hanging());

        let d = orchestrator(Some(remote))
            .evaluate(
                "BTC",
                &fixtures::uptrend(200, now),
                &RiskProfile::for_level(RiskLevel::Medium),
                &RiskBook::default(),
                &token,
                now,
            )
            .await;
        assert_ne!(d.provenance, Provenance::Remote);
        assert!(d.fallback_trail[0].reason.contains("superseded"));
        assert_eq!(d.cycle, token.epoch());
    }

    #[tokio::test]
    async fn open_position_trailing_state_is_reported() {
        let now = Utc::now();
        let profile = RiskProfile::for_level(RiskLevel::High);
        let mut state = PortfolioState::new(10_000.0);
        state.apply_fill("BTC", 0.04, 150.0, profile.trailing);
        let book = RiskBook::new(state);

        // uptrend(200) closes at 199.5, well past the 3 % activation gain.
        let d = orchestrator(None)
            .evaluate("BTC", &fixtures::uptrend(200, now), &profile, &book, &CycleToken::detached(), now)
            .await;
        let trailing = d.trailing_stop.unwrap();
        assert!(trailing.stop_price.is_some());
    }

    #[tokio::test]
    async fn decisions_carry_the_cycle_time() {
        let now = Utc::now() - chrono::Duration::minutes(30);
        let profile = RiskProfile::for_level(RiskLevel::Medium);
        let orch = orchestrator(None);
        for series in [fixtures::uptrend(200, now), fixtures::uptrend(30, now)] {
            let d = orch
                .evaluate("BTC", &series, &profile, &RiskBook::default(), &CycleToken::detached(), now)
                .await;
            assert_eq!(d.timestamp, now);
        }
    }

    // ---- circuit breakers --------------------------------------------------

    #[tokio::test]
    async fn tripped_breaker_turns_a_quant_buy_into_hold() {
        let now = Utc::now();
        let profile = RiskProfile::for_level(RiskLevel::Low);
        let mut state = PortfolioState::new(10_000.0);
        state.breaker.record_outcome(now, -0.025);
        let book = RiskBook::new(state);

        let d = orchestrator(None)
            .evaluate("BTC", &fixtures::uptrend(200, now), &profile, &book, &CycleToken::detached(), now)
            .await;
        assert_eq!(d.provenance, Provenance::Quant);
        assert_eq!(d.action, Action::Hold);
        assert!(matches!(d.rejection, Some(RejectionReason::DailyLossLimit { .. })));
        assert_eq!(book.snapshot().exposure("BTC"), 0.0);
    }

    #[tokio::test]
    async fn unconfident_remote_buy_is_held() {
        let now = Utc::now();
        let profile = RiskProfile::for_level(RiskLevel::Low);
        let remote = Arc::new(ScriptedRemote::new(vec![Ok(r#"{"action":"buy","confidence":0.4}"#.into())]));

        let d = orchestrator(Some(remote))
            .evaluate("BTC", &fixtures::uptrend(200, now), &profile, &RiskBook::default(), &CycleToken::detached(), now)
            .await;
        assert_eq!(d.provenance, Provenance::Remote);
        assert_eq!(d.action, Action::Hold);
        assert!(d.reasoning.contains("below minimum"));
    }
}
