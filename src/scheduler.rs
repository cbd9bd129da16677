// =============================================================================
// Cycle Scheduler — periodic evaluation of every configured asset
// =============================================================================
//
// Each tick advances a monotonically increasing cycle epoch published on a
// `watch` channel.  Every evaluation carries a `CycleToken` for the epoch it
// started in; once a newer cycle begins the token reports itself superseded,
// in-flight remote calls are abandoned and the stale decisions are discarded
// instead of being applied.
//
// Per cycle:
//   1. build the cycle's own risk book from a portfolio gateway snapshot
//      (snapshot failure → skip the cycle)
//   2. fetch bars and validate them into a PriceSeries (malformed → skip)
//   3. evaluate all assets concurrently through the orchestrator
//   4. apply and journal each decision, unless the cycle was superseded
// =============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::journal::DecisionJournal;
use crate::market_data::{MarketDataSource, PriceSeries};
use crate::orchestrator::{Decision, DecisionOrchestrator};
use crate::portfolio::{PortfolioGateway, RiskBook};
use crate::risk::RiskProfile;

// =============================================================================
// Cycle tokens
// =============================================================================

/// Handle tying an evaluation to the cycle it started in.
#[derive(Debug, Clone)]
pub struct CycleToken {
    epoch: u64,
    rx: watch::Receiver<u64>,
}

impl CycleToken {
    /// A token that is never superseded.
    pub fn detached() -> Self {
        let (_tx, rx) = watch::channel(0);
        Self { epoch: 0, rx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_superseded(&self) -> bool {
        *self.rx.borrow() != self.epoch
    }

    /// Resolves once a newer cycle has started.  Never resolves if the clock
    /// is gone.
    pub async fn superseded(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() != self.epoch {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Publishes the current cycle epoch.
#[derive(Debug)]
pub struct CycleClock {
    tx: watch::Sender<u64>,
}

impl Default for CycleClock {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleClock {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Start a new cycle, superseding every earlier token.
    pub fn advance(&self) -> CycleToken {
        let epoch = self.current() + 1;
        self.tx.send_replace(epoch);
        CycleToken {
            epoch,
            rx: self.tx.subscribe(),
        }
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Outcome counters for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub epoch: u64,
    /// Decisions applied and journaled.
    pub decided: usize,
    /// Assets with no usable series this cycle.
    pub skipped: usize,
    /// Decisions dropped because a newer cycle had started.
    pub discarded: usize,
}

pub struct CycleScheduler {
    assets: Vec<String>,
    interval: Duration,
    profile: RiskProfile,
    orchestrator: Arc<DecisionOrchestrator>,
    source: Arc<dyn MarketDataSource>,
    gateway: Arc<dyn PortfolioGateway>,
    journal: Arc<DecisionJournal>,
    clock: CycleClock,
}

impl CycleScheduler {
    pub fn new(
        assets: Vec<String>,
        interval: Duration,
        profile: RiskProfile,
        orchestrator: Arc<DecisionOrchestrator>,
        source: Arc<dyn MarketDataSource>,
        gateway: Arc<dyn PortfolioGateway>,
        journal: Arc<DecisionJournal>,
    ) -> Self {
        Self {
            assets,
            interval,
            profile,
            orchestrator,
            source,
            gateway,
            journal,
            clock: CycleClock::new(),
        }
    }

    pub fn clock(&self) -> &CycleClock {
        &self.clock
    }

    pub fn journal(&self) -> &DecisionJournal {
        &self.journal
    }

    /// Tick until `shutdown` resolves.  Each cycle runs on its own task so a
    /// slow cycle is superseded by the next tick rather than delaying it.
    pub async fn run(self: Arc<Self>, shutdown: impl Future<Output = ()>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            assets = ?self.assets,
            interval_secs = self.interval.as_secs(),
            risk_level = %self.profile.level,
            "cycle scheduler started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    let token = self.clock.advance();
                    let scheduler = Arc::clone(&self);
                    tokio::spawn(async move {
                        let report = scheduler.run_cycle(token).await;
                        info!(
                            cycle = report.epoch,
                            decided = report.decided,
                            skipped = report.skipped,
                            discarded = report.discarded,
                            "cycle complete"
                        );
                    });
                }
            }
        }

        // Supersede whatever is still in flight.
        self.clock.advance();
        info!(stats = ?self.journal.stats(), "cycle scheduler stopped");
    }

    /// Evaluate every asset once under `token`.
    pub async fn run_cycle(&self, token: CycleToken) -> CycleReport {
        let mut report = CycleReport {
            epoch: token.epoch(),
            ..CycleReport::default()
        };

        // Reservations and trailing updates stay inside this cycle's book, so
        // a superseded cycle finishing late cannot touch a newer one.
        let book = match self.gateway.snapshot().await {
            Ok(state) => RiskBook::new(state),
            Err(e) => {
                warn!(cycle = token.epoch(), error = %e, "portfolio snapshot failed, skipping cycle");
                report.skipped = self.assets.len();
                return report;
            }
        };
        let now = Utc::now();

        let evaluations = self
            .assets
            .iter()
            .map(|asset| self.evaluate_asset(asset, &book, &token, now));
        let decisions: Vec<Option<Decision>> = join_all(evaluations).await;

        for decision in decisions {
            let Some(decision) = decision else {
                report.skipped += 1;
                continue;
            };
            if token.is_superseded() {
                debug!(asset = %decision.asset, cycle = token.epoch(), "discarding decision from superseded cycle");
                report.discarded += 1;
                continue;
            }
            if let Err(e) = self.gateway.apply(&decision).await {
                error!(asset = %decision.asset, error = %e, "failed to apply decision");
            }
            self.journal.record(decision);
            report.decided += 1;
        }

        if report.discarded > 0 {
            warn!(cycle = token.epoch(), discarded = report.discarded, "cycle superseded before completion");
        }
        report
    }

    async fn evaluate_asset(
        &self,
        asset: &str,
        book: &RiskBook,
        token: &CycleToken,
        now: DateTime<Utc>,
    ) -> Option<Decision> {
        let bars = match self.source.fetch_bars(asset).await {
            Ok(bars) => bars,
            Err(e) => {
                warn!(asset, error = %e, "market data unavailable, skipping asset");
                return None;
            }
        };

        let series = match PriceSeries::new(bars) {
            Ok(series) => series,
            Err(e) => {
                warn!(asset, error = %e, "malformed price series, skipping asset");
                return None;
            }
        };

        let decision = self
            .orchestrator
            .evaluate(asset, &series, &self.profile, book, token, now)
            .await;
        Some(decision)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};

    use parking_lot::Mutex;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    use crate::indicators::{detect_backend, IndicatorEngine};
    use crate::market_data::{fixtures, PriceBar};
    use crate::portfolio::PaperPortfolio;
    use crate::regime::RegimeDetector;
    use crate::remote::testing::ScriptedRemote;
    use crate::remote::{RemoteInvoker, RetryPolicy};
    use crate::signals::SignalGenerator;
    use crate::types::{Action, Provenance, RiskLevel};

    struct FixtureSource {
        bars: HashMap<String, Vec<PriceBar>>,
        /// Per-fetch latencies, consumed in call order.
        delays: Mutex<VecDeque<Duration>>,
    }

    impl FixtureSource {
        fn new(bars: HashMap<String, Vec<PriceBar>>) -> Self {
            Self {
                bars,
                delays: Mutex::new(VecDeque::new()),
            }
        }

        fn with_delays(self, millis: &[u64]) -> Self {
            *self.delays.lock() = millis.iter().map(|ms| Duration::from_millis(*ms)).collect();
            self
        }
    }

    #[async_trait]
    impl MarketDataSource for FixtureSource {
        async fn fetch_bars(&self, asset: &str) -> anyhow::Result<Vec<PriceBar>> {
            let delay = self.delays.lock().pop_front();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.bars
                .get(asset)
                .cloned()
                .ok_or_else(|| anyhow!("no bars for {asset}"))
        }
    }

    fn fixture_bars() -> HashMap<String, Vec<PriceBar>> {
        let now = Utc::now();
        let mut bars = HashMap::new();
        bars.insert("BTC".to_string(), fixtures::uptrend(200, now).bars().to_vec());
        bars.insert("ETH".to_string(), fixtures::random_walk(200, 11, now).bars().to_vec());

        let mut reversed = fixtures::bars_from_closes(&fixtures::random_walk_closes(50, 3), now);
        reversed.reverse();
        bars.insert("BAD".to_string(), reversed);
        bars
    }

    fn scheduler(
        assets: &[&str],
        remote: Option<Arc<ScriptedRemote>>,
        portfolio: Arc<PaperPortfolio>,
    ) -> CycleScheduler {
        let invoker = remote.map(|r| {
            let policy = RetryPolicy {
                timeout: Duration::from_secs(10),
                max_retries: 0,
                backoff_base: Duration::from_millis(5),
            };
            Arc::new(RemoteInvoker::new(r, policy, 2))
        });
        let orchestrator = DecisionOrchestrator::new(
            IndicatorEngine::new(detect_backend()),
            RegimeDetector::default(),
            SignalGenerator::default(),
            invoker,
        );
        CycleScheduler::new(
            assets.iter().map(|a| a.to_string()).collect(),
            Duration::from_millis(20),
            RiskProfile::for_level(RiskLevel::Low),
            Arc::new(orchestrator),
            Arc::new(FixtureSource::new(fixture_bars())),
            portfolio,
            Arc::new(DecisionJournal::default()),
        )
    }

    // ---- tokens ------------------------------------------------------------

    #[tokio::test]
    async fn advancing_the_clock_supersedes_older_tokens() {
        let clock = CycleClock::new();
        let first = clock.advance();
        assert!(!first.is_superseded());

        let second = clock.advance();
        assert!(first.is_superseded());
        assert!(!second.is_superseded());
        assert_eq!(second.epoch(), first.epoch() + 1);

        tokio::time::timeout(Duration::from_millis(100), first.superseded())
            .await
            .unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(20), second.superseded())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn detached_token_is_never_superseded() {
        let token = CycleToken::detached();
        assert!(!token.is_superseded());
        assert!(tokio::time::timeout(Duration::from_millis(20), token.superseded())
            .await
            .is_err());
    }

    // ---- run_cycle ---------------------------------------------------------

    #[tokio::test]
    async fn cycle_decides_every_valid_asset_and_skips_the_rest() {
        let portfolio = Arc::new(PaperPortfolio::new(10_000.0, None));
        let s = scheduler(&["BTC", "ETH", "BAD", "MISSING"], None, portfolio.clone());

        let token = s.clock().advance();
        let report = s.run_cycle(token).await;

        assert_eq!(report.decided, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.discarded, 0);
        assert_eq!(s.journal().len(), 2);

        let btc = s.journal().latest_for("BTC").unwrap();
        assert_eq!(btc.cycle, report.epoch);
        assert_ne!(btc.provenance, Provenance::Remote);
        if btc.action == Action::Buy {
            assert!((portfolio.state().exposure("BTC") - btc.plan.size).abs() < 1e-12);
        }
    }

    #[tokio::test]
    async fn superseded_cycle_applies_nothing() {
        let portfolio = Arc::new(PaperPortfolio::new(10_000.0, None));
        let remote = Arc::new(ScriptedRemote::hanging());
        let s = Arc::new(scheduler(&["BTC", "ETH"], Some(remote), portfolio.clone()));

        let token = s.clock().advance();
        let superseder = {
            let s = Arc::clone(&s);
            async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                s.clock().advance();
            }
        };
        let (report, _) = tokio::join!(s.run_cycle(token), superseder);

        assert_eq!(report.decided, 0);
        assert_eq!(report.discarded, 2);
        assert!(s.journal().is_empty());
        assert!(portfolio.state().holdings.is_empty());
    }

    #[tokio::test]
    async fn late_superseded_cycle_does_not_leak_into_the_next() {
        let portfolio = Arc::new(PaperPortfolio::new(10_000.0, None));
        let mut s = scheduler(&["BTC"], None, portfolio.clone());
        s.profile.breakers.max_trades_per_day = 1;
        // The old cycle's fetch returns at ~40ms, after the new cycle has
        // taken its snapshot but before the new cycle evaluates at ~80ms.
        s.source = Arc::new(FixtureSource::new(fixture_bars()).with_delays(&[40, 70]));
        let s = Arc::new(s);

        let old = s.clock().advance();
        let old_cycle = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.run_cycle(old).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let report = s.run_cycle(s.clock().advance()).await;
        let old_report = old_cycle.await.unwrap();

        assert_eq!(old_report.discarded, 1);
        assert_eq!(report.decided, 1);
        let d = s.journal().latest_for("BTC").unwrap();
        assert_eq!(d.cycle, report.epoch);
        assert_eq!(d.action, Action::Buy);
        assert_eq!(d.rejection, None);
        assert!((portfolio.state().exposure("BTC") - d.plan.size).abs() < 1e-12);
        assert_eq!(portfolio.state().breaker.trades_today, 1);
    }

    #[tokio::test]
    async fn failed_snapshot_skips_the_cycle() {
        struct Offline;

        #[async_trait]
        impl PortfolioGateway for Offline {
            async fn snapshot(&self) -> anyhow::Result<crate::portfolio::PortfolioState> {
                Err(anyhow!("portfolio service offline"))
            }

            async fn apply(&self, _decision: &Decision) -> anyhow::Result<()> {
                Err(anyhow!("portfolio service offline"))
            }
        }

        let mut s = scheduler(&["BTC", "ETH"], None, Arc::new(PaperPortfolio::new(10_000.0, None)));
        s.gateway = Arc::new(Offline);
        let report = s.run_cycle(s.clock().advance()).await;
        assert_eq!(report.skipped, 2);
        assert_eq!(report.decided, 0);
        assert!(s.journal().is_empty());
    }

    #[tokio::test]
    async fn stale_bars_are_evaluated_but_never_traded() {
        let stale_end = Utc::now() - ChronoDuration::hours(6);
        let mut bars = HashMap::new();
        bars.insert("BTC".to_string(), fixtures::uptrend(200, stale_end).bars().to_vec());

        let portfolio = Arc::new(PaperPortfolio::new(10_000.0, None));
        let mut s = scheduler(&["BTC"], None, portfolio.clone());
        s.source = Arc::new(FixtureSource::new(bars));

        let report = s.run_cycle(s.clock().advance()).await;
        assert_eq!(report.decided, 1);
        let d = s.journal().latest_for("BTC").unwrap();
        assert_eq!(d.action, Action::Hold);
        assert!(portfolio.state().holdings.is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let portfolio = Arc::new(PaperPortfolio::new(10_000.0, None));
        let s = Arc::new(scheduler(&["BTC"], None, portfolio));
        let shutdown = tokio::time::sleep(Duration::from_millis(70));

        tokio::time::timeout(Duration::from_secs(5), Arc::clone(&s).run(shutdown))
            .await
            .unwrap();
        assert!(s.clock().current() >= 2);
    }
}
