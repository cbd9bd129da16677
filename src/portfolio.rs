// =============================================================================
// Portfolio — snapshot, serialised risk book and the paper gateway
// =============================================================================
//
// PortfolioState  — read-only snapshot handed to the risk manager: signed
//                   exposure per asset (fraction of portfolio value),
//                   correlation inputs, reported trade outcomes and the
//                   daily circuit-breaker counters.
// RiskBook        — per-portfolio lock around the snapshot.  The aggregate
//                   exposure check and the reservation it implies happen
//                   under one lock so concurrent assets cannot both spend the
//                   same budget.  A reservation also counts toward the
//                   daily trade limit.  Trailing-stop updates go through it
//                   too.  The scheduler builds one book per cycle.
// PortfolioGateway — the external collaborator that applies decisions and
//                   reports outcomes.  `PaperPortfolio` is the in-memory one.
// =============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::orchestrator::Decision;
use crate::risk::breaker::BreakerState;
use crate::risk::{RiskManager, RiskOutcome, RiskProfile, TradeProposal, TrailUpdate, TrailingConfig, TrailingStopState};
use crate::types::Action;

/// Exposures smaller than this are treated as flat.
const FLAT_EPSILON: f64 = 1e-9;

// =============================================================================
// Snapshot types
// =============================================================================

/// Realized trade outcomes reported back by the portfolio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeStats {
    pub wins: u32,
    pub losses: u32,
    /// Mean winning return (fraction, positive).
    pub avg_win: f64,
    /// Mean losing return (fraction, positive).
    pub avg_loss: f64,
}

impl OutcomeStats {
    pub fn closed_trades(&self) -> u32 {
        self.wins + self.losses
    }

    pub fn win_rate(&self) -> Option<f64> {
        let n = self.closed_trades();
        (n > 0).then(|| self.wins as f64 / n as f64)
    }

    /// Fold one closed trade's return into the running averages.
    pub fn record(&mut self, return_fraction: f64) {
        if !return_fraction.is_finite() {
            return;
        }
        if return_fraction > 0.0 {
            self.wins += 1;
            self.avg_win += (return_fraction - self.avg_win) / self.wins as f64;
        } else {
            self.losses += 1;
            self.avg_loss += (-return_fraction - self.avg_loss) / self.losses as f64;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    /// Signed fraction of portfolio value: positive long, negative short.
    pub exposure: f64,
    pub entry_price: f64,
    #[serde(default)]
    pub trailing: Option<TrailingStopState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub total_value: f64,
    #[serde(default)]
    pub holdings: BTreeMap<String, Holding>,
    /// Correlation of each asset with the existing holdings.
    #[serde(default)]
    pub correlations: BTreeMap<String, f64>,
    #[serde(default)]
    pub stats: OutcomeStats,
    #[serde(default)]
    pub breaker: BreakerState,
}

impl PortfolioState {
    pub fn new(total_value: f64) -> Self {
        Self {
            total_value,
            ..Self::default()
        }
    }

    pub fn exposure(&self, asset: &str) -> f64 {
        self.holdings.get(asset).map_or(0.0, |h| h.exposure)
    }

    /// Sum of absolute exposures across all holdings.
    pub fn aggregate_exposure(&self) -> f64 {
        self.holdings.values().map(|h| h.exposure.abs()).sum()
    }

    /// Aggregate exposure after adding `delta` to `asset`'s signed exposure.
    pub fn projected_exposure(&self, asset: &str, delta: f64) -> f64 {
        let current = self.exposure(asset);
        self.aggregate_exposure() - current.abs() + (current + delta).abs()
    }

    pub fn correlation(&self, asset: &str) -> f64 {
        self.correlations.get(asset).copied().unwrap_or(0.0)
    }

    /// Apply a signed exposure change at `price`, realising any closed part.
    /// Returns the realized return when a position was reduced or closed.
    pub fn apply_fill(
        &mut self,
        asset: &str,
        delta: f64,
        price: f64,
        trailing: Option<TrailingConfig>,
    ) -> Option<f64> {
        if delta.abs() < FLAT_EPSILON || !price.is_finite() || price <= 0.0 {
            return None;
        }

        let mut realized = None;
        let previous = self
            .holdings
            .remove(asset)
            .filter(|h| h.exposure.abs() >= FLAT_EPSILON);
        let old = previous.as_ref().map_or(0.0, |h| h.exposure);
        let new = old + delta;

        let mut next = match previous {
            Some(h) if old.signum() == delta.signum() => {
                // Adding to an existing position.
                let entry = (h.entry_price * old.abs() + price * delta.abs()) / new.abs();
                Holding {
                    exposure: new,
                    entry_price: entry,
                    trailing: h.trailing,
                }
            }
            Some(h) => {
                let ret = old.signum() * (price / h.entry_price - 1.0);
                self.stats.record(ret);
                realized = Some(ret);
                if new.abs() < FLAT_EPSILON {
                    return realized;
                }
                if new.signum() == old.signum() {
                    Holding { exposure: new, ..h }
                } else {
                    Holding {
                        exposure: new,
                        entry_price: price,
                        trailing: None,
                    }
                }
            }
            None => Holding {
                exposure: new,
                entry_price: price,
                trailing: None,
            },
        };

        if next.trailing.is_none() {
            next.trailing = trailing.map(|cfg| TrailingStopState::new(next.exposure > 0.0, next.entry_price, cfg));
        }
        self.holdings.insert(asset.to_string(), next);
        realized
    }

    /// `apply_fill` that also feeds the closed part's P&L, as a fraction of
    /// portfolio value, into the breaker counters.
    pub fn settle_fill(
        &mut self,
        asset: &str,
        delta: f64,
        price: f64,
        trailing: Option<TrailingConfig>,
        at: DateTime<Utc>,
    ) -> Option<f64> {
        let closed = self.exposure(asset).abs().min(delta.abs());
        let realized = self.apply_fill(asset, delta, price, trailing);
        if let Some(ret) = realized {
            self.breaker.record_outcome(at, ret * closed);
        }
        realized
    }

    /// Close `asset` entirely at `price`.
    pub fn close(&mut self, asset: &str, price: f64, at: DateTime<Utc>) -> Option<f64> {
        let exposure = self.exposure(asset);
        self.settle_fill(asset, -exposure, price, None, at)
    }
}

// =============================================================================
// RiskBook
// =============================================================================

/// Serialises risk checks and trailing-stop updates for one portfolio.
#[derive(Debug, Default)]
pub struct RiskBook {
    state: Mutex<PortfolioState>,
}

impl RiskBook {
    pub fn new(state: PortfolioState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> PortfolioState {
        self.state.lock().clone()
    }

    /// Check a proposal against the current book and, if allowed, reserve
    /// its exposure before releasing the lock.
    pub fn check_and_reserve(
        &self,
        manager: &RiskManager,
        proposal: &TradeProposal<'_>,
        profile: &RiskProfile,
        now: DateTime<Utc>,
    ) -> RiskOutcome {
        let mut state = self.state.lock();
        let outcome = manager.assess(proposal, profile, &state, now);
        if outcome.action != Action::Hold && outcome.plan.size > 0.0 {
            let delta = outcome.action.sign() * outcome.plan.size;
            let current = state.exposure(proposal.asset);
            let entry = state.holdings.entry(proposal.asset.to_string()).or_insert(Holding {
                exposure: 0.0,
                entry_price: proposal.indicators.last_close,
                trailing: None,
            });
            entry.exposure = current + delta;
            state.breaker.record_fill(now);
            debug!(
                asset = proposal.asset,
                reserved = format!("{:.4}", delta),
                aggregate = format!("{:.4}", state.aggregate_exposure()),
                "exposure reserved"
            );
        }
        outcome
    }

    /// Advance the trailing stop of an open position, if it has one.
    pub fn update_trailing(
        &self,
        manager: &RiskManager,
        asset: &str,
        price: f64,
    ) -> Option<(TrailingStopState, TrailUpdate)> {
        let mut state = self.state.lock();
        let trailing = state.holdings.get_mut(asset)?.trailing.as_mut()?;
        let update = manager.update_trailing_stop(trailing, price);
        Some((trailing.clone(), update))
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// External portfolio/execution collaborator.
#[async_trait]
pub trait PortfolioGateway: Send + Sync {
    async fn snapshot(&self) -> anyhow::Result<PortfolioState>;

    /// Apply a finalised decision.  The engine never mutates the portfolio
    /// any other way.
    async fn apply(&self, decision: &Decision) -> anyhow::Result<()>;
}

/// In-memory portfolio that fills every decision at its reference price.
pub struct PaperPortfolio {
    state: RwLock<PortfolioState>,
    trailing: Option<TrailingConfig>,
}

impl PaperPortfolio {
    pub fn new(total_value: f64, trailing: Option<TrailingConfig>) -> Self {
        Self {
            state: RwLock::new(PortfolioState::new(total_value)),
            trailing,
        }
    }

    pub fn set_correlation(&self, asset: &str, correlation: f64) {
        self.state.write().correlations.insert(asset.to_string(), correlation);
    }

    pub fn state(&self) -> PortfolioState {
        self.state.read().clone()
    }
}

#[async_trait]
impl PortfolioGateway for PaperPortfolio {
    async fn snapshot(&self) -> anyhow::Result<PortfolioState> {
        Ok(self.state())
    }

    async fn apply(&self, decision: &Decision) -> anyhow::Result<()> {
        let mut state = self.state.write();
        let asset = decision.asset.as_str();

        if let Some(trailing) = &decision.trailing_stop {
            if let Some(holding) = state.holdings.get_mut(asset) {
                holding.trailing = Some(trailing.clone());
            }
            let hit = trailing
                .stop_price
                .is_some_and(|stop| if trailing.is_long { decision.reference_price <= stop } else { decision.reference_price >= stop });
            if hit {
                let realized = state.close(asset, decision.reference_price, decision.timestamp);
                info!(
                    asset,
                    price = decision.reference_price,
                    realized = ?realized,
                    "paper position closed by trailing stop"
                );
            }
        }

        if decision.action == Action::Hold || decision.plan.size <= 0.0 {
            return Ok(());
        }

        let delta = decision.action.sign() * decision.plan.size;
        let trailing = if decision.plan.trailing { self.trailing } else { None };
        state.breaker.record_fill(decision.timestamp);
        let realized = state.settle_fill(asset, delta, decision.reference_price, trailing, decision.timestamp);
        info!(
            asset,
            action = %decision.action,
            size = format!("{:.4}", decision.plan.size),
            exposure = format!("{:.4}", state.exposure(asset)),
            realized = ?realized,
            trades_today = state.breaker.trades_today,
            loss_streak = state.breaker.consecutive_losses,
            "paper fill"
        );
        Ok(())
    }
}
