// =============================================================================
// Circuit Breakers
// =============================================================================
//
//   breaker              low      medium   high
//   daily loss limit     2 %      5 %      10 %     (realized, of portfolio)
//   consecutive losses   3        5        7
//   trades per day       10       25       50
//   min remote conf.     0.70     0.50     0.30
//
// Counters live in the portfolio snapshot and are fed by reported fills and
// closed-trade outcomes.  They reset when the UTC date rolls over; counters
// from an earlier day read as zero even before the next fill resets them.
//
// A tripped breaker blocks trades that grow exposure.  Reductions still pass.
// =============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::manager::RejectionReason;
use crate::types::RiskLevel;

/// Per-profile breaker limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakerLimits {
    /// Realized loss for the day, fraction of portfolio value.
    pub max_daily_loss: f64,
    pub max_consecutive_losses: u32,
    pub max_trades_per_day: u32,
    /// Floor on the self-reported confidence of remote decisions.
    pub min_remote_confidence: f64,
}

impl BreakerLimits {
    pub fn for_level(level: RiskLevel) -> Self {
        let (loss, streak, trades, confidence) = match level {
            RiskLevel::Low => (0.02, 3, 10, 0.70),
            RiskLevel::Medium => (0.05, 5, 25, 0.50),
            RiskLevel::High => (0.10, 7, 50, 0.30),
        };
        Self {
            max_daily_loss: loss,
            max_consecutive_losses: streak,
            max_trades_per_day: trades,
            min_remote_confidence: confidence,
        }
    }
}

/// Daily breaker counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakerState {
    /// UTC date the counters belong to.
    pub day: Option<NaiveDate>,
    pub trades_today: u32,
    /// Realized P&L today, fraction of portfolio value.
    pub realized_today: f64,
    pub consecutive_losses: u32,
}

impl BreakerState {
    fn roll(&mut self, at: DateTime<Utc>) {
        let today = at.date_naive();
        if self.day == Some(today) {
            return;
        }
        if let Some(previous) = self.day {
            info!(
                old_date = %previous,
                new_date = %today,
                trades = self.trades_today,
                realized = format!("{:.4}", self.realized_today),
                "date rolled, resetting breaker counters"
            );
        }
        *self = Self {
            day: Some(today),
            ..Self::default()
        };
    }

    /// Count one executed trade.
    pub fn record_fill(&mut self, at: DateTime<Utc>) {
        self.roll(at);
        self.trades_today += 1;
    }

    /// Fold in the P&L (fraction of portfolio value) of a closed position.
    pub fn record_outcome(&mut self, at: DateTime<Utc>, pnl: f64) {
        if !pnl.is_finite() {
            return;
        }
        self.roll(at);
        self.realized_today += pnl;
        if pnl < 0.0 {
            self.consecutive_losses += 1;
        } else {
            self.consecutive_losses = 0;
        }
    }

    /// Counters as they stand at `now`.
    pub fn current(&self, now: DateTime<Utc>) -> Self {
        let mut state = self.clone();
        state.roll(now);
        state
    }

    /// First tripped breaker, checked in order: daily loss, loss streak,
    /// trade count.
    pub fn trip(&self, limits: &BreakerLimits, now: DateTime<Utc>) -> Option<RejectionReason> {
        let s = self.current(now);
        let loss = (-s.realized_today).max(0.0);
        if loss >= limits.max_daily_loss {
            return Some(RejectionReason::DailyLossLimit {
                loss,
                limit: limits.max_daily_loss,
            });
        }
        if s.consecutive_losses >= limits.max_consecutive_losses {
            return Some(RejectionReason::ConsecutiveLosses {
                count: s.consecutive_losses,
                limit: limits.max_consecutive_losses,
            });
        }
        if s.trades_today >= limits.max_trades_per_day {
            return Some(RejectionReason::DailyTradeLimit {
                count: s.trades_today,
                limit: limits.max_trades_per_day,
            });
        }
        None
    }
}
