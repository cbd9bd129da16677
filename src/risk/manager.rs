// =============================================================================
// Risk Manager — position plans and trade validation
// =============================================================================
//
// `plan_position` turns an action + confidence into a bounded PositionPlan.
// `check_trade_allowed` then validates the plan, in order:
//
//   1. asset is in the profile's permitted universe
//   2. asset's volatility class does not exceed the profile level
//   3. every indicator the decision relied on is valid and not stale
//   4. remote decisions meet the profile's confidence floor     (*)
//   5. no circuit breaker has tripped                           (*)
//   6. size does not exceed the per-trade limit
//   7. projected aggregate exposure stays within the profile budget (*)
//
// (*) applies only to trades that grow exposure; reductions always pass.
//
// A rejection is a value.  `assess` degrades a rejected action to hold and
// attaches the reason; nothing here returns an error to the caller.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::classification::classify;
use super::profile::RiskProfile;
use super::sizing::{position_size, SizingInputs};
use super::stop_loss::{stop_loss, take_profit, TrailUpdate, TrailingStopState};
use crate::indicators::{IndicatorName, IndicatorSet};
use crate::portfolio::PortfolioState;
use crate::types::{Action, Provenance, RiskLevel};

/// Slack for float comparisons against budget limits.
const LIMIT_EPSILON: f64 = 1e-9;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionPlan {
    /// Fraction of portfolio value.
    pub size: f64,
    pub stop_loss: f64,
    pub trailing: bool,
    #[serde(default)]
    pub take_profit: Option<f64>,
}

impl PositionPlan {
    /// Zero-size plan carried by hold decisions.
    pub fn flat(profile: &RiskProfile) -> Self {
        Self {
            size: 0.0,
            stop_loss: profile.base_stop_loss,
            trailing: false,
            take_profit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RejectionReason {
    NotInUniverse,
    VolatilityClass { class: RiskLevel, level: RiskLevel },
    InvalidIndicators { names: Vec<IndicatorName> },
    StaleData { age_secs: i64, max_age_secs: i64 },
    ExceedsPerTradeLimit { size: f64, limit: f64 },
    ExceedsAggregateBudget { projected: f64, limit: f64 },
    LowConfidence { confidence: f64, min: f64 },
    DailyLossLimit { loss: f64, limit: f64 },
    ConsecutiveLosses { count: u32, limit: u32 },
    DailyTradeLimit { count: u32, limit: u32 },
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInUniverse => write!(f, "asset not in permitted universe"),
            Self::VolatilityClass { class, level } => {
                write!(f, "asset volatility class {class} exceeds {level} profile")
            }
            Self::InvalidIndicators { names } => {
                let names: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
                write!(f, "required indicator invalid or stale: {}", names.join(", "))
            }
            Self::StaleData { age_secs, max_age_secs } => write!(
                f,
                "required indicator invalid or stale: data is {age_secs}s old (max {max_age_secs}s)"
            ),
            Self::ExceedsPerTradeLimit { .. } => write!(f, "exceeds per-trade limit"),
            Self::ExceedsAggregateBudget { .. } => write!(f, "exceeds aggregate risk budget"),
            Self::LowConfidence { confidence, min } => {
                write!(f, "confidence {confidence:.2} below minimum {min:.2}")
            }
            Self::DailyLossLimit { .. } => write!(f, "daily loss limit reached"),
            Self::ConsecutiveLosses { count, .. } => write!(f, "{count} consecutive losses"),
            Self::DailyTradeLimit { .. } => write!(f, "daily trade limit reached"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum TradeCheck {
    Allowed,
    Rejected { reason: RejectionReason },
}

impl TradeCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn rejection(&self) -> Option<&RejectionReason> {
        match self {
            Self::Allowed => None,
            Self::Rejected { reason } => Some(reason),
        }
    }
}

/// A concrete trade put up for validation.
#[derive(Debug, Clone, Copy)]
pub struct TradeProposal<'a> {
    pub asset: &'a str,
    pub action: Action,
    pub plan: &'a PositionPlan,
    pub indicators: &'a IndicatorSet,
    /// Indicators the proposing stage relied on.
    pub required: &'a [IndicatorName],
    pub confidence: f64,
    pub provenance: Provenance,
}

/// Final, risk-checked action and plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskOutcome {
    pub action: Action,
    pub plan: PositionPlan,
    pub rejection: Option<RejectionReason>,
}

// =============================================================================
// RiskManager
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct RiskManager;

impl RiskManager {
    pub fn new() -> Self {
        Self
    }

    /// Realized / historical volatility, when both are valid.
    pub fn volatility_ratio(indicators: &IndicatorSet) -> Option<f64> {
        let realized = indicators.get(IndicatorName::RealizedVolatility)?;
        let historical = indicators.get(IndicatorName::HistoricalVolatility)?;
        (historical > 0.0).then(|| realized / historical)
    }

    /// Size, stop and take-profit for `action`.  Hold yields a flat plan.
    pub fn plan_position(
        &self,
        asset: &str,
        action: Action,
        confidence: f64,
        indicators: &IndicatorSet,
        profile: &RiskProfile,
        portfolio: &PortfolioState,
    ) -> PositionPlan {
        if action == Action::Hold {
            return PositionPlan::flat(profile);
        }

        let ratio = Self::volatility_ratio(indicators);
        let sizing = position_size(
            profile,
            &SizingInputs {
                confidence,
                volatility_ratio: ratio,
                correlation: portfolio.correlation(asset),
            },
            &portfolio.stats,
        );
        let stop = stop_loss(profile, ratio);

        debug!(
            asset,
            action = %action,
            base = format!("{:.4}", sizing.base),
            vol_factor = format!("{:.3}", sizing.volatility_factor),
            corr_factor = format!("{:.3}", sizing.correlation_factor),
            kelly = format!("{:.4}", sizing.kelly),
            size = format!("{:.4}", sizing.size),
            stop = format!("{:.4}", stop),
            "position planned"
        );

        PositionPlan {
            size: sizing.size,
            stop_loss: stop,
            trailing: profile.trailing.is_some(),
            take_profit: Some(take_profit(profile, stop)),
        }
    }

    pub fn check_trade_allowed(
        &self,
        proposal: &TradeProposal<'_>,
        profile: &RiskProfile,
        portfolio: &PortfolioState,
        now: DateTime<Utc>,
    ) -> TradeCheck {
        if proposal.action == Action::Hold {
            return TradeCheck::Allowed;
        }

        let reject = |reason: RejectionReason| {
            warn!(asset = proposal.asset, action = %proposal.action, reason = %reason, "trade rejected");
            TradeCheck::Rejected { reason }
        };

        if !profile.permits(proposal.asset) {
            return reject(RejectionReason::NotInUniverse);
        }

        if profile.volatility_screen {
            if let Some(class) = classify(proposal.indicators) {
                if class > profile.level {
                    return reject(RejectionReason::VolatilityClass {
                        class,
                        level: profile.level,
                    });
                }
            }
        }

        let missing = proposal.indicators.missing(proposal.required);
        if !missing.is_empty() {
            return reject(RejectionReason::InvalidIndicators { names: missing });
        }

        let age = proposal.indicators.age_secs(now);
        if age > profile.max_data_age_secs {
            return reject(RejectionReason::StaleData {
                age_secs: age,
                max_age_secs: profile.max_data_age_secs,
            });
        }

        let size = proposal.plan.size;
        let current = portfolio.aggregate_exposure();
        let projected = portfolio.projected_exposure(proposal.asset, proposal.action.sign() * size);
        let grows = !size.is_finite() || projected > current + LIMIT_EPSILON;

        if grows {
            let min = profile.breakers.min_remote_confidence;
            if proposal.provenance == Provenance::Remote && proposal.confidence < min {
                return reject(RejectionReason::LowConfidence {
                    confidence: proposal.confidence,
                    min,
                });
            }
            if let Some(reason) = portfolio.breaker.trip(&profile.breakers, now) {
                return reject(reason);
            }
        }

        if !size.is_finite() || size > profile.max_position_size + LIMIT_EPSILON {
            return reject(RejectionReason::ExceedsPerTradeLimit {
                size,
                limit: profile.max_position_size,
            });
        }

        if grows && projected > profile.max_aggregate_risk + LIMIT_EPSILON {
            return reject(RejectionReason::ExceedsAggregateBudget {
                projected,
                limit: profile.max_aggregate_risk,
            });
        }

        TradeCheck::Allowed
    }

    /// Validate a plan and degrade the action to hold on rejection.
    pub fn assess(
        &self,
        proposal: &TradeProposal<'_>,
        profile: &RiskProfile,
        portfolio: &PortfolioState,
        now: DateTime<Utc>,
    ) -> RiskOutcome {
        match self.check_trade_allowed(proposal, profile, portfolio, now) {
            TradeCheck::Allowed => RiskOutcome {
                action: proposal.action,
                plan: *proposal.plan,
                rejection: None,
            },
            TradeCheck::Rejected { reason } => RiskOutcome {
                action: Action::Hold,
                plan: PositionPlan::flat(profile),
                rejection: Some(reason),
            },
        }
    }

    /// Advance an open position's trailing stop.
    pub fn update_trailing_stop(&self, state: &mut TrailingStopState, price: f64) -> TrailUpdate {
        state.update(price)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::Holding;
    use crate::types::RiskLevel;

    fn indicators(now: DateTime<Utc>, realized: f64, historical: f64) -> IndicatorSet {
        IndicatorSet::from_values(
            [
                (IndicatorName::Rsi, 45.0),
                (IndicatorName::RealizedVolatility, realized),
                (IndicatorName::HistoricalVolatility, historical),
            ],
            100.0,
            now,
            200,
        )
    }

    fn plan(size: f64) -> PositionPlan {
        PositionPlan {
            size,
            stop_loss: 0.04,
            trailing: false,
            take_profit: Some(0.06),
        }
    }

    fn holding(exposure: f64) -> Holding {
        Holding {
            exposure,
            entry_price: 100.0,
            trailing: None,
        }
    }

    // ---- plan_position ---------------------------------------------------

    #[test]
    fn plans_respect_profile_bounds() {
        let now = Utc::now();
        let portfolio = PortfolioState::new(10_000.0);
        for level in RiskLevel::ALL {
            let profile = RiskProfile::for_level(level);
            for (realized, historical) in [(0.01, 0.02), (0.02, 0.02), (0.08, 0.02)] {
                for action in [Action::Buy, Action::Sell] {
                    let p = RiskManager.plan_position(
                        "BTC",
                        action,
                        0.9,
                        &indicators(now, realized, historical),
                        &profile,
                        &portfolio,
                    );
                    assert!(p.size >= 0.0 && p.size <= profile.max_position_size);
                    assert!(p.stop_loss > 0.0 && p.stop_loss <= profile.max_stop_loss_bound);
                    assert!(p.take_profit.unwrap() > p.stop_loss);
                    assert_eq!(p.trailing, level == RiskLevel::High);
                }
            }
        }
    }

    #[test]
    fn hold_plans_are_flat() {
        let now = Utc::now();
        let profile = RiskProfile::for_level(RiskLevel::Medium);
        let p = RiskManager.plan_position(
            "BTC",
            Action::Hold,
            1.0,
            &indicators(now, 0.01, 0.02),
            &profile,
            &PortfolioState::new(1.0),
        );
        assert_eq!(p.size, 0.0);
        assert!(p.stop_loss > 0.0);
    }

    // ---- check_trade_allowed ---------------------------------------------

    #[test]
    fn aggregate_budget_breach_is_rejected_and_degraded() {
        let now = Utc::now();
        let profile = RiskProfile::for_level(RiskLevel::Low);
        let mut portfolio = PortfolioState::new(10_000.0);
        for asset in ["ETH", "SOL", "ADA", "DOT", "XRP"] {
            portfolio.holdings.insert(asset.into(), holding(0.02));
        }
        let set = indicators(now, 0.01, 0.02);
        let p = plan(0.02);
        let proposal = TradeProposal {
            asset: "BTC",
            action: Action::Buy,
            plan: &p,
            indicators: &set,
            required: &[IndicatorName::Rsi],
            confidence: 0.8,
            provenance: Provenance::Quant,
        };

        let check = RiskManager.check_trade_allowed(&proposal, &profile, &portfolio, now);
        assert_eq!(check.rejection().unwrap().to_string(), "exceeds aggregate risk budget");

        let outcome = RiskManager.assess(&proposal, &profile, &portfolio, now);
        assert_eq!(outcome.action, Action::Hold);
        assert_eq!(outcome.plan.size, 0.0);
        assert!(outcome.rejection.is_some());
    }

    #[test]
    fn sell_against_long_reduces_exposure() {
        let now = Utc::now();
        let profile = RiskProfile::for_level(RiskLevel::Low);
        let mut portfolio = PortfolioState::new(10_000.0);
        for asset in ["BTC", "ETH", "SOL", "ADA", "DOT"] {
            portfolio.holdings.insert(asset.into(), holding(0.02));
        }
        let set = indicators(now, 0.01, 0.02);
        let p = plan(0.02);
        let mut proposal = TradeProposal {
            asset: "BTC",
            action: Action::Sell,
            plan: &p,
            indicators: &set,
            required: &[],
            confidence: 0.8,
            provenance: Provenance::Quant,
        };
        assert!(RiskManager.check_trade_allowed(&proposal, &profile, &portfolio, now).is_allowed());

        proposal.action = Action::Buy;
        assert!(!RiskManager.check_trade_allowed(&proposal, &profile, &portfolio, now).is_allowed());
    }

    #[test]
    fn per_trade_limit() {
        let now = Utc::now();
        let profile = RiskProfile::for_level(RiskLevel::Low);
        let set = indicators(now, 0.01, 0.02);
        let p = plan(0.03);
        let proposal = TradeProposal {
            asset: "BTC",
            action: Action::Buy,
            plan: &p,
            indicators: &set,
            required: &[],
            confidence: 0.8,
            provenance: Provenance::Quant,
        };
        let check = RiskManager.check_trade_allowed(&proposal, &profile, &PortfolioState::new(1.0), now);
        assert_eq!(check.rejection().unwrap().to_string(), "exceeds per-trade limit");
    }

    #[test]
    fn universe_is_checked_first() {
        let now = Utc::now();
        let mut profile = RiskProfile::for_level(RiskLevel::Medium);
        profile.universe = vec!["ETH".into()];
        let set = indicators(now, 0.01, 0.02);
        let p = plan(1.0);
        let proposal = TradeProposal {
            asset: "BTC",
            action: Action::Buy,
            plan: &p,
            indicators: &set,
            required: &[IndicatorName::Hurst],
            confidence: 0.8,
            provenance: Provenance::Quant,
        };
        let check = RiskManager.check_trade_allowed(&proposal, &profile, &PortfolioState::new(1.0), now);
        assert_eq!(check.rejection(), Some(&RejectionReason::NotInUniverse));
    }

    #[test]
    fn invalid_required_indicator_is_rejected() {
        let now = Utc::now();
        let profile = RiskProfile::for_level(RiskLevel::Medium);
        let set = indicators(now, 0.01, 0.02);
        let p = plan(0.01);
        let proposal = TradeProposal {
            asset: "BTC",
            action: Action::Buy,
            plan: &p,
            indicators: &set,
            required: &[IndicatorName::Rsi, IndicatorName::Hurst],
            confidence: 0.8,
            provenance: Provenance::Quant,
        };
        let check = RiskManager.check_trade_allowed(&proposal, &profile, &PortfolioState::new(1.0), now);
        assert_eq!(
            check.rejection().unwrap().to_string(),
            "required indicator invalid or stale: hurst"
        );
    }

    #[test]
    fn stale_data_is_rejected() {
        let now = Utc::now();
        let profile = RiskProfile::for_level(RiskLevel::Medium);
        let set = indicators(now - chrono::Duration::hours(3), 0.01, 0.02);
        let p = plan(0.01);
        let proposal = TradeProposal {
            asset: "BTC",
            action: Action::Buy,
            plan: &p,
            indicators: &set,
            required: &[IndicatorName::Rsi],
            confidence: 0.8,
            provenance: Provenance::Quant,
        };
        let check = RiskManager.check_trade_allowed(&proposal, &profile, &PortfolioState::new(1.0), now);
        assert!(matches!(check.rejection(), Some(RejectionReason::StaleData { .. })));
    }

    #[test]
    fn hold_is_always_allowed() {
        let now = Utc::now();
        let mut profile = RiskProfile::for_level(RiskLevel::Low);
        profile.universe = vec!["ETH".into()];
        let set = indicators(now, 0.01, 0.02);
        let p = PositionPlan::flat(&profile);
        let proposal = TradeProposal {
            asset: "BTC",
            action: Action::Hold,
            plan: &p,
            indicators: &set,
            required: &[IndicatorName::Hurst],
            confidence: 0.8,
            provenance: Provenance::Quant,
        };
        assert!(RiskManager.check_trade_allowed(&proposal, &profile, &PortfolioState::new(1.0), now).is_allowed());
    }
    // ---- circuit breakers ------------------------------------------------

    #[test]
    fn tripped_breaker_blocks_growth_but_not_reduction() {
        let now = Utc::now();
        let profile = RiskProfile::for_level(RiskLevel::Low);
        let mut portfolio = PortfolioState::new(10_000.0);
        portfolio.holdings.insert("BTC".into(), holding(0.02));
        for _ in 0..3 {
            portfolio.breaker.record_outcome(now, -0.001);
        }
        let set = indicators(now, 0.01, 0.02);
        let p = plan(0.01);
        let mut proposal = TradeProposal {
            asset: "BTC",
            action: Action::Buy,
            plan: &p,
            indicators: &set,
            required: &[],
            confidence: 0.8,
            provenance: Provenance::Quant,
        };
        let check = RiskManager.check_trade_allowed(&proposal, &profile, &portfolio, now);
        assert_eq!(
            check.rejection(),
            Some(&RejectionReason::ConsecutiveLosses { count: 3, limit: 3 })
        );
        let outcome = RiskManager.assess(&proposal, &profile, &portfolio, now);
        assert_eq!(outcome.action, Action::Hold);

        proposal.action = Action::Sell;
        assert!(RiskManager.check_trade_allowed(&proposal, &profile, &portfolio, now).is_allowed());
    }

    #[test]
    fn daily_trade_limit_rejects_new_exposure() {
        let now = Utc::now();
        let profile = RiskProfile::for_level(RiskLevel::Low);
        let mut portfolio = PortfolioState::new(10_000.0);
        for _ in 0..profile.breakers.max_trades_per_day {
            portfolio.breaker.record_fill(now);
        }
        let set = indicators(now, 0.01, 0.02);
        let p = plan(0.01);
        let proposal = TradeProposal {
            asset: "ETH",
            action: Action::Sell,
            plan: &p,
            indicators: &set,
            required: &[],
            confidence: 0.8,
            provenance: Provenance::Quant,
        };
        let check = RiskManager.check_trade_allowed(&proposal, &profile, &portfolio, now);
        assert_eq!(check.rejection().unwrap().to_string(), "daily trade limit reached");

        let tomorrow = now + chrono::Duration::days(1);
        let fresh = indicators(tomorrow, 0.01, 0.02);
        let proposal = TradeProposal {
            indicators: &fresh,
            ..proposal
        };
        assert!(RiskManager.check_trade_allowed(&proposal, &profile, &portfolio, tomorrow).is_allowed());
    }

    #[test]
    fn daily_loss_limit_rejects_new_exposure() {
        let now = Utc::now();
        let profile = RiskProfile::for_level(RiskLevel::Medium);
        let mut portfolio = PortfolioState::new(10_000.0);
        portfolio.breaker.record_outcome(now, 0.01);
        portfolio.breaker.record_outcome(now, -0.07);
        let set = indicators(now, 0.01, 0.02);
        let p = plan(0.01);
        let proposal = TradeProposal {
            asset: "BTC",
            action: Action::Buy,
            plan: &p,
            indicators: &set,
            required: &[],
            confidence: 0.8,
            provenance: Provenance::Quant,
        };
        let check = RiskManager.check_trade_allowed(&proposal, &profile, &portfolio, now);
        assert!(matches!(check.rejection(), Some(RejectionReason::DailyLossLimit { .. })));
    }

    #[test]
    fn remote_confidence_floor() {
        let now = Utc::now();
        let profile = RiskProfile::for_level(RiskLevel::Low);
        let set = indicators(now, 0.01, 0.02);
        let p = plan(0.01);
        let mut proposal = TradeProposal {
            asset: "BTC",
            action: Action::Buy,
            plan: &p,
            indicators: &set,
            required: &[],
            confidence: 0.6,
            provenance: Provenance::Remote,
        };
        let portfolio = PortfolioState::new(1.0);
        let check = RiskManager.check_trade_allowed(&proposal, &profile, &portfolio, now);
        assert_eq!(
            check.rejection(),
            Some(&RejectionReason::LowConfidence { confidence: 0.6, min: 0.7 })
        );

        proposal.provenance = Provenance::Quant;
        assert!(RiskManager.check_trade_allowed(&proposal, &profile, &portfolio, now).is_allowed());
        proposal.provenance = Provenance::Remote;
        proposal.confidence = 0.7;
        assert!(RiskManager.check_trade_allowed(&proposal, &profile, &portfolio, now).is_allowed());
    }

    // ---- volatility screen -----------------------------------------------

    #[test]
    fn volatile_asset_is_rejected_below_its_class() {
        let now = Utc::now();
        let set = IndicatorSet::from_values(
            [
                (IndicatorName::RealizedVolatility, 0.06),
                (IndicatorName::AtrPercent, 5.0),
            ],
            100.0,
            now,
            200,
        );
        let p = plan(0.01);
        let proposal = TradeProposal {
            asset: "DOGE",
            action: Action::Buy,
            plan: &p,
            indicators: &set,
            required: &[],
            confidence: 0.8,
            provenance: Provenance::Quant,
        };
        let portfolio = PortfolioState::new(1.0);

        let low = RiskProfile::for_level(RiskLevel::Low);
        assert_eq!(
            RiskManager.check_trade_allowed(&proposal, &low, &portfolio, now).rejection(),
            Some(&RejectionReason::VolatilityClass {
                class: RiskLevel::High,
                level: RiskLevel::Low
            })
        );
        let high = RiskProfile::for_level(RiskLevel::High);
        assert!(RiskManager.check_trade_allowed(&proposal, &high, &portfolio, now).is_allowed());

        let mut unscreened = low.clone();
        unscreened.volatility_screen = false;
        assert!(RiskManager.check_trade_allowed(&proposal, &unscreened, &portfolio, now).is_allowed());
    }
}
