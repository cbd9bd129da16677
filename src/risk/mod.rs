// =============================================================================
// Risk Module
// =============================================================================
//
// Immutable risk profiles, position sizing, stop-loss placement, circuit
// breakers, and the validation that keeps every trade inside the per-trade
// and aggregate budgets.

pub mod breaker;
pub mod classification;
pub mod manager;
pub mod profile;
pub mod sizing;
pub mod stop_loss;

pub use manager::{PositionPlan, RejectionReason, RiskManager, RiskOutcome, TradeProposal};
pub use profile::{RiskOverrides, RiskProfile, TrailingConfig};
pub use stop_loss::{TrailUpdate, TrailingStopState};
