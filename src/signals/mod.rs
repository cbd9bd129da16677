// =============================================================================
// Signals Module
// =============================================================================
//
// Four normalised sub-signals (trend, momentum, mean-reversion, volatility)
// combined through a (regime, risk level) weight table into one directional
// `TradeSignal`.

pub mod generator;
pub mod weights;

pub use generator::{SignalComponent, SignalGenerator, TradeSignal};
pub use weights::WeightTable;
