// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator functions plus the `IndicatorEngine` that
// assembles them into an `IndicatorSet`.  Individual functions return
// `Option<T>` so that insufficient data and numerical edge cases are handled
// explicitly; the engine turns `None` into a typed invalid marker.

pub mod adx;
pub mod atr;
pub mod backend;
pub mod bollinger;
pub mod engine;
pub mod hurst;
pub mod macd;
pub mod moving_average;
pub mod obv;
pub mod roc;
pub mod rsi;
pub mod statistics;
pub mod stochastic;

pub use backend::detect_backend;
pub use engine::{IndicatorEngine, IndicatorName, IndicatorSet};
