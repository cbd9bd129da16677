// =============================================================================
// Regime Detection Module
// =============================================================================
//
// Classifies the market as trending, mean-reverting or volatile from the
// Hurst exponent and relative volatility of an already computed indicator set.

pub mod detector;

pub use detector::{MarketRegime, RegimeAssessment, RegimeDetector, RegimeThresholds};
