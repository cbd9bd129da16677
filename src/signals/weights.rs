// =============================================================================
// Signal Weight Table — (regime, risk level) -> sub-signal weights
// =============================================================================
//
// The defaults are hand-tuned heuristics, kept as configurable data.  The
// table serialises as a flat list of entries so that a config file may
// override any subset of cells; missing cells keep their defaults.
//
// Every cell must hold non-negative weights summing to 1.
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::regime::MarketRegime;
use crate::types::RiskLevel;

const SUM_TOLERANCE: f64 = 1e-6;

/// Weights of the four sub-signals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalWeights {
    pub trend: f64,
    pub momentum: f64,
    pub mean_reversion: f64,
    pub volatility: f64,
}

impl SignalWeights {
    pub const fn new(trend: f64, momentum: f64, mean_reversion: f64, volatility: f64) -> Self {
        Self {
            trend,
            momentum,
            mean_reversion,
            volatility,
        }
    }

    pub fn sum(&self) -> f64 {
        self.trend + self.momentum + self.mean_reversion + self.volatility
    }

    fn validate(&self) -> Result<(), String> {
        let all = [self.trend, self.momentum, self.mean_reversion, self.volatility];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err("weights must be finite and non-negative".to_string());
        }
        if (self.sum() - 1.0).abs() > SUM_TOLERANCE {
            return Err(format!("weights sum to {:.4}, expected 1", self.sum()));
        }
        Ok(())
    }
}

/// One serialised table cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
    pub regime: MarketRegime,
    pub risk_level: RiskLevel,
    pub weights: SignalWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<WeightEntry>", into = "Vec<WeightEntry>")]
pub struct WeightTable {
    cells: HashMap<(MarketRegime, RiskLevel), SignalWeights>,
}

impl WeightTable {
    /// Weights for a cell.  Every cell exists: construction starts from the
    /// full default table.
    pub fn get(&self, regime: MarketRegime, level: RiskLevel) -> SignalWeights {
        self.cells
            .get(&(regime, level))
            .copied()
            .unwrap_or_else(|| default_weights(regime, level))
    }

    pub fn set(&mut self, regime: MarketRegime, level: RiskLevel, weights: SignalWeights) {
        self.cells.insert((regime, level), weights);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for regime in MarketRegime::ALL {
            for level in RiskLevel::ALL {
                self.get(regime, level)
                    .validate()
                    .map_err(|reason| ConfigError::InvalidWeights {
                        regime: regime.to_string(),
                        level: level.to_string(),
                        reason,
                    })?;
            }
        }
        Ok(())
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        let cells = MarketRegime::ALL
            .iter()
            .flat_map(|&r| RiskLevel::ALL.iter().map(move |&l| ((r, l), default_weights(r, l))))
            .collect();
        Self { cells }
    }
}

impl From<Vec<WeightEntry>> for WeightTable {
    fn from(entries: Vec<WeightEntry>) -> Self {
        let mut table = Self::default();
        for e in entries {
            table.set(e.regime, e.risk_level, e.weights);
        }
        table
    }
}

impl From<WeightTable> for Vec<WeightEntry> {
    fn from(table: WeightTable) -> Self {
        let mut entries: Vec<WeightEntry> = table
            .cells
            .into_iter()
            .map(|((regime, risk_level), weights)| WeightEntry {
                regime,
                risk_level,
                weights,
            })
            .collect();
        entries.sort_by_key(|e| (e.regime, e.risk_level));
        entries
    }
}

/// Default weights (trend, momentum, mean-reversion, volatility).
pub fn default_weights(regime: MarketRegime, level: RiskLevel) -> SignalWeights {
    use MarketRegime::*;
    use RiskLevel::*;
    match (regime, level) {
        (Trending, Low) => SignalWeights::new(0.35, 0.25, 0.20, 0.20),
        (Trending, Medium) => SignalWeights::new(0.30, 0.30, 0.20, 0.20),
        (Trending, High) => SignalWeights::new(0.25, 0.35, 0.15, 0.25),
        (MeanReverting, Low) => SignalWeights::new(0.22, 0.22, 0.28, 0.28),
        (MeanReverting, Medium) => SignalWeights::new(0.25, 0.25, 0.25, 0.25),
        (MeanReverting, High) => SignalWeights::new(0.25, 0.28, 0.25, 0.22),
        (Volatile, Low) => SignalWeights::new(0.20, 0.22, 0.28, 0.30),
        (Volatile, Medium) => SignalWeights::new(0.22, 0.25, 0.25, 0.28),
        (Volatile, High) => SignalWeights::new(0.25, 0.28, 0.22, 0.25),
    }
}
