// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
//   deltas      = close_t - close_{t-1}
//   seed        = SMA of the first `period` gains / losses
//   avg_gain_t  = (avg_gain_{t-1} * (period - 1) + gain_t) / period
//   avg_loss_t  = (avg_loss_{t-1} * (period - 1) + loss_t) / period
//   RSI         = 100 - 100 / (1 + avg_gain / avg_loss)
//
// Requires `period + 1` closes.  The zone boundaries (30 / 70) are shared with
// the minimal fallback rule and the mean-reversion sub-signal.
// =============================================================================

use serde::{Deserialize, Serialize};

pub const RSI_PERIOD: usize = 14;
pub const OVERSOLD: f64 = 30.0;
pub const OVERBOUGHT: f64 = 70.0;

/// Coarse RSI classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RsiZone {
    Oversold,
    Neutral,
    Overbought,
}

impl RsiZone {
    /// Total over every finite RSI value; boundaries themselves are neutral.
    pub fn classify(rsi: f64) -> Self {
        if rsi < OVERSOLD {
            Self::Oversold
        } else if rsi > OVERBOUGHT {
            Self::Overbought
        } else {
            Self::Neutral
        }
    }
}

impl std::fmt::Display for RsiZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Oversold => write!(f, "OVERSOLD"),
            Self::Neutral => write!(f, "NEUTRAL"),
            Self::Overbought => write!(f, "OVERBOUGHT"),
        }
    }
}

/// Full RSI series, one value per close starting at index `period`.
///
/// Empty when `period == 0` or fewer than `period + 1` closes are supplied.
/// The series is truncated at the first non-finite value.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let period_f = period as f64;

    let (seed_gain, seed_loss) = deltas[..period]
        .iter()
        .fold((0.0_f64, 0.0_f64), |(g, l), &d| (g + d.max(0.0), l + (-d).max(0.0)));
    let mut avg_gain = seed_gain / period_f;
    let mut avg_loss = seed_loss / period_f;

    let mut series = Vec::with_capacity(deltas.len() - period + 1);
    match rsi_from_averages(avg_gain, avg_loss) {
        Some(first) => series.push(first),
        None => return series,
    }

    for &delta in &deltas[period..] {
        avg_gain = (avg_gain * (period_f - 1.0) + delta.max(0.0)) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + (-delta).max(0.0)) / period_f;

        match rsi_from_averages(avg_gain, avg_loss) {
            Some(rsi) => series.push(rsi),
            None => break,
        }
    }

    series
}

/// Most recent RSI value.
pub fn latest_rsi(closes: &[f64], period: usize) -> Option<f64> {
    calculate_rsi(closes, period).last().copied()
}

/// Both averages zero gives 50 (no movement); zero loss gives 100.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    };

    rsi.is_finite().then_some(rsi)
}
