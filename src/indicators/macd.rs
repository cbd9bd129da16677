// =============================================================================
// MACD — Moving Average Convergence / Divergence (12, 26, 9)
// =============================================================================
//
//   line      = EMA(fast) - EMA(slow)
//   signal    = EMA(signal_period) of line
//   histogram = line - signal
//
// With the default periods the line needs 26 closes, the signal and histogram
// 34, and the histogram slope (last minus previous histogram value) 35.
// =============================================================================

use super::moving_average::calculate_ema;

pub const FAST: usize = 12;
pub const SLOW: usize = 26;
pub const SIGNAL: usize = 9;

/// Latest MACD readings.  Fields are `None` when the series is too short for
/// that particular component.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MacdReading {
    pub line: Option<f64>,
    pub signal: Option<f64>,
    pub histogram: Option<f64>,
    pub histogram_slope: Option<f64>,
}

/// Compute MACD with the given periods.
pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdReading {
    if fast == 0 || slow <= fast || signal == 0 {
        return MacdReading::default();
    }

    let fast_ema = calculate_ema(closes, fast);
    let slow_ema = calculate_ema(closes, slow);
    if slow_ema.is_empty() {
        return MacdReading::default();
    }

    // fast_ema[i] aligns with close index i + fast - 1; slow with i + slow - 1.
    let offset = slow - fast;
    let line: Vec<f64> = slow_ema
        .iter()
        .enumerate()
        .filter_map(|(i, s)| fast_ema.get(i + offset).map(|f| f - s))
        .collect();

    let signal_series = calculate_ema(&line, signal);
    let hist: Vec<f64> = signal_series
        .iter()
        .enumerate()
        .map(|(i, s)| line[i + signal - 1] - s)
        .collect();

    MacdReading {
        line: line.last().copied(),
        signal: signal_series.last().copied(),
        histogram: hist.last().copied(),
        histogram_slope: match hist.as_slice() {
            [.., prev, last] => Some(last - prev),
            _ => None,
        },
    }
}

/// MACD with the standard 12 / 26 / 9 periods.
pub fn standard_macd(closes: &[f64]) -> MacdReading {
    calculate_macd(closes, FAST, SLOW, SIGNAL)
}
