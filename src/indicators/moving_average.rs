// =============================================================================
// Moving Averages — SMA and EMA
// =============================================================================
//
//   SMA_t = mean(close_{t-period+1} ..= close_t)
//   EMA_t = close_t * k + EMA_{t-1} * (1 - k),   k = 2 / (period + 1)
//
// The EMA is seeded with the SMA of the first `period` closes, so both series
// start at index `period - 1`.
// =============================================================================

/// Simple moving average of the trailing `period` closes.
pub fn latest_sma(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    let sma = window.iter().sum::<f64>() / period as f64;
    sma.is_finite().then_some(sma)
}

/// Full EMA series; empty when `period == 0` or input is shorter than
/// `period`.  Truncated at the first non-finite value.
pub fn calculate_ema(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return Vec::new();
    }

    let mut series = Vec::with_capacity(values.len() - period + 1);
    series.push(seed);

    let mut prev = seed;
    for &value in &values[period..] {
        let ema = value * k + prev * (1.0 - k);
        if !ema.is_finite() {
            break;
        }
        series.push(ema);
        prev = ema;
    }

    series
}
