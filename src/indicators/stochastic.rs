// =============================================================================
// Stochastic Oscillator (%K 14, %D 3)
// =============================================================================
//
//   %K = 100 * (close - lowest_low(n)) / (highest_high(n) - lowest_low(n))
//   %D = SMA(3) of %K
//
// A window whose high equals its low has no defined %K.

use crate::market_data::PriceBar;

pub const K_PERIOD: usize = 14;
pub const D_PERIOD: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StochasticReading {
    pub k: Option<f64>,
    pub d: Option<f64>,
}

fn percent_k(window: &[PriceBar]) -> Option<f64> {
    let highest = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let lowest = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    let range = highest - lowest;
    if range <= 0.0 {
        return None;
    }
    let close = window.last()?.close;
    Some((100.0 * (close - lowest) / range).clamp(0.0, 100.0))
}

/// Latest %K and %D.
pub fn calculate_stochastic(bars: &[PriceBar], k_period: usize, d_period: usize) -> StochasticReading {
    if k_period == 0 || d_period == 0 || bars.len() < k_period {
        return StochasticReading::default();
    }

    let k_series: Vec<Option<f64>> = bars.windows(k_period).map(percent_k).collect();
    let k = k_series.last().copied().flatten();

    let d = if k_series.len() >= d_period {
        k_series[k_series.len() - d_period..]
            .iter()
            .copied()
            .sum::<Option<f64>>()
            .map(|sum| sum / d_period as f64)
    } else {
        None
    };

    StochasticReading { k, d }
}
