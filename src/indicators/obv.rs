// =============================================================================
// On-Balance Volume (OBV)
// =============================================================================
//
// OBV adds the bar's volume on an up-close and subtracts it on a down-close.
// The slope is the OBV change over the trailing window divided by the volume
// traded in that window, so it lies in [-1, 1] regardless of volume scale.

use crate::market_data::PriceBar;

pub const SLOPE_WINDOW: usize = 10;

/// Cumulative OBV series, starting at 0 on the first bar.
pub fn calculate_obv(bars: &[PriceBar]) -> Vec<f64> {
    let mut obv = Vec::with_capacity(bars.len());
    let mut total = 0.0;
    for (i, bar) in bars.iter().enumerate() {
        if i > 0 {
            let prev = bars[i - 1].close;
            if bar.close > prev {
                total += bar.volume;
            } else if bar.close < prev {
                total -= bar.volume;
            }
        }
        obv.push(total);
    }
    obv
}

/// Latest OBV; needs two bars to carry any information.
pub fn latest_obv(bars: &[PriceBar]) -> Option<f64> {
    if bars.len() < 2 {
        return None;
    }
    calculate_obv(bars).last().copied()
}

/// Normalised OBV slope over `window` bars; `None` when too short or when no
/// volume traded in the window.
pub fn obv_slope(bars: &[PriceBar], window: usize) -> Option<f64> {
    if window == 0 || bars.len() < window + 1 {
        return None;
    }
    let obv = calculate_obv(bars);
    let n = obv.len();
    let volume: f64 = bars[n - window..].iter().map(|b| b.volume).sum();
    if volume <= 0.0 {
        return None;
    }
    Some((obv[n - 1] - obv[n - 1 - window]) / volume)
}
