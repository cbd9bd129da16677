// =============================================================================
// Bollinger Bands (20, 2σ)
// =============================================================================
//
//   middle  = SMA(period)
//   upper   = middle + k * σ         (population σ over the same window)
//   lower   = middle - k * σ
//   width   = (upper - lower) / middle * 100
//   %B      = (close - lower) / (upper - lower)
//
// A zero-width band (flat window) puts %B at the 0.5 midpoint.

use super::backend::StatsBackend;

pub const PERIOD: usize = 20;
pub const NUM_STD: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub width: f64,
    pub percent_b: f64,
}

/// Bands over the trailing `period` closes; `None` when too short or the
/// middle band is zero.
pub fn calculate_bollinger(
    stats: &dyn StatsBackend,
    closes: &[f64],
    period: usize,
    num_std: f64,
) -> Option<BollingerBands> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = stats.mean(window);
    if middle == 0.0 || !middle.is_finite() {
        return None;
    }
    let sigma = stats.population_std_dev(window);

    let upper = middle + num_std * sigma;
    let lower = middle - num_std * sigma;
    let width = (upper - lower) / middle * 100.0;

    let close = window[period - 1];
    let span = upper - lower;
    let percent_b = if span > f64::EPSILON * middle.abs() {
        (close - lower) / span
    } else {
        0.5
    };

    (width.is_finite() && percent_b.is_finite()).then_some(BollingerBands {
        upper,
        middle,
        lower,
        width,
        percent_b,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::backend::ManualStats;

    #[test]
    fn bollinger_basic() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let bb = calculate_bollinger(&ManualStats, &closes, 20, 2.0).unwrap();
        assert!(bb.upper > bb.middle && bb.lower < bb.middle);
        assert!(bb.width > 0.0);
        // Last close of a rising window sits in the upper half.
        assert!(bb.percent_b > 0.5 && bb.percent_b < 1.0);
    }

    #[test]
    fn bollinger_insufficient_data() {
        assert!(calculate_bollinger(&ManualStats, &[1.0, 2.0, 3.0], 20, 2.0).is_none());
    }

    #[test]
    fn flat_window_has_zero_width_and_mid_percent_b() {
        let bb = calculate_bollinger(&ManualStats, &[100.0; 20], 20, 2.0).unwrap();
        assert!(bb.width.abs() < 1e-10);
        assert!((bb.percent_b - 0.5).abs() < 1e-12);
    }

    #[test]
    fn percent_b_exceeds_one_on_breakout() {
        let mut closes = vec![100.0; 19];
        closes.push(130.0);
        let bb = calculate_bollinger(&ManualStats, &closes, 20, 2.0).unwrap();
        assert!(bb.percent_b > 1.0, "%B = {}", bb.percent_b);
    }
}
