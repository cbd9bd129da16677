// =============================================================================
// Return Statistics — volatility, stability and distribution shape
// =============================================================================
//
// All measures work on simple returns r_t = close_t / close_{t-1} - 1.
//
//   realized volatility    sample σ of the last 20 returns
//   historical volatility  sample σ of the last 100 returns
//   volatility stability   1 / (1 + cv) of the rolling 20-return σ sampled at
//                          the last 20 positions (1 = perfectly stable)
//   skewness / kurtosis    standardized 3rd moment / excess 4th moment of the
//                          last 50 returns
// =============================================================================

use super::backend::StatsBackend;

pub const REALIZED_WINDOW: usize = 20;
pub const HISTORICAL_WINDOW: usize = 100;
pub const STABILITY_SAMPLES: usize = 20;
pub const MOMENT_WINDOW: usize = 50;

/// Simple returns; one shorter than `closes`.
pub fn simple_returns(closes: &[f64]) -> Vec<f64> {
    closes.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

fn tail(xs: &[f64], n: usize) -> Option<&[f64]> {
    (n > 0 && xs.len() >= n).then(|| &xs[xs.len() - n..])
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Sample standard deviation of the trailing `window` returns.
pub fn volatility(stats: &dyn StatsBackend, returns: &[f64], window: usize) -> Option<f64> {
    finite(stats.sample_std_dev(tail(returns, window)?))
}

/// Stability of the rolling volatility; `None` when there is not enough
/// history or the rolling volatility is identically zero.
pub fn volatility_stability(
    stats: &dyn StatsBackend,
    returns: &[f64],
    window: usize,
    samples: usize,
) -> Option<f64> {
    if samples < 2 || returns.len() < window + samples - 1 {
        return None;
    }
    let start = returns.len() - (window + samples - 1);
    let rolling: Vec<f64> = returns[start..]
        .windows(window)
        .map(|w| stats.sample_std_dev(w))
        .collect();

    let mean = stats.mean(&rolling);
    if !(mean.is_finite() && mean > 0.0) {
        return None;
    }
    let cv = stats.population_std_dev(&rolling) / mean;
    finite(1.0 / (1.0 + cv))
}

pub fn skewness(stats: &dyn StatsBackend, returns: &[f64], window: usize) -> Option<f64> {
    finite(stats.standardized_moment(tail(returns, window)?, 3))
}

/// Excess kurtosis (normal distribution = 0).
pub fn excess_kurtosis(stats: &dyn StatsBackend, returns: &[f64], window: usize) -> Option<f64> {
    finite(stats.standardized_moment(tail(returns, window)?, 4) - 3.0)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::backend::ManualStats;
    use crate::market_data::fixtures::random_walk_closes;

    #[test]
    fn returns_are_relative() {
        let r = simple_returns(&[100.0, 110.0, 99.0]);
        assert!((r[0] - 0.1).abs() < 1e-12);
        assert!((r[1] + 0.1).abs() < 1e-12);
    }

    #[test]
    fn volatility_windows() {
        let returns = simple_returns(&random_walk_closes(150, 3));
        assert!(volatility(&ManualStats, &returns, REALIZED_WINDOW).unwrap() > 0.0);
        assert!(volatility(&ManualStats, &returns[..19], REALIZED_WINDOW).is_none());
        assert!(volatility(&ManualStats, &returns, HISTORICAL_WINDOW).is_some());
    }

    #[test]
    fn constant_volatility_is_perfectly_stable() {
        // Alternating +/- 1 % returns: every rolling window has the same σ.
        let returns: Vec<f64> = (0..60).map(|i| if i % 2 == 0 { 0.01 } else { -0.01 }).collect();
        let s = volatility_stability(&ManualStats, &returns, REALIZED_WINDOW, STABILITY_SAMPLES)
            .unwrap();
        assert!((s - 1.0).abs() < 1e-9, "stability = {s}");
    }

    #[test]
    fn volatility_burst_lowers_stability() {
        let mut returns: Vec<f64> = (0..60).map(|i| if i % 2 == 0 { 0.01 } else { -0.01 }).collect();
        for r in returns.iter_mut().skip(50) {
            *r *= 8.0;
        }
        let s = volatility_stability(&ManualStats, &returns, REALIZED_WINDOW, STABILITY_SAMPLES)
            .unwrap();
        assert!(s < 0.9, "stability = {s}");
    }

    #[test]
    fn flat_returns_have_no_shape() {
        let returns = vec![0.0; 60];
        assert!(volatility_stability(&ManualStats, &returns, REALIZED_WINDOW, STABILITY_SAMPLES)
            .is_none());
        assert!(skewness(&ManualStats, &returns, MOMENT_WINDOW).is_none());
        assert!(excess_kurtosis(&ManualStats, &returns, MOMENT_WINDOW).is_none());
    }

    #[test]
    fn uniform_returns_are_platykurtic() {
        let returns: Vec<f64> = (0..50).map(|i| i as f64 / 49.0 - 0.5).collect();
        let k = excess_kurtosis(&ManualStats, &returns, MOMENT_WINDOW).unwrap();
        assert!((k + 1.2).abs() < 0.05, "excess kurtosis = {k}");
        assert!(skewness(&ManualStats, &returns, MOMENT_WINDOW).unwrap().abs() < 1e-9);
    }
}
