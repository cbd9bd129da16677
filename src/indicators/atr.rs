// =============================================================================
// Average True Range (ATR) — Wilder's Smoothing
// =============================================================================
//
//   TR_t    = max(H - L, |H - prevClose|, |L - prevClose|)
//   ATR_0   = SMA of the first `period` TR values
//   ATR_t   = (ATR_{t-1} * (period - 1) + TR_t) / period
//
// Needs `period + 1` bars.  `atr_fraction` expresses ATR relative to the last
// close so that volatility is comparable across price scales.
// =============================================================================

use crate::market_data::PriceBar;

pub const ATR_PERIOD: usize = 14;

/// True range for every consecutive pair of bars (length `bars.len() - 1`).
pub fn true_ranges(bars: &[PriceBar]) -> Vec<f64> {
    bars.windows(2)
        .map(|w| {
            let (prev, cur) = (&w[0], &w[1]);
            (cur.high - cur.low)
                .max((cur.high - prev.close).abs())
                .max((cur.low - prev.close).abs())
        })
        .collect()
}

/// Latest Wilder ATR, or `None` on short or non-finite input.
pub fn calculate_atr(bars: &[PriceBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }

    let tr = true_ranges(bars);
    let period_f = period as f64;
    let mut atr = tr[..period].iter().sum::<f64>() / period_f;

    for &value in &tr[period..] {
        atr = (atr * (period_f - 1.0) + value) / period_f;
    }

    atr.is_finite().then_some(atr)
}

/// ATR divided by the last close (0.02 == 2 %).
pub fn atr_fraction(bars: &[PriceBar], period: usize) -> Option<f64> {
    let atr = calculate_atr(bars, period)?;
    let close = bars.last()?.close;
    (close > 0.0).then(|| atr / close)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> PriceBar {
        PriceBar {
            timestamp: 0,
            open,
            high,
            low,
            close,
            volume: 100.0,
        }
    }

    #[test]
    fn atr_requires_period_plus_one_bars() {
        let bars = vec![bar(100.0, 105.0, 95.0, 102.0); 14];
        assert!(calculate_atr(&bars, 14).is_none());
        let bars = vec![bar(100.0, 105.0, 95.0, 102.0); 15];
        assert!(calculate_atr(&bars, 14).is_some());
        assert!(calculate_atr(&bars, 0).is_none());
    }

    #[test]
    fn atr_constant_range_converges() {
        let bars: Vec<PriceBar> = (0..30)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.1;
                bar(base, base + 5.0, base - 5.0, base)
            })
            .collect();
        let atr = calculate_atr(&bars, 14).unwrap();
        assert!((atr - 10.0).abs() < 1.0, "expected ATR near 10, got {atr}");
    }

    #[test]
    fn true_range_includes_gaps() {
        let bars = vec![
            bar(100.0, 105.0, 95.0, 95.0),
            bar(110.0, 115.0, 108.0, 112.0),
        ];
        assert_eq!(true_ranges(&bars), vec![20.0]);
    }

    #[test]
    fn atr_fraction_is_relative_to_close() {
        let bars: Vec<PriceBar> = (0..30).map(|_| bar(200.0, 202.0, 198.0, 200.0)).collect();
        let frac = atr_fraction(&bars, 14).unwrap();
        assert!((frac - 0.02).abs() < 1e-12);
    }

    #[test]
    fn flat_bars_have_zero_atr() {
        let bars = vec![bar(50.0, 50.0, 50.0, 50.0); 20];
        assert_eq!(calculate_atr(&bars, 14), Some(0.0));
    }
}
