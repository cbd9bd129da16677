// =============================================================================
// Average Directional Index (ADX)
// =============================================================================
//
// Direction-agnostic trend strength, used as the trend sub-signal's strength
// proxy.
//
//   1. +DM / -DM and True Range per bar transition.
//   2. Wilder running sums of +DM, -DM, TR over `period`.
//   3. +DI = 100 * s(+DM) / s(TR),  -DI = 100 * s(-DM) / s(TR)
//   4. DX  = 100 * |+DI - -DI| / (+DI + -DI)
//   5. ADX = Wilder average of DX, seeded with the SMA of the first `period`.
//
// Needs `2 * period + 1` bars.
// =============================================================================

use super::atr::true_ranges;
use crate::market_data::PriceBar;

pub const ADX_PERIOD: usize = 14;

/// Latest ADX in [0, 100], or `None` on short or degenerate input.
pub fn calculate_adx(bars: &[PriceBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < 2 * period + 1 {
        return None;
    }

    let (plus_dm, minus_dm): (Vec<f64>, Vec<f64>) = bars
        .windows(2)
        .map(|w| {
            let up = w[1].high - w[0].high;
            let down = w[0].low - w[1].low;
            (
                if up > down && up > 0.0 { up } else { 0.0 },
                if down > up && down > 0.0 { down } else { 0.0 },
            )
        })
        .unzip();
    let tr = true_ranges(bars);

    let period_f = period as f64;
    let mut s_plus: f64 = plus_dm[..period].iter().sum();
    let mut s_minus: f64 = minus_dm[..period].iter().sum();
    let mut s_tr: f64 = tr[..period].iter().sum();

    let mut dx_values = Vec::with_capacity(tr.len() - period + 1);
    dx_values.push(directional_index(s_plus, s_minus, s_tr)?);

    for i in period..tr.len() {
        s_plus = s_plus - s_plus / period_f + plus_dm[i];
        s_minus = s_minus - s_minus / period_f + minus_dm[i];
        s_tr = s_tr - s_tr / period_f + tr[i];
        dx_values.push(directional_index(s_plus, s_minus, s_tr)?);
    }

    let mut adx = dx_values[..period].iter().sum::<f64>() / period_f;
    for &dx in &dx_values[period..] {
        adx = (adx * (period_f - 1.0) + dx) / period_f;
    }

    adx.is_finite().then_some(adx)
}

/// DX from smoothed sums.  No directional movement yields 0; a zero true
/// range (perfectly flat bars) is degenerate.
fn directional_index(s_plus: f64, s_minus: f64, s_tr: f64) -> Option<f64> {
    if s_tr == 0.0 {
        return None;
    }
    let plus_di = s_plus / s_tr * 100.0;
    let minus_di = s_minus / s_tr * 100.0;
    let sum = plus_di + minus_di;
    if sum == 0.0 {
        return Some(0.0);
    }
    let dx = (plus_di - minus_di).abs() / sum * 100.0;
    dx.is_finite().then_some(dx)
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
            volume: 1.0,
        }
    }

    #[test]
    fn adx_minimum_bars_exact() {
        let period = 5;
        let min = 2 * period + 1;
        let bars: Vec<PriceBar> = (0..min)
            .map(|i| {
                let base = 100.0 + i as f64;
                bar(base, base + 1.0, base - 0.5, base + 0.5)
            })
            .collect();
        assert!(calculate_adx(&bars, period).is_some());
        assert!(calculate_adx(&bars[..min - 1], period).is_none());
        assert!(calculate_adx(&bars, 0).is_none());
    }

    #[test]
    fn adx_strong_uptrend() {
        let bars: Vec<PriceBar> = (0..60)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                bar(base, base + 1.5, base - 0.5, base + 1.0)
            })
            .collect();
        let value = calculate_adx(&bars, 14).unwrap();
        assert!(value > 25.0, "expected ADX > 25 for strong trend, got {value}");
    }

    #[test]
    fn adx_no_directional_movement() {
        let bars = vec![bar(100.0, 101.0, 99.0, 100.0); 60];
        let value = calculate_adx(&bars, 14).unwrap();
        assert!(value < 1.0, "expected ADX near 0, got {value}");
    }

    #[test]
    fn adx_zero_range_is_degenerate() {
        let bars = vec![bar(100.0, 100.0, 100.0, 100.0); 60];
        assert!(calculate_adx(&bars, 14).is_none());
    }

    #[test]
    fn adx_stays_in_range() {
        let bars: Vec<PriceBar> = (0..100)
            .map(|i| {
                let base = 50.0 + (i as f64 * 0.3).sin() * 10.0;
                bar(base - 0.5, base + 1.0, base - 1.0, base + 0.5)
            })
            .collect();
        let value = calculate_adx(&bars, 14).unwrap();
        assert!((0.0..=100.0).contains(&value), "ADX {value} out of range");
    }
}
