// Synthetic series shared by unit tests across the crate.

use chrono::{DateTime, Duration, Utc};

use super::{PriceBar, PriceSeries};

pub const HOUR_MS: i64 = 3_600_000;

/// Deterministic xorshift64 generator yielding uniforms in [0, 1).
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next_f64(&mut self) -> f64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Build hourly bars from closes, the last bar stamped at `end`.
pub fn bars_from_closes(closes: &[f64], end: DateTime<Utc>) -> Vec<PriceBar> {
    let n = closes.len() as i64;
    let start = end - Duration::hours(n - 1);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            PriceBar {
                timestamp: start.timestamp_millis() + i as i64 * HOUR_MS,
                open,
                high: open.max(close) * 1.001,
                low: open.min(close) * 0.999,
                close,
                volume: 1_000.0,
            }
        })
        .collect()
}

/// Strictly rising series: close = 100 + 0.5 * i.
pub fn uptrend(n: usize, end: DateTime<Utc>) -> PriceSeries {
    let start = end - Duration::hours(n as i64 - 1);
    let bars = (0..n)
        .map(|i| {
            let close = 100.0 + 0.5 * i as f64;
            let open = close - 0.25;
            PriceBar {
                timestamp: start.timestamp_millis() + i as i64 * HOUR_MS,
                open,
                high: close + 0.2,
                low: open - 0.2,
                close,
                volume: 1_000.0,
            }
        })
        .collect();
    PriceSeries::new(bars).unwrap()
}

/// Strictly falling series mirroring [`uptrend`].
pub fn downtrend(n: usize, end: DateTime<Utc>) -> PriceSeries {
    let closes: Vec<f64> = (0..n).map(|i| 300.0 - 0.5 * i as f64).collect();
    PriceSeries::new(bars_from_closes(&closes, end)).unwrap()
}

/// Constant price series.
pub fn flat(n: usize, end: DateTime<Utc>) -> PriceSeries {
    PriceSeries::new(bars_from_closes(&vec![100.0; n], end)).unwrap()
}

/// Multiplicative random walk driven by uniform shocks of +/- 1%.
pub fn random_walk_closes(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = XorShift::new(seed);
    let mut price = 100.0;
    (0..n)
        .map(|_| {
            price *= 1.0 + 0.02 * (rng.next_f64() - 0.5);
            price
        })
        .collect()
}

pub fn random_walk(n: usize, seed: u64, end: DateTime<Utc>) -> PriceSeries {
    PriceSeries::new(bars_from_closes(&random_walk_closes(n, seed), end)).unwrap()
}
