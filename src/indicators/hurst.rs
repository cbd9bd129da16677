// =============================================================================
// Hurst Exponent — Rescaled Range (R/S) Analysis
// =============================================================================
//
// The Hurst exponent H characterises the memory of a return series:
//
//   H > 0.5  =>  persistent / trending
//   H ~ 0.5  =>  random walk
//   H < 0.5  =>  anti-persistent / mean-reverting
//
// Algorithm (on log returns):
//   1. For each window size n in {8, 16, ..., 512} that fits the series:
//      a. Split the returns into non-overlapping chunks of length n.
//      b. Per chunk: R = range of the cumulative deviation from the chunk
//         mean, S = population σ of the chunk, R/S = R / S (flat chunks are
//         skipped).
//      c. Average R/S across chunks.
//   2. Subtract the Anis-Lloyd-Peters expected R/S of an i.i.d. series from
//      each log(avg R/S), removing the small-sample upward bias.
//   3. H = 0.5 + OLS slope of the corrected log R/S on log n, clamped to
//      [0, 1].
// =============================================================================

use std::f64::consts::PI;

use tracing::trace;

use super::backend::StatsBackend;

/// Minimum number of log returns (bars - 1) required.
pub const MIN_RETURNS: usize = 64;

const WINDOW_SIZES: [usize; 7] = [8, 16, 32, 64, 128, 256, 512];

/// Chunks whose σ falls below this carry no information.
const FLAT_CHUNK_STD: f64 = 1e-12;

/// Hurst exponent of `closes`.
///
/// `None` when fewer than `MIN_RETURNS + 1` closes are supplied or when every
/// chunk is flat (e.g. a constant price).
pub fn hurst_exponent(stats: &dyn StatsBackend, closes: &[f64]) -> Option<f64> {
    let returns: Vec<f64> = closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    if returns.len() < MIN_RETURNS {
        trace!(len = returns.len(), min = MIN_RETURNS, "Hurst: insufficient data");
        return None;
    }

    let mut xs: Vec<f64> = Vec::with_capacity(WINDOW_SIZES.len());
    let mut ys: Vec<f64> = Vec::with_capacity(WINDOW_SIZES.len());

    for &window in WINDOW_SIZES.iter().filter(|&&w| w <= returns.len()) {
        let rs: Vec<f64> = returns
            .chunks_exact(window)
            .filter_map(|chunk| rescaled_range(stats, chunk))
            .collect();
        if rs.is_empty() {
            continue;
        }
        let avg_rs = rs.iter().sum::<f64>() / rs.len() as f64;
        xs.push((window as f64).ln());
        ys.push(avg_rs.ln() - expected_rescaled_range(window).ln());
    }

    if xs.len() < 2 {
        trace!("Hurst: fewer than two usable window sizes");
        return None;
    }

    let slope = ols_slope(&xs, &ys)?;
    let hurst = (0.5 + slope).clamp(0.0, 1.0);

    trace!(hurst = format!("{:.4}", hurst), points = xs.len(), "Hurst exponent computed");
    Some(hurst)
}

fn rescaled_range(stats: &dyn StatsBackend, chunk: &[f64]) -> Option<f64> {
    let sigma = stats.population_std_dev(chunk);
    if !(sigma.is_finite() && sigma > FLAT_CHUNK_STD) {
        return None;
    }
    let mean = stats.mean(chunk);

    let (mut running, mut lo, mut hi) = (0.0_f64, 0.0_f64, 0.0_f64);
    for &x in chunk {
        running += x - mean;
        lo = lo.min(running);
        hi = hi.max(running);
    }
    Some((hi - lo) / sigma)
}

/// Anis-Lloyd-Peters expected R/S of `n` i.i.d. normal observations:
///
///   E[R/S]_n = (n - 1/2) / n * Γ((n-1)/2) / (√π Γ(n/2)) * Σ_{i=1}^{n-1} √((n-i)/i)
fn expected_rescaled_range(n: usize) -> f64 {
    let nf = n as f64;
    let sum: f64 = (1..n).map(|i| ((nf - i as f64) / i as f64).sqrt()).sum();
    (nf - 0.5) / nf * gamma_ratio(n) / PI.sqrt() * sum
}

/// Γ((n-1)/2) / Γ(n/2) for n >= 2 via r(n+2) = r(n) * (n-1) / n, avoiding the
/// overflow of evaluating either gamma directly.
fn gamma_ratio(n: usize) -> f64 {
    let (mut ratio, mut k) = if n % 2 == 0 {
        (PI.sqrt(), 2)
    } else {
        (2.0 / PI.sqrt(), 3)
    };
    while k < n {
        ratio *= (k as f64 - 1.0) / k as f64;
        k += 2;
    }
    ratio
}

fn ols_slope(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len() as f64;
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = ys.iter().sum::<f64>() / n;

    let (num, den) = xs.iter().zip(ys).fold((0.0, 0.0), |(num, den), (x, y)| {
        let dx = x - x_mean;
        (num + dx * (y - y_mean), den + dx * dx)
    });

    (den > f64::EPSILON).then(|| num / den)
}
