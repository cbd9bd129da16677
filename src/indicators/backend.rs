// =============================================================================
// Statistics Backends — library-backed and manual implementations
// =============================================================================
//
// Every dispersion/moment computation in the indicator set goes through a
// `StatsBackend`.  Two implementations exist:
//
//   - `StatrsStats`: delegates to the `statrs` crate (cargo feature
//     `statrs`, enabled by default).
//   - `ManualStats`: textbook two-pass formulas with no dependencies.
//
// `detect_backend()` picks one once at startup; callers only ever see the
// trait object.  `SENTINEL_STATS_BACKEND=manual` forces the manual backend in
// a build that has `statrs`.  Both agree to within floating-point noise on
// the same input.
// =============================================================================

use std::sync::Arc;

use tracing::{info, warn};

pub const BACKEND_ENV: &str = "SENTINEL_STATS_BACKEND";

/// Basic descriptive statistics over a slice.
///
/// All methods return `NaN` on input too short for the statistic, mirroring
/// the convention of the underlying library.
pub trait StatsBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn mean(&self, xs: &[f64]) -> f64;

    /// Population variance (divide by N).
    fn population_variance(&self, xs: &[f64]) -> f64;

    /// Sample variance (divide by N - 1).
    fn sample_variance(&self, xs: &[f64]) -> f64;

    fn population_std_dev(&self, xs: &[f64]) -> f64 {
        self.population_variance(xs).sqrt()
    }

    fn sample_std_dev(&self, xs: &[f64]) -> f64 {
        self.sample_variance(xs).sqrt()
    }

    /// Population standardized central moment of order `k`
    /// (`E[(x - mean)^k] / sigma^k`).  Returns `NaN` for zero dispersion.
    fn standardized_moment(&self, xs: &[f64], k: i32) -> f64 {
        if xs.is_empty() {
            return f64::NAN;
        }
        let mean = self.mean(xs);
        let sigma = self.population_std_dev(xs);
        if sigma.is_nan() || sigma <= 0.0 {
            return f64::NAN;
        }
        let n = xs.len() as f64;
        xs.iter().map(|x| ((x - mean) / sigma).powi(k)).sum::<f64>() / n
    }
}

// =============================================================================
// Manual implementation
// =============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct ManualStats;

impl ManualStats {
    fn sum_sq_dev(xs: &[f64]) -> f64 {
        let mean = xs.iter().sum::<f64>() / xs.len() as f64;
        xs.iter().map(|x| (x - mean).powi(2)).sum()
    }
}

impl StatsBackend for ManualStats {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn mean(&self, xs: &[f64]) -> f64 {
        if xs.is_empty() {
            return f64::NAN;
        }
        xs.iter().sum::<f64>() / xs.len() as f64
    }

    fn population_variance(&self, xs: &[f64]) -> f64 {
        if xs.is_empty() {
            return f64::NAN;
        }
        Self::sum_sq_dev(xs) / xs.len() as f64
    }

    fn sample_variance(&self, xs: &[f64]) -> f64 {
        if xs.len() < 2 {
            return f64::NAN;
        }
        Self::sum_sq_dev(xs) / (xs.len() - 1) as f64
    }
}

// =============================================================================
// statrs implementation
// =============================================================================

#[cfg(feature = "statrs")]
#[derive(Debug, Default, Clone, Copy)]
pub struct StatrsStats;

#[cfg(feature = "statrs")]
impl StatsBackend for StatrsStats {
    fn name(&self) -> &'static str {
        "statrs"
    }

    fn mean(&self, xs: &[f64]) -> f64 {
        use statrs::statistics::Statistics;
        xs.iter().copied().mean()
    }

    fn population_variance(&self, xs: &[f64]) -> f64 {
        use statrs::statistics::Statistics;
        xs.iter().copied().population_variance()
    }

    fn sample_variance(&self, xs: &[f64]) -> f64 {
        use statrs::statistics::Statistics;
        xs.iter().copied().variance()
    }
}

/// Backend for `name` ("statrs" or "manual"); `None` selects the build default.
pub fn backend_named(name: Option<&str>) -> Arc<dyn StatsBackend> {
    match name.map(|n| n.trim().to_ascii_lowercase()).as_deref() {
        Some("manual") => Arc::new(ManualStats),
        #[cfg(feature = "statrs")]
        None | Some("statrs") => Arc::new(StatrsStats),
        #[cfg(not(feature = "statrs"))]
        None => Arc::new(ManualStats),
        Some(other) => {
            warn!(requested = other, "unknown statistics backend, using the default");
            backend_named(None)
        }
    }
}

/// Choose the statistics backend for this process.
pub fn detect_backend() -> Arc<dyn StatsBackend> {
    let requested = std::env::var(BACKEND_ENV).ok();
    let backend = backend_named(requested.as_deref());
    info!(backend = backend.name(), "indicator statistics backend selected");
    backend
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_known_values() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let m = ManualStats;
        assert!((m.mean(&xs) - 5.0).abs() < 1e-12);
        assert!((m.population_std_dev(&xs) - 2.0).abs() < 1e-12);
        assert!((m.sample_variance(&xs) - 32.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn manual_short_input_is_nan() {
        let m = ManualStats;
        assert!(m.mean(&[]).is_nan());
        assert!(m.sample_variance(&[1.0]).is_nan());
        assert!(m.standardized_moment(&[3.0, 3.0, 3.0], 3).is_nan());
    }

    #[test]
    fn symmetric_data_has_zero_skew() {
        let xs = [-2.0, -1.0, 0.0, 1.0, 2.0];
        assert!(ManualStats.standardized_moment(&xs, 3).abs() < 1e-12);
    }

    #[test]
    fn detect_backend_returns_a_working_backend() {
        let backend = detect_backend();
        assert!((backend.mean(&[1.0, 2.0, 3.0]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn backend_can_be_chosen_by_name() {
        assert_eq!(backend_named(Some("manual")).name(), "manual");
        assert_eq!(backend_named(Some(" Manual ")).name(), "manual");
        let default = backend_named(None).name();
        assert_eq!(backend_named(Some("bogus")).name(), default);
        #[cfg(feature = "statrs")]
        assert_eq!(default, "statrs");
        #[cfg(not(feature = "statrs"))]
        assert_eq!(default, "manual");
    }

    #[cfg(feature = "statrs")]
    #[test]
    fn statrs_and_manual_agree() {
        use crate::market_data::fixtures::XorShift;

        let mut rng = XorShift::new(7);
        let xs: Vec<f64> = (0..500).map(|_| 100.0 + 10.0 * rng.next_f64()).collect();
        let (a, b) = (ManualStats, StatrsStats);
        assert!((a.mean(&xs) - b.mean(&xs)).abs() < 1e-9);
        assert!((a.population_variance(&xs) - b.population_variance(&xs)).abs() < 1e-9);
        assert!((a.sample_std_dev(&xs) - b.sample_std_dev(&xs)).abs() < 1e-9);
        assert!((a.standardized_moment(&xs, 4) - b.standardized_moment(&xs, 4)).abs() < 1e-9);
    }
}
