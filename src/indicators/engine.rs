// =============================================================================
// Indicator Engine — the full indicator set from one price series
// =============================================================================
//
// Every indicator is computed independently.  When the series is shorter than
// an indicator's lookback, that indicator alone is marked
// `Invalid(Insufficient)`; when the input is numerically degenerate for it
// (zero range, zero variance) it is `Invalid(Degenerate)`.  The engine itself
// never fails: malformed series are rejected earlier by `PriceSeries::new`.
// =============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::backend::StatsBackend;
use super::{adx, atr, bollinger, hurst, macd, moving_average, obv, roc, rsi, statistics, stochastic};
use crate::market_data::PriceSeries;

pub const SMA_SHORT: usize = 20;
pub const SMA_LONG: usize = 50;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorName {
    Rsi,
    MacdLine,
    MacdSignal,
    MacdHistogram,
    MacdHistogramSlope,
    BollingerWidth,
    BollingerPercentB,
    Atr,
    AtrPercent,
    Adx,
    RealizedVolatility,
    HistoricalVolatility,
    VolatilityStability,
    StochasticK,
    StochasticD,
    SmaShort,
    SmaLong,
    RateOfChange,
    Obv,
    ObvSlope,
    ReturnSkewness,
    ReturnKurtosis,
    Hurst,
}

impl IndicatorName {
    pub const ALL: [IndicatorName; 23] = [
        Self::Rsi,
        Self::MacdLine,
        Self::MacdSignal,
        Self::MacdHistogram,
        Self::MacdHistogramSlope,
        Self::BollingerWidth,
        Self::BollingerPercentB,
        Self::Atr,
        Self::AtrPercent,
        Self::Adx,
        Self::RealizedVolatility,
        Self::HistoricalVolatility,
        Self::VolatilityStability,
        Self::StochasticK,
        Self::StochasticD,
        Self::SmaShort,
        Self::SmaLong,
        Self::RateOfChange,
        Self::Obv,
        Self::ObvSlope,
        Self::ReturnSkewness,
        Self::ReturnKurtosis,
        Self::Hurst,
    ];

    /// Minimum number of bars for this indicator to be computable.
    pub fn min_bars(self) -> usize {
        use statistics::{HISTORICAL_WINDOW, MOMENT_WINDOW, REALIZED_WINDOW, STABILITY_SAMPLES};
        match self {
            Self::Rsi => rsi::RSI_PERIOD + 1,
            Self::MacdLine => macd::SLOW,
            Self::MacdSignal | Self::MacdHistogram => macd::SLOW + macd::SIGNAL - 1,
            Self::MacdHistogramSlope => macd::SLOW + macd::SIGNAL,
            Self::BollingerWidth | Self::BollingerPercentB => bollinger::PERIOD,
            Self::Atr | Self::AtrPercent => atr::ATR_PERIOD + 1,
            Self::Adx => 2 * adx::ADX_PERIOD + 1,
            Self::RealizedVolatility => REALIZED_WINDOW + 1,
            Self::HistoricalVolatility => HISTORICAL_WINDOW + 1,
            Self::VolatilityStability => REALIZED_WINDOW + STABILITY_SAMPLES,
            Self::StochasticK => stochastic::K_PERIOD,
            Self::StochasticD => stochastic::K_PERIOD + stochastic::D_PERIOD - 1,
            Self::SmaShort => SMA_SHORT,
            Self::SmaLong => SMA_LONG,
            Self::RateOfChange => roc::ROC_PERIOD + 1,
            Self::Obv => 2,
            Self::ObvSlope => obv::SLOPE_WINDOW + 1,
            Self::ReturnSkewness | Self::ReturnKurtosis => MOMENT_WINDOW + 1,
            Self::Hurst => hurst::MIN_RETURNS + 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rsi => "rsi",
            Self::MacdLine => "macd_line",
            Self::MacdSignal => "macd_signal",
            Self::MacdHistogram => "macd_histogram",
            Self::MacdHistogramSlope => "macd_histogram_slope",
            Self::BollingerWidth => "bollinger_width",
            Self::BollingerPercentB => "bollinger_percent_b",
            Self::Atr => "atr",
            Self::AtrPercent => "atr_percent",
            Self::Adx => "adx",
            Self::RealizedVolatility => "realized_volatility",
            Self::HistoricalVolatility => "historical_volatility",
            Self::VolatilityStability => "volatility_stability",
            Self::StochasticK => "stochastic_k",
            Self::StochasticD => "stochastic_d",
            Self::SmaShort => "sma_short",
            Self::SmaLong => "sma_long",
            Self::RateOfChange => "rate_of_change",
            Self::Obv => "obv",
            Self::ObvSlope => "obv_slope",
            Self::ReturnSkewness => "return_skewness",
            Self::ReturnKurtosis => "return_kurtosis",
            Self::Hurst => "hurst",
        }
    }
}

impl std::fmt::Display for IndicatorName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an indicator carries no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum InvalidReason {
    Insufficient { required: usize, available: usize },
    Degenerate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorValue {
    Valid(f64),
    Invalid(InvalidReason),
}

impl IndicatorValue {
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Valid(v) => Some(v),
            Self::Invalid(_) => None,
        }
    }

    pub fn is_valid(self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// Independently valid/invalid indicator values for one evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSet {
    values: BTreeMap<IndicatorName, IndicatorValue>,
    pub last_close: f64,
    pub last_timestamp: DateTime<Utc>,
    pub bar_count: usize,
}

impl IndicatorSet {
    /// Value of `name`, or `None` when it is invalid.
    pub fn get(&self, name: IndicatorName) -> Option<f64> {
        self.status(name).value()
    }

    pub fn status(&self, name: IndicatorName) -> IndicatorValue {
        self.values.get(&name).copied().unwrap_or(IndicatorValue::Invalid(
            InvalidReason::Insufficient {
                required: name.min_bars(),
                available: self.bar_count,
            },
        ))
    }

    pub fn is_valid(&self, name: IndicatorName) -> bool {
        self.status(name).is_valid()
    }

    /// Names among `required` that are not valid, in the given order.
    pub fn missing(&self, required: &[IndicatorName]) -> Vec<IndicatorName> {
        required.iter().copied().filter(|n| !self.is_valid(*n)).collect()
    }

    pub fn valid_count(&self) -> usize {
        self.values.values().filter(|v| v.is_valid()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (IndicatorName, IndicatorValue)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }

    /// Seconds between the last bar and `now`.
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_timestamp).num_seconds()
    }

    /// Build a set directly from values (used for hand-crafted scenarios).
    pub fn from_values(
        values: impl IntoIterator<Item = (IndicatorName, f64)>,
        last_close: f64,
        last_timestamp: DateTime<Utc>,
        bar_count: usize,
    ) -> Self {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k, IndicatorValue::Valid(v)))
                .collect(),
            last_close,
            last_timestamp,
            bar_count,
        }
    }
}

// =============================================================================
// IndicatorEngine
// =============================================================================

/// Stateless indicator calculator bound to one statistics backend.
#[derive(Clone)]
pub struct IndicatorEngine {
    stats: Arc<dyn StatsBackend>,
}

impl IndicatorEngine {
    pub fn new(stats: Arc<dyn StatsBackend>) -> Self {
        Self { stats }
    }

    pub fn compute(&self, series: &PriceSeries) -> IndicatorSet {
        let stats = self.stats.as_ref();
        let bars = series.bars();
        let closes = series.closes();
        let returns = statistics::simple_returns(&closes);
        let available = bars.len();

        let macd = macd::standard_macd(&closes);
        let bands = bollinger::calculate_bollinger(stats, &closes, bollinger::PERIOD, bollinger::NUM_STD);
        let stoch = stochastic::calculate_stochastic(bars, stochastic::K_PERIOD, stochastic::D_PERIOD);

        let raw: [(IndicatorName, Option<f64>); 23] = [
            (IndicatorName::Rsi, rsi::latest_rsi(&closes, rsi::RSI_PERIOD)),
            (IndicatorName::MacdLine, macd.line),
            (IndicatorName::MacdSignal, macd.signal),
            (IndicatorName::MacdHistogram, macd.histogram),
            (IndicatorName::MacdHistogramSlope, macd.histogram_slope),
            (IndicatorName::BollingerWidth, bands.map(|b| b.width)),
            (IndicatorName::BollingerPercentB, bands.map(|b| b.percent_b)),
            (IndicatorName::Atr, atr::calculate_atr(bars, atr::ATR_PERIOD)),
            (IndicatorName::AtrPercent, atr::atr_fraction(bars, atr::ATR_PERIOD).map(|f| f * 100.0)),
            (IndicatorName::Adx, adx::calculate_adx(bars, adx::ADX_PERIOD)),
            (
                IndicatorName::RealizedVolatility,
                statistics::volatility(stats, &returns, statistics::REALIZED_WINDOW),
            ),
            (
                IndicatorName::HistoricalVolatility,
                statistics::volatility(stats, &returns, statistics::HISTORICAL_WINDOW),
            ),
            (
                IndicatorName::VolatilityStability,
                statistics::volatility_stability(
                    stats,
                    &returns,
                    statistics::REALIZED_WINDOW,
                    statistics::STABILITY_SAMPLES,
                ),
            ),
            (IndicatorName::StochasticK, stoch.k),
            (IndicatorName::StochasticD, stoch.d),
            (IndicatorName::SmaShort, moving_average::latest_sma(&closes, SMA_SHORT)),
            (IndicatorName::SmaLong, moving_average::latest_sma(&closes, SMA_LONG)),
            (IndicatorName::RateOfChange, roc::latest_roc(&closes, roc::ROC_PERIOD)),
            (IndicatorName::Obv, obv::latest_obv(bars)),
            (IndicatorName::ObvSlope, obv::obv_slope(bars, obv::SLOPE_WINDOW)),
            (
                IndicatorName::ReturnSkewness,
                statistics::skewness(stats, &returns, statistics::MOMENT_WINDOW),
            ),
            (
                IndicatorName::ReturnKurtosis,
                statistics::excess_kurtosis(stats, &returns, statistics::MOMENT_WINDOW),
            ),
            (IndicatorName::Hurst, hurst::hurst_exponent(stats, &closes)),
        ];

        let values: BTreeMap<IndicatorName, IndicatorValue> = raw
            .into_iter()
            .map(|(name, value)| {
                let required = name.min_bars();
                let status = if available < required {
                    IndicatorValue::Invalid(InvalidReason::Insufficient { required, available })
                } else {
                    match value {
                        Some(v) if v.is_finite() => IndicatorValue::Valid(v),
                        _ => IndicatorValue::Invalid(InvalidReason::Degenerate),
                    }
                };
                (name, status)
            })
            .collect();

        let set = IndicatorSet {
            values,
            last_close: series.last().close,
            last_timestamp: series.last_timestamp(),
            bar_count: available,
        };

        debug!(
            bars = available,
            valid = set.valid_count(),
            backend = self.stats.name(),
            "indicator set computed"
        );
        set
    }
}
