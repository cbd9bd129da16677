// =============================================================================
// Price Series — validated, chronologically ordered OHLCV bars
// =============================================================================
//
// A `PriceSeries` can only be built through `PriceSeries::new`, which rejects
// empty input, duplicate or out-of-order timestamps, and non-finite values.
// Every indicator downstream can therefore assume a clean, ordered slice.
// =============================================================================

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MalformedSeriesError;

/// A single OHLCV bar. `timestamp` is the bar open time in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl PriceBar {
    fn is_well_formed(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().all(|p| p.is_finite() && *p > 0.0)
            && self.volume.is_finite()
            && self.volume >= 0.0
    }
}

/// Immutable, validated series of bars (oldest first).
#[derive(Debug, Clone)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Validate and wrap `bars`.
    pub fn new(bars: Vec<PriceBar>) -> Result<Self, MalformedSeriesError> {
        if bars.is_empty() {
            return Err(MalformedSeriesError::Empty);
        }

        for (index, bar) in bars.iter().enumerate() {
            if !bar.is_well_formed() {
                return Err(MalformedSeriesError::InvalidBar { index });
            }
            if index > 0 {
                let previous = bars[index - 1].timestamp;
                if bar.timestamp <= previous {
                    return Err(MalformedSeriesError::NonChronological {
                        index,
                        timestamp: bar.timestamp,
                        previous,
                    });
                }
            }
        }

        Ok(Self { bars })
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// The most recent bar. Never fails: construction rejects empty input.
    pub fn last(&self) -> &PriceBar {
        &self.bars[self.bars.len() - 1]
    }

    /// Timestamp of the most recent bar as a UTC instant.
    pub fn last_timestamp(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.last().timestamp)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}
