// =============================================================================
// Market-Data Collaborator
// =============================================================================
//
// Supplies raw bars for an asset.  Validation into a `PriceSeries` happens in
// the scheduler so a malformed feed surfaces as a skipped evaluation rather
// than an I/O failure.
// =============================================================================

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::PriceBar;

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch the most recent bars for `asset`, oldest first.
    async fn fetch_bars(&self, asset: &str) -> Result<Vec<PriceBar>>;
}

/// Reads `<dir>/<ASSET>.json`, a JSON array of [`PriceBar`] objects, and
/// keeps the trailing `max_bars` entries.
pub struct JsonFileMarketData {
    dir: PathBuf,
    max_bars: usize,
}

impl JsonFileMarketData {
    pub fn new(dir: impl Into<PathBuf>, max_bars: usize) -> Self {
        Self {
            dir: dir.into(),
            max_bars,
        }
    }

    fn path_for(&self, asset: &str) -> PathBuf {
        self.dir.join(format!("{}.json", asset.to_uppercase()))
    }
}

#[async_trait]
impl MarketDataSource for JsonFileMarketData {
    async fn fetch_bars(&self, asset: &str) -> Result<Vec<PriceBar>> {
        let path = self.path_for(asset);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read bars from {}", path.display()))?;

        let mut bars: Vec<PriceBar> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse bars from {}", path.display()))?;

        if bars.len() > self.max_bars {
            bars.drain(..bars.len() - self.max_bars);
        }

        debug!(asset, bars = bars.len(), path = %path.display(), "bars loaded");
        Ok(bars)
    }
}
