// =============================================================================
// Market Data Module
// =============================================================================
//
// Validated price series plus the collaborator interface that supplies them.
// The engine performs no caching or re-fetching itself.

pub mod series;
pub mod source;

#[cfg(test)]
pub mod fixtures;

pub use series::{PriceBar, PriceSeries};
pub use source::{JsonFileMarketData, MarketDataSource};
