//! Sources of raw market data tables
//!
//! The pipeline depends only on [`MarketDataProvider`]; fetching, retrying and
//! storage live behind it.

use async_trait::async_trait;

use crate::domain::{ForecastTables, HistoricalTables};
use crate::error::Result;

pub mod files;

pub use files::{predictions_csv, write_predictions, CsvDirectoryProvider};

/// A provider of raw historical and forecast tables
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Settlement prices, generation and load history
    async fn historical(&self) -> Result<HistoricalTables>;

    /// Hourly load, wind and solar forecasts
    async fn forecasts(&self) -> Result<ForecastTables>;
}
