//! Settlement point price forecasting
//!
//! Reshapes settlement prices, wind and solar generation, system load and
//! their forecasts onto a common 15-minute calendar, fits a gradient-boosted
//! tree model on the history and forecasts each node's price over the next
//! days.

pub mod config;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod ml;
pub mod provider;
pub mod telemetry;

pub use error::{ForecastError, Result};
