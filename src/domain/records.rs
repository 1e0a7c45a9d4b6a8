use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::interval::{parse_calendar_date, parse_timestamp, IntervalKey};

// ============================================================================
// Raw source rows
// ============================================================================

/// Settlement point price row as published, hour-ending convention (1-24)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSettlementPrice {
    pub delivery_date: String,
    pub delivery_hour: i64,
    pub delivery_interval: i64,
    pub settlement_point: String,
    pub settlement_point_price: f64,
}

/// One 5-minute generation reading (wind or solar)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawGenerationReading {
    /// End of the 5-minute period the reading covers
    pub interval_ending: String,
    pub system_wide: f64,
    /// Zone-level generation keyed by source column name
    pub zones: BTreeMap<String, f64>,
}

/// Hourly actual system load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHourlyLoad {
    pub oper_day: String,
    pub hour_ending: String,
    pub total: f64,
}

/// Hourly forecast value for one product (load, wind or solar)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHourlyForecast {
    pub delivery_date: String,
    pub hour_ending: String,
    pub value: f64,
}

// ============================================================================
// Normalized rows keyed by IntervalKey
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub node: String,
    pub key: IntervalKey,
    pub settlement_point_price: f64,
}

/// Generation summed to one 15-minute interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub key: IntervalKey,
    pub system_wide: f64,
    pub zones: BTreeMap<String, f64>,
}

/// Quarter-hour share of an hourly load value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRecord {
    pub key: IntervalKey,
    pub system_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub key: IntervalKey,
    pub value: f64,
}

/// Forecast price for one node and interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub node: String,
    pub key: IntervalKey,
    pub settlement_point_price: f64,
}

/// Forecast products consumed by the horizon builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ForecastProduct {
    Load,
    Wind,
    Solar,
}

// ============================================================================
// Input snapshots
// ============================================================================

/// Historical inputs for one forecast run
#[derive(Debug, Clone, Default)]
pub struct HistoricalTables {
    pub settlement_hubs: Vec<RawSettlementPrice>,
    pub settlement_load_zones: Vec<RawSettlementPrice>,
    pub wind: Vec<RawGenerationReading>,
    pub solar: Vec<RawGenerationReading>,
    pub load: Vec<RawHourlyLoad>,
}

impl HistoricalTables {
    /// Hub and load-zone settlement rows in source order, hubs first
    pub fn settlement(&self) -> impl Iterator<Item = &RawSettlementPrice> {
        self.settlement_hubs
            .iter()
            .chain(self.settlement_load_zones.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.settlement_hubs.is_empty() && self.settlement_load_zones.is_empty()
    }

    /// Drop rows older than `days` before the latest settlement date.
    ///
    /// Rows whose date cannot be parsed are kept so the normalizer reports them.
    pub fn retain_recent_days(&mut self, days: u32) {
        let Some(latest) = self
            .settlement()
            .filter_map(|r| parse_calendar_date(&r.delivery_date))
            .max()
        else {
            return;
        };
        let cutoff = latest - Duration::days(days as i64);
        let keep = |date: Option<NaiveDate>| date.map_or(true, |d| d >= cutoff);

        self.settlement_hubs
            .retain(|r| keep(parse_calendar_date(&r.delivery_date)));
        self.settlement_load_zones
            .retain(|r| keep(parse_calendar_date(&r.delivery_date)));
        self.wind
            .retain(|r| keep(parse_timestamp(&r.interval_ending).map(|ts| ts.date())));
        self.solar
            .retain(|r| keep(parse_timestamp(&r.interval_ending).map(|ts| ts.date())));
        self.load.retain(|r| keep(parse_calendar_date(&r.oper_day)));
    }
}

/// Hourly forecast feeds for the horizon
#[derive(Debug, Clone, Default)]
pub struct ForecastTables {
    pub load: Vec<RawHourlyForecast>,
    pub wind: Vec<RawHourlyForecast>,
    pub solar: Vec<RawHourlyForecast>,
}

impl ForecastTables {
    pub fn product(&self, product: ForecastProduct) -> &[RawHourlyForecast] {
        match product {
            ForecastProduct::Load => &self.load,
            ForecastProduct::Wind => &self.wind,
            ForecastProduct::Solar => &self.solar,
        }
    }
}
