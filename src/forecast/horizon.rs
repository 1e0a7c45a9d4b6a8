//! Forecast horizon construction
//!
//! Lays out a contiguous 15-minute calendar starting one interval after the
//! latest historical settlement interval and joins the normalized load, wind
//! and solar forecasts onto it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use super::features::ModelInputs;
use crate::config::HorizonConfig;
use crate::domain::{ForecastProduct, ForecastRecord, IntervalKey, SettlementRecord, INTERVALS_PER_DAY};

/// One scoreable interval of the horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonRow {
    pub key: IntervalKey,
    pub inputs: ModelInputs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastHorizon {
    /// First interval of the calendar
    pub start: IntervalKey,
    /// Calendar length before incomplete rows were dropped
    pub calendar_len: usize,
    /// Complete rows in key order; may be shorter than the calendar
    pub rows: Vec<HorizonRow>,
}

impl ForecastHorizon {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Last interval of the calendar
    pub fn end(&self) -> IntervalKey {
        self.start.advance(self.calendar_len as i64 - 1)
    }
}

/// Latest interval across every settlement series
pub fn latest_settlement_key(settlement: &[SettlementRecord]) -> Option<IntervalKey> {
    settlement.iter().map(|r| r.key).max()
}

/// `len` consecutive keys starting at `start`
pub fn build_calendar(start: IntervalKey, len: usize) -> Vec<IntervalKey> {
    (0..len as i64).map(|n| start.advance(n)).collect()
}

fn index(product: ForecastProduct, rows: &[ForecastRecord], calendar: &[IntervalKey]) -> HashMap<IntervalKey, f64> {
    let mut index = HashMap::with_capacity(rows.len());
    for row in rows.iter().filter(|r| r.value.is_finite()) {
        index.entry(row.key).or_insert(row.value);
    }
    let covered = calendar.iter().filter(|k| index.contains_key(k)).count();
    if covered == 0 {
        warn!(%product, "forecast has no rows inside the horizon");
    } else if covered < calendar.len() {
        debug!(%product, covered, calendar = calendar.len(), "forecast covers part of the horizon");
    }
    index
}

/// Build the future feature table.
///
/// The calendar holds `days * 96` intervals beginning right after `latest`.
/// Rows lacking any forecast value are dropped, so the horizon may be short.
pub fn build_horizon(
    latest: IntervalKey,
    load: &[ForecastRecord],
    wind: &[ForecastRecord],
    solar: &[ForecastRecord],
    cfg: &HorizonConfig,
) -> ForecastHorizon {
    let start = latest.next();
    let calendar = build_calendar(start, cfg.days as usize * INTERVALS_PER_DAY);

    let load_idx = index(ForecastProduct::Load, load, &calendar);
    let wind_idx = index(ForecastProduct::Wind, wind, &calendar);
    let solar_idx = index(ForecastProduct::Solar, solar, &calendar);

    let rows: Vec<HorizonRow> = calendar
        .iter()
        .filter_map(|&key| {
            ModelInputs::from_parts(
                key,
                wind_idx.get(&key).copied(),
                solar_idx.get(&key).copied(),
                load_idx.get(&key).copied(),
            )
            .map(|inputs| HorizonRow { key, inputs })
        })
        .collect();

    debug!(
        start = %start,
        calendar = calendar.len(),
        rows = rows.len(),
        "built forecast horizon"
    );

    ForecastHorizon {
        start,
        calendar_len: calendar.len(),
        rows,
    }
}
