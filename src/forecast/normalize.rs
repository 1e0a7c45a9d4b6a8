//! Interval normalization
//!
//! Maps heterogeneous source series onto the common 15-minute calendar:
//! - 5-minute and interval readings are summed into the interval that contains
//!   the start of their period
//! - hourly values become four quarter-hour rows, either split evenly
//!   (additive quantities) or replicated (level covariates)
//! - settlement prices arrive already keyed, in hour-ending form

use chrono::{Duration, NaiveDateTime};
use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::{
    hour_start, parse_calendar_date, parse_hour_ending, parse_timestamp, ForecastProduct,
    ForecastRecord, GenerationRecord, IntervalKey, LoadRecord, RawGenerationReading,
    RawHourlyForecast, RawHourlyLoad, RawSettlementPrice, SettlementRecord, INTERVALS_PER_HOUR,
};
use crate::error::{ForecastError, Result};

/// Native sampling period of a source series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    FiveMinute,
    /// Already at 15-minute resolution
    Interval,
    Hourly,
}

impl Granularity {
    pub fn period(&self) -> Duration {
        match self {
            Granularity::FiveMinute => Duration::minutes(5),
            Granularity::Interval => Duration::minutes(15),
            Granularity::Hourly => Duration::hours(1),
        }
    }
}

/// How an hourly value is spread over its four intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HourlyPolicy {
    /// Additive quantity: each interval receives a quarter
    Split,
    /// Level covariate: each interval receives the full value
    Replicate,
}

impl ForecastProduct {
    /// Load forecasts are energy and are split to match the historical load
    /// expansion; wind and solar forecasts are replicated.
    pub fn hourly_policy(&self) -> HourlyPolicy {
        match self {
            ForecastProduct::Load => HourlyPolicy::Split,
            ForecastProduct::Wind | ForecastProduct::Solar => HourlyPolicy::Replicate,
        }
    }
}

/// Expand one hourly value onto the four intervals of the hour starting at `start`
pub fn expand_hourly(start: NaiveDateTime, value: f64, policy: HourlyPolicy) -> [(IntervalKey, f64); 4] {
    let share = match policy {
        HourlyPolicy::Split => value / INTERVALS_PER_HOUR as f64,
        HourlyPolicy::Replicate => value,
    };
    IntervalKey::quarters_of(start).map(|key| (key, share))
}

/// Normalize published settlement prices.
///
/// Hour-ending 1-24 becomes hour-beginning 0-23. Output is sorted by
/// (key, node) and holds one row per node and key; later duplicates are dropped.
pub fn normalize_settlement<'a>(
    rows: impl IntoIterator<Item = &'a RawSettlementPrice>,
) -> Result<Vec<SettlementRecord>> {
    const TABLE: &str = "settlement";

    let mut out = Vec::new();
    for (idx, row) in rows.into_iter().enumerate() {
        let date = parse_calendar_date(&row.delivery_date).ok_or_else(|| {
            ForecastError::invalid_record(TABLE, idx, format!("bad deliveryDate '{}'", row.delivery_date))
        })?;
        if !(1..=24).contains(&row.delivery_hour) {
            return Err(ForecastError::invalid_record(
                TABLE,
                idx,
                format!("deliveryHour {} outside 1-24", row.delivery_hour),
            ));
        }
        if !(1..=INTERVALS_PER_HOUR as i64).contains(&row.delivery_interval) {
            return Err(ForecastError::invalid_record(
                TABLE,
                idx,
                format!("deliveryInterval {} outside 1-4", row.delivery_interval),
            ));
        }
        let key = IntervalKey::new(
            date,
            (row.delivery_hour - 1) as u8,
            row.delivery_interval as u8,
        )?;
        out.push(SettlementRecord {
            node: row.settlement_point.clone(),
            key,
            settlement_point_price: row.settlement_point_price,
        });
    }

    out.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.node.cmp(&b.node)));
    let before = out.len();
    out.dedup_by(|later, earlier| later.key == earlier.key && later.node == earlier.node);
    if out.len() < before {
        debug!(dropped = before - out.len(), "dropped duplicate settlement rows");
    }
    Ok(out)
}

/// Normalize wind or solar generation readings.
///
/// Readings are ordered by `intervalEnding` and only the first reading per
/// timestamp is kept, then readings are summed per interval. Missing (NaN)
/// readings are skipped; an interval without any finite reading is NaN.
/// Hourly readings are split evenly since generation is additive.
pub fn normalize_generation(
    table: &str,
    rows: &[RawGenerationReading],
    granularity: Granularity,
) -> Result<Vec<GenerationRecord>> {
    let mut stamped = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let ending = parse_timestamp(&row.interval_ending).ok_or_else(|| {
            ForecastError::invalid_record(table, idx, format!("bad intervalEnding '{}'", row.interval_ending))
        })?;
        stamped.push((ending, row));
    }
    // stable: duplicates keep source order
    stamped.sort_by_key(|(ending, _)| *ending);
    let before = stamped.len();
    stamped.dedup_by_key(|(ending, _)| *ending);
    if stamped.len() < before {
        debug!(table, dropped = before - stamped.len(), "dropped duplicate generation readings");
    }

    // sums start as NaN so an interval with no finite reading stays missing
    let mut by_key: BTreeMap<IntervalKey, GenerationRecord> = BTreeMap::new();
    let mut accumulate = |key: IntervalKey, share: f64, row: &RawGenerationReading| {
        let entry = by_key.entry(key).or_insert_with(|| GenerationRecord {
            key,
            system_wide: f64::NAN,
            zones: BTreeMap::new(),
        });
        add_finite(&mut entry.system_wide, row.system_wide * share);
        for (zone, value) in &row.zones {
            add_finite(entry.zones.entry(zone.clone()).or_insert(f64::NAN), value * share);
        }
    };

    for (ending, row) in stamped {
        let start = ending - granularity.period();
        match granularity {
            Granularity::FiveMinute | Granularity::Interval => {
                accumulate(IntervalKey::containing(start), 1.0, row)
            }
            Granularity::Hourly => {
                for (key, share) in expand_hourly(start, 1.0, HourlyPolicy::Split) {
                    accumulate(key, share, row);
                }
            }
        }
    }

    Ok(by_key.into_values().collect())
}

fn add_finite(sum: &mut f64, value: f64) {
    if value.is_finite() {
        *sum = if sum.is_nan() { value } else { *sum + value };
    }
}

/// Expand hourly actual load into quarter-hour shares of the hourly total
pub fn normalize_load(rows: &[RawHourlyLoad]) -> Result<Vec<LoadRecord>> {
    const TABLE: &str = "load";

    let mut out = Vec::with_capacity(rows.len() * 4);
    for (idx, row) in rows.iter().enumerate() {
        let start = hourly_start(TABLE, idx, &row.oper_day, &row.hour_ending)?;
        out.extend(
            expand_hourly(start, row.total, HourlyPolicy::Split)
                .into_iter()
                .map(|(key, system_total)| LoadRecord { key, system_total }),
        );
    }
    out.sort_by_key(|r| r.key);
    Ok(out)
}

/// Expand an hourly forecast feed using the product's hourly policy
pub fn normalize_forecast(
    product: ForecastProduct,
    rows: &[RawHourlyForecast],
) -> Result<Vec<ForecastRecord>> {
    let table = format!("{product}_forecast");
    let policy = product.hourly_policy();

    let mut out = Vec::with_capacity(rows.len() * 4);
    for (idx, row) in rows.iter().enumerate() {
        let start = hourly_start(&table, idx, &row.delivery_date, &row.hour_ending)?;
        out.extend(
            expand_hourly(start, row.value, policy)
                .into_iter()
                .map(|(key, value)| ForecastRecord { key, value }),
        );
    }
    out.sort_by_key(|r| r.key);
    Ok(out)
}

fn hourly_start(table: &str, idx: usize, date: &str, hour_ending: &str) -> Result<NaiveDateTime> {
    let date = parse_calendar_date(date)
        .ok_or_else(|| ForecastError::invalid_record(table, idx, format!("bad date '{date}'")))?;
    let he = parse_hour_ending(hour_ending).ok_or_else(|| {
        ForecastError::invalid_record(table, idx, format!("bad HourEnding '{hour_ending}'"))
    })?;
    Ok(hour_start(date, he))
}
