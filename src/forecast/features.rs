//! Feature engineering for the settlement price model
//!
//! Builds the historical training table from aligned rows: outlier clipping
//! on the target, calendar features, and per-node lag and rolling features.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use tracing::debug;

use super::align::JoinedRow;
use crate::config::FeatureConfig;
use crate::domain::{CalendarFeatures, IntervalKey};

/// Column names of the model input matrix, in order
pub const MODEL_FEATURES: [&str; 8] = [
    "deliveryHour",
    "deliveryInterval",
    "DayOfWeek",
    "Month",
    "Year",
    "windSystemWide",
    "solarSystemWide",
    "loadSystemTotal",
];

/// Inputs consumed by the predictor, shared by historical and horizon rows
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelInputs {
    pub delivery_hour: u8,
    pub delivery_interval: u8,
    pub calendar: CalendarFeatures,
    pub wind_system_wide: f64,
    pub solar_system_wide: f64,
    pub load_system_total: f64,
}

impl ModelInputs {
    /// Inputs for `key`, or None when any covariate is missing
    pub fn from_parts(
        key: IntervalKey,
        wind: Option<f64>,
        solar: Option<f64>,
        load: Option<f64>,
    ) -> Option<Self> {
        Some(Self {
            delivery_hour: key.delivery_hour,
            delivery_interval: key.delivery_interval,
            calendar: key.calendar(),
            wind_system_wide: finite(wind?)?,
            solar_system_wide: finite(solar?)?,
            load_system_total: finite(load?)?,
        })
    }

    /// Values in `MODEL_FEATURES` order
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.delivery_hour as f64,
            self.delivery_interval as f64,
            self.calendar.day_of_week as f64,
            self.calendar.month as f64,
            self.calendar.year as f64,
            self.wind_system_wide,
            self.solar_system_wide,
            self.load_system_total,
        ]
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Bounds applied to the target before training
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipBounds {
    pub lower: f64,
    pub upper: f64,
}

impl ClipBounds {
    /// Quantile bounds over the finite values of the whole table, with linear
    /// interpolation between order statistics
    pub fn from_quantiles(values: &[f64], lower_q: f64, upper_q: f64) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);
        Some(Self {
            lower: quantile(&sorted, lower_q),
            upper: quantile(&sorted, upper_q),
        })
    }

    pub fn clip(&self, value: f64) -> f64 {
        value.clamp(self.lower, self.upper)
    }
}

/// Quantile of an ascending slice, interpolating linearly
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// One complete row of the historical training table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub node: String,
    pub key: IntervalKey,
    pub inputs: ModelInputs,
    /// Clipped settlement price (training label)
    pub settlement_point_price: f64,
    /// Past clipped prices keyed by offset in intervals
    pub lags: BTreeMap<usize, f64>,
    /// Trailing mean of the lag-1 series
    pub rolling_mean: f64,
    /// Trailing sample standard deviation of the lag-1 series
    pub rolling_std: f64,
}

/// Output of the feature engineer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    /// Rows ordered by (node, key)
    pub rows: Vec<FeatureRow>,
    pub clip: Option<ClipBounds>,
    /// Rows removed for missing features
    pub dropped: usize,
}

impl FeatureTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn nodes(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.node.as_str()).dedup().collect()
    }

    /// Rows belonging to one node
    pub fn for_node<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a FeatureRow> + 'a {
        self.rows.iter().filter(move |r| r.node == node)
    }
}

/// Names of the lag and rolling columns produced for `cfg`.
///
/// These are computed alongside the model inputs but are not part of
/// `MODEL_FEATURES`.
pub fn engineered_feature_names(cfg: &FeatureConfig) -> Vec<String> {
    cfg.lags
        .iter()
        .map(|lag| format!("Lag_{lag}"))
        .chain([
            format!("RollingMean_{}", cfg.rolling_window),
            format!("RollingStd_{}", cfg.rolling_window),
        ])
        .collect()
}

/// Shift a series forward by `offset` positions
pub fn shift(values: &[f64], offset: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| i.checked_sub(offset).map(|j| values[j]))
        .collect()
}

/// Trailing (mean, sample std) over `window` values ending at each position;
/// None until the window holds `window` present values
pub fn rolling_mean_std(values: &[Option<f64>], window: usize) -> Vec<Option<(f64, f64)>> {
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let slice: Option<Vec<f64>> = values[i + 1 - window..=i].iter().copied().collect();
            slice.map(|w| (w.iter().mean(), w.iter().std_dev()))
        })
        .collect()
}

/// Build the historical feature table.
///
/// Prices are clipped to the configured quantiles of the full table, rows are
/// ordered by (node, key), lags and rolling statistics are computed per node on
/// the clipped series, and any row missing a covariate, label, lag or rolling
/// value is dropped. Non-finite values count as missing.
pub fn build_features(joined: &[JoinedRow], cfg: &FeatureConfig) -> FeatureTable {
    let prices: Vec<f64> = joined.iter().map(|r| r.settlement_point_price).collect();
    let Some(clip) =
        ClipBounds::from_quantiles(&prices, cfg.clip_lower_quantile, cfg.clip_upper_quantile)
    else {
        return FeatureTable::default();
    };

    let mut ordered: Vec<&JoinedRow> = joined.iter().collect();
    ordered.sort_by(|a, b| a.node.cmp(&b.node).then_with(|| a.key.cmp(&b.key)));

    let mut rows = Vec::with_capacity(ordered.len());
    let mut dropped = 0usize;

    for (_, group) in &ordered.into_iter().chunk_by(|r| r.node.clone()) {
        let series: Vec<&JoinedRow> = group.collect();
        let clipped: Vec<f64> = series
            .iter()
            .map(|r| clip.clip(r.settlement_point_price))
            .collect();
        let lagged: Vec<(usize, Vec<Option<f64>>)> = cfg
            .lags
            .iter()
            .map(|&lag| (lag, shift(&clipped, lag)))
            .collect();
        let rolling = rolling_mean_std(&shift(&clipped, 1), cfg.rolling_window);

        for (i, row) in series.iter().enumerate() {
            let inputs = ModelInputs::from_parts(
                row.key,
                row.wind_system_wide,
                row.solar_system_wide,
                row.load_system_total,
            );
            // a NaN price counts as missing, both as a label and inside lags
            let label = finite(clipped[i]);
            let lags: Option<BTreeMap<usize, f64>> = lagged
                .iter()
                .map(|(lag, values)| values[i].and_then(finite).map(|v| (*lag, v)))
                .collect();
            let rolling_stats = rolling[i].filter(|(m, s)| m.is_finite() && s.is_finite());

            match (inputs, label, lags, rolling_stats) {
                (Some(inputs), Some(label), Some(lags), Some((rolling_mean, rolling_std))) => {
                    rows.push(FeatureRow {
                        node: row.node.clone(),
                        key: row.key,
                        inputs,
                        settlement_point_price: label,
                        lags,
                        rolling_mean,
                        rolling_std,
                    })
                }
                _ => dropped += 1,
            }
        }
    }

    debug!(
        rows = rows.len(),
        dropped,
        clip_lower = clip.lower,
        clip_upper = clip.upper,
        "built feature table"
    );

    FeatureTable {
        rows,
        clip: Some(clip),
        dropped,
    }
}
