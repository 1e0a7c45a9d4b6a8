//! Series alignment
//!
//! Left-joins settlement prices with generation and load on the interval key.
//! Secondary values missing at a key are forward-filled from the last key that
//! had one, in key order. Non-finite values count as missing. Stale values
//! are carried across gaps; nothing is interpolated.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::domain::{GenerationRecord, IntervalKey, LoadRecord, SettlementRecord};

/// Settlement row joined with its covariates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRow {
    pub node: String,
    pub key: IntervalKey,
    pub settlement_point_price: f64,
    pub wind_system_wide: Option<f64>,
    pub solar_system_wide: Option<f64>,
    pub load_system_total: Option<f64>,
    pub wind_zones: BTreeMap<String, f64>,
    pub solar_zones: BTreeMap<String, f64>,
}

/// Lookup keyed by interval; the first row for a key wins
fn index_by_key<'a, T>(rows: &'a [T], key: impl Fn(&T) -> IntervalKey) -> HashMap<IntervalKey, &'a T> {
    let mut index = HashMap::with_capacity(rows.len());
    for row in rows {
        index.entry(key(row)).or_insert(row);
    }
    index
}

/// Join the primary settlement series with wind, solar and load.
///
/// Output is ordered by (key, node). An empty primary yields an empty table.
pub fn align_series(
    settlement: &[SettlementRecord],
    wind: &[GenerationRecord],
    solar: &[GenerationRecord],
    load: &[LoadRecord],
) -> Vec<JoinedRow> {
    if settlement.is_empty() {
        return Vec::new();
    }

    let wind_idx = index_by_key(wind, |r| r.key);
    let solar_idx = index_by_key(solar, |r| r.key);
    let load_idx = index_by_key(load, |r| r.key);

    let mut primary: Vec<&SettlementRecord> = settlement.iter().collect();
    primary.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.node.cmp(&b.node)));

    let mut last_wind: Option<&GenerationRecord> = None;
    let mut last_solar: Option<&GenerationRecord> = None;
    let mut last_load: Option<&LoadRecord> = None;
    let mut filled = 0usize;

    let rows: Vec<JoinedRow> = primary
        .into_iter()
        .map(|spp| {
            // a NaN covariate is treated as absent and never becomes the fill value
            let wind_hit = wind_idx.get(&spp.key).copied().filter(|w| w.system_wide.is_finite());
            let solar_hit = solar_idx.get(&spp.key).copied().filter(|s| s.system_wide.is_finite());
            let load_hit = load_idx.get(&spp.key).copied().filter(|l| l.system_total.is_finite());
            if wind_hit.is_none() || solar_hit.is_none() || load_hit.is_none() {
                filled += 1;
            }
            last_wind = wind_hit.or(last_wind);
            last_solar = solar_hit.or(last_solar);
            last_load = load_hit.or(last_load);

            JoinedRow {
                node: spp.node.clone(),
                key: spp.key,
                settlement_point_price: spp.settlement_point_price,
                wind_system_wide: last_wind.map(|w| w.system_wide),
                solar_system_wide: last_solar.map(|s| s.system_wide),
                load_system_total: last_load.map(|l| l.system_total),
                wind_zones: last_wind.map(|w| w.zones.clone()).unwrap_or_default(),
                solar_zones: last_solar.map(|s| s.zones.clone()).unwrap_or_default(),
            }
        })
        .collect();

    debug!(rows = rows.len(), forward_filled = filled, "aligned settlement series");
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn key(hour: u8, interval: u8) -> IntervalKey {
        IntervalKey::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), hour, interval).unwrap()
    }

    fn spp(node: &str, k: IntervalKey, price: f64) -> SettlementRecord {
        SettlementRecord {
            node: node.into(),
            key: k,
            settlement_point_price: price,
        }
    }

    fn gen_rec(k: IntervalKey, v: f64) -> GenerationRecord {
        GenerationRecord {
            key: k,
            system_wide: v,
            zones: BTreeMap::from([("genFarWest".to_string(), v / 4.0)]),
        }
    }

    fn load(k: IntervalKey, v: f64) -> LoadRecord {
        LoadRecord {
            key: k,
            system_total: v,
        }
    }

    #[test]
    fn test_empty_primary_returns_empty() {
        let out = align_series(&[], &[gen_rec(key(0, 1), 1.0)], &[], &[load(key(0, 1), 1.0)]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_left_join_matches_keys() {
        let spps = vec![spp("HB_NORTH", key(0, 1), 10.0), spp("HB_NORTH", key(0, 2), 11.0)];
        let wind = vec![gen_rec(key(0, 1), 100.0), gen_rec(key(0, 2), 200.0)];
        let solar = vec![gen_rec(key(0, 1), 5.0), gen_rec(key(0, 2), 6.0)];
        let loads = vec![load(key(0, 1), 1000.0), load(key(0, 2), 1001.0)];

        let out = align_series(&spps, &wind, &solar, &loads);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].wind_system_wide, Some(200.0));
        assert_eq!(out[1].solar_system_wide, Some(6.0));
        assert_eq!(out[1].load_system_total, Some(1001.0));
        assert_eq!(out[1].wind_zones["genFarWest"], 50.0);
    }

    #[test]
    fn test_forward_fill_carries_stale_values_across_gaps() {
        let spps: Vec<_> = (0..8).map(|n| spp("LZ_WEST", key(0, 1).advance(n), n as f64)).collect();
        // wind only at the first key: every later row keeps that value
        let wind = vec![gen_rec(key(0, 1), 42.0)];
        let solar = vec![gen_rec(key(0, 1), 1.0), gen_rec(key(1, 1), 2.0)];
        let loads: Vec<_> = (0..8).map(|n| load(key(0, 1).advance(n), 10.0)).collect();

        let out = align_series(&spps, &wind, &solar, &loads);
        assert!(out.iter().all(|r| r.wind_system_wide == Some(42.0)));
        assert_eq!(out[3].solar_system_wide, Some(1.0));
        assert_eq!(out[4].solar_system_wide, Some(2.0));
        assert_eq!(out[7].solar_system_wide, Some(2.0));
    }

    #[test]
    fn test_leading_gap_stays_missing() {
        let spps = vec![spp("HB_NORTH", key(0, 1), 10.0), spp("HB_NORTH", key(0, 2), 11.0)];
        let loads = vec![load(key(0, 2), 7.0)];
        let out = align_series(&spps, &[], &[], &loads);
        assert_eq!(out[0].load_system_total, None);
        assert_eq!(out[1].load_system_total, Some(7.0));
        assert!(out.iter().all(|r| r.wind_system_wide.is_none()));
    }

    #[test]
    fn test_nan_covariates_are_filled_from_last_finite_value() {
        let spps: Vec<_> = (0..3).map(|n| spp("HB_WEST", key(0, 1).advance(n), 20.0)).collect();
        let wind = vec![
            gen_rec(key(0, 1), 100.0),
            gen_rec(key(0, 2), f64::NAN),
            gen_rec(key(0, 3), 300.0),
        ];
        let loads = vec![load(key(0, 1), 900.0), load(key(0, 2), f64::NAN), load(key(0, 3), f64::NAN)];

        let out = align_series(&spps, &wind, &wind, &loads);
        assert_eq!(out[1].wind_system_wide, Some(100.0));
        assert_eq!(out[1].solar_system_wide, Some(100.0));
        assert_eq!(out[1].wind_zones["genFarWest"], 25.0);
        assert_eq!(out[2].wind_system_wide, Some(300.0));
        assert!(out.iter().all(|r| r.load_system_total == Some(900.0)));
    }

    #[test]
    fn test_leading_nan_covariate_stays_missing() {
        let spps = vec![spp("HB_WEST", key(0, 1), 20.0), spp("HB_WEST", key(0, 2), 21.0)];
        let loads = vec![load(key(0, 1), f64::NAN), load(key(0, 2), 5.0)];
        let out = align_series(&spps, &[], &[], &loads);
        assert_eq!(out[0].load_system_total, None);
        assert_eq!(out[1].load_system_total, Some(5.0));
    }

    #[test]
    fn test_output_ordered_by_key_then_node() {
        let spps = vec![
            spp("LZ_WEST", key(0, 2), 1.0),
            spp("HB_NORTH", key(0, 2), 2.0),
            spp("LZ_WEST", key(0, 1), 3.0),
        ];
        let out = align_series(&spps, &[], &[], &[]);
        let order: Vec<_> = out.iter().map(|r| (r.key, r.node.as_str())).collect();
        assert_eq!(
            order,
            vec![(key(0, 1), "LZ_WEST"), (key(0, 2), "HB_NORTH"), (key(0, 2), "LZ_WEST")]
        );
    }

    proptest! {
        #[test]
        fn prop_alignment_is_idempotent(
            prices in proptest::collection::vec(-50.0f64..500.0, 1..60),
            wind_mask in proptest::collection::vec(any::<bool>(), 60),
        ) {
            let spps: Vec<_> = prices
                .iter()
                .enumerate()
                .map(|(n, p)| spp("HB_HOUSTON", key(0, 1).advance(n as i64), *p))
                .collect();
            let wind: Vec<_> = wind_mask
                .iter()
                .enumerate()
                .filter(|(_, keep)| **keep)
                .map(|(n, _)| gen_rec(key(0, 1).advance(n as i64), n as f64))
                .collect();
            let loads: Vec<_> = (0..60).map(|n| load(key(0, 1).advance(n), 1.0)).collect();

            let first = align_series(&spps, &wind, &[], &loads);
            let second = align_series(&spps, &wind, &[], &loads);
            prop_assert_eq!(first.len(), spps.len());
            prop_assert_eq!(first, second);
        }
    }
}
