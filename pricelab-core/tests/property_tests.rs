//! Property tests for cleaner and accessor invariants.
//!
//! Uses proptest to verify:
//! 1. Cleaned series are strictly increasing, one point per day, contiguous
//! 2. Every cleaned price is strictly positive
//! 3. Every day with a positive mean keeps exactly that mean
//! 4. Cache round-trips dates exactly and prices within 1e-6
//! 5. Trailing windows have length min(n, len) and stay chronological

use chrono::{Duration, NaiveDate};
use pricelab_core::data::clean::clean;
use pricelab_core::data::query::historical_prices;
use pricelab_core::data::{RawPoint, VersionCache, VersionTag};
use proptest::prelude::*;
use std::collections::BTreeMap;

// ── Strategies (proptest) ────────────────────────────────────────────

fn base_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
}

/// Samples spread over ~60 days, with intraday offsets and some bad prices.
fn arb_sample() -> impl Strategy<Value = RawPoint> {
    (0i64..60, 0i64..86_400, -50.0..500.0_f64).prop_map(|(day, secs, price)| RawPoint {
        timestamp: (base_day() + Duration::days(day))
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            + Duration::seconds(secs),
        price: (price * 100.0).round() / 100.0,
    })
}

fn arb_batch() -> impl Strategy<Value = Vec<RawPoint>> {
    prop::collection::vec(arb_sample(), 1..80)
}

fn daily_means(batch: &[RawPoint]) -> BTreeMap<NaiveDate, f64> {
    let mut sums: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for p in batch {
        let e = sums.entry(p.day()).or_insert((0.0, 0));
        e.0 += p.price;
        e.1 += 1;
    }
    sums.into_iter()
        .map(|(d, (s, n))| (d, s / n as f64))
        .collect()
}

proptest! {
    #[test]
    fn cleaned_series_is_contiguous_and_positive(batch in arb_batch()) {
        let means = daily_means(&batch);
        let has_valid = means.values().any(|m| *m > 0.0);

        match clean(&batch) {
            Ok((ds, _)) => {
                prop_assert!(has_valid);
                prop_assert!(!ds.is_empty());
                for w in ds.points().windows(2) {
                    prop_assert_eq!(w[0].date.succ_opt(), Some(w[1].date));
                }
                for p in ds.points() {
                    prop_assert!(p.price > 0.0);
                }
            }
            Err(_) => prop_assert!(!has_valid),
        }
    }

    #[test]
    fn observed_days_keep_their_mean(batch in arb_batch()) {
        let means = daily_means(&batch);
        if let Ok((ds, _)) = clean(&batch) {
            let valid: Vec<(NaiveDate, f64)> =
                means.into_iter().filter(|(_, m)| *m > 0.0).collect();
            prop_assert_eq!(ds.first_date(), valid.first().map(|v| v.0));
            prop_assert_eq!(ds.last_date(), valid.last().map(|v| v.0));
            for (date, mean) in valid {
                let point = ds.points().iter().find(|p| p.date == date).unwrap();
                prop_assert!((point.price - mean).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn window_length_is_min_of_request_and_len(batch in arb_batch(), n in 0usize..100) {
        if let Ok((ds, _)) = clean(&batch) {
            let window = historical_prices(Some(&ds), n).unwrap();
            prop_assert_eq!(window.len(), n.min(ds.len()));
            let tail: Vec<f64> = ds.points()[ds.len() - window.len()..]
                .iter()
                .map(|p| p.price)
                .collect();
            prop_assert_eq!(window, tail);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn cache_roundtrip_is_lossless(batch in arb_batch()) {
        if let Ok((ds, _)) = clean(&batch) {
            let dir = tempfile::TempDir::new().unwrap();
            let cache = VersionCache::new(dir.path());
            let tag = VersionTag::new("prop").unwrap();
            cache.persist(&tag, &ds, "test").unwrap();
            let loaded = cache.load(&tag).unwrap().unwrap();

            prop_assert_eq!(loaded.len(), ds.len());
            for (a, b) in loaded.points().iter().zip(ds.points()) {
                prop_assert_eq!(a.date, b.date);
                prop_assert!((a.price - b.price).abs() < 1e-6);
            }
        }
    }
}
