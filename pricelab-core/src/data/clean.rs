//! Validator/cleaner: unordered raw samples → contiguous daily Dataset.
//!
//! Steps, in order:
//! 1. collapse same-day samples to their arithmetic mean
//! 2. drop non-positive (and non-finite) prices
//! 3. sort ascending by day
//! 4. resample to one slot per calendar day between first and last day
//! 5. linearly interpolate interior gaps by day distance
//! 6. forward-fill trailing gaps
//!
//! A leading gap has no predecessor and is left unresolved: those slots stay
//! `None` and do not appear in the Dataset. No price is invented before the
//! first observation.
//!
//! Each step is a pure function so it can be tested on its own.

use super::normalize::RawPoint;
use super::provider::DataError;
use super::schema::{Dataset, PricePoint};
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{info, warn};

/// Widest first-to-last span, in days, the resampler will materialize.
pub const MAX_SPAN_DAYS: i64 = 100_000;

/// One calendar day on the resampled grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub date: NaiveDate,
    pub price: Option<f64>,
}

/// What cleaning did to a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub input_points: usize,
    pub distinct_days: usize,
    pub dropped_non_positive: usize,
    pub interpolated: usize,
    pub forward_filled: usize,
}

/// Run the full cleaning pipeline.
///
/// Fails with [`DataError::Validation`] when no positive sample survives, so
/// an empty series can never reach the cache.
pub fn clean(points: &[RawPoint]) -> Result<(Dataset, CleanReport), DataError> {
    let mut report = CleanReport {
        input_points: points.len(),
        ..Default::default()
    };

    let daily = dedup_by_day(points);
    report.distinct_days = daily.len();

    let mut daily = filter_positive(daily);
    report.dropped_non_positive = report.distinct_days - daily.len();
    if daily.is_empty() {
        return Err(DataError::Validation(format!(
            "no valid price points ({} input, {} distinct days, all rejected)",
            report.input_points, report.distinct_days
        )));
    }

    sort_by_day(&mut daily);
    check_span(&daily)?;
    let mut slots = resample_daily(&daily);
    report.interpolated = interpolate_interior(&mut slots);
    report.forward_filled = forward_fill(&mut slots);

    let dataset = Dataset::new(
        slots
            .iter()
            .filter_map(|s| s.price.map(|p| PricePoint::new(s.date, p)))
            .collect(),
    )?;

    info!(
        input = report.input_points,
        days = dataset.len(),
        interpolated = report.interpolated,
        dropped = report.dropped_non_positive,
        "cleaned price series"
    );
    Ok((dataset, report))
}

/// Collapse samples sharing a UTC calendar day to their mean.
///
/// Output order is unspecified; [`sort_by_day`] establishes it.
pub fn dedup_by_day(points: &[RawPoint]) -> Vec<(NaiveDate, f64)> {
    let mut buckets: HashMap<NaiveDate, (f64, usize)> = HashMap::new();
    for p in points {
        let entry = buckets.entry(p.day()).or_insert((0.0, 0));
        entry.0 += p.price;
        entry.1 += 1;
    }
    buckets
        .into_iter()
        .map(|(date, (sum, n))| (date, sum / n as f64))
        .collect()
}

/// Keep only strictly positive, finite prices.
pub fn filter_positive(daily: Vec<(NaiveDate, f64)>) -> Vec<(NaiveDate, f64)> {
    daily
        .into_iter()
        .filter(|(_, price)| price.is_finite() && *price > 0.0)
        .collect()
}

pub fn sort_by_day(daily: &mut [(NaiveDate, f64)]) {
    daily.sort_by_key(|(date, _)| *date);
}

/// Reject a sorted series whose span would need more than [`MAX_SPAN_DAYS`]
/// slots; a single stray far-future timestamp would otherwise blow up the grid.
pub fn check_span(daily: &[(NaiveDate, f64)]) -> Result<(), DataError> {
    let (Some(first), Some(last)) = (daily.first(), daily.last()) else {
        return Ok(());
    };
    let span = (last.0 - first.0).num_days();
    if span > MAX_SPAN_DAYS {
        warn!(first = %first.0, last = %last.0, span, "price series span too wide");
        return Err(DataError::Validation(format!(
            "series spans {span} days ({} to {}), limit is {MAX_SPAN_DAYS}",
            first.0, last.0
        )));
    }
    Ok(())
}

/// Build one slot per day from the first to the last day of a sorted,
/// de-duplicated series. Days without a sample get `None`.
pub fn resample_daily(daily: &[(NaiveDate, f64)]) -> Vec<Slot> {
    let (Some(first), Some(last)) = (daily.first(), daily.last()) else {
        return Vec::new();
    };
    let mut known = daily.iter().peekable();
    first
        .0
        .iter_days()
        .take_while(|d| *d <= last.0)
        .map(|date| {
            let price = match known.peek() {
                Some((d, p)) if *d == date => {
                    known.next();
                    Some(*p)
                }
                _ => None,
            };
            Slot { date, price }
        })
        .collect()
}

/// Fill every `None` that has a known slot on both sides by linear
/// interpolation on day distance. Returns the number of slots filled.
pub fn interpolate_interior(slots: &mut [Slot]) -> usize {
    let mut filled = 0;
    let mut prev_known: Option<(usize, f64)> = None;
    for j in 0..slots.len() {
        let Some(pj) = slots[j].price else { continue };
        if let Some((i, pi)) = prev_known {
            let span = (j - i) as f64;
            for (k, slot) in slots.iter_mut().enumerate().take(j).skip(i + 1) {
                let w = (k - i) as f64 / span;
                slot.price = Some(pi + (pj - pi) * w);
                filled += 1;
            }
        }
        prev_known = Some((j, pj));
    }
    filled
}

/// Carry the last known price into any later `None`. Leading `None`s, which
/// have no predecessor, are untouched. Returns the number of slots filled.
pub fn forward_fill(slots: &mut [Slot]) -> usize {
    let mut filled = 0;
    let mut last: Option<f64> = None;
    for slot in slots.iter_mut() {
        match slot.price {
            Some(p) => last = Some(p),
            None => {
                if let Some(p) = last {
                    slot.price = Some(p);
                    filled += 1;
                }
            }
        }
    }
    filled
}
