//! Response normalizer: heterogeneous raw records → canonical `(timestamp, price)`.
//!
//! Remote payloads disagree on field names. Each logical field has an ordered
//! list of candidate keys; the first key present on the record wins and the
//! others are never consulted. A record with no usable timestamp or price is
//! dropped, never reported as an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

/// Candidate keys for the timestamp field, in lookup order.
pub const TIMESTAMP_KEYS: [&str; 3] = ["timestamp", "time", "date"];

/// Candidate keys for the price field, in lookup order.
pub const PRICE_KEYS: [&str; 2] = ["price", "close"];

const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
const OFFSET_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// A normalized but not yet cleaned sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

impl RawPoint {
    /// The UTC calendar day this sample belongs to.
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Outcome of normalizing a batch.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub points: Vec<RawPoint>,
    pub dropped: usize,
}

/// Normalize one JSON value. Non-object values are unusable records.
pub fn normalize_value(value: &Value) -> Option<RawPoint> {
    value.as_object().and_then(normalize_record)
}

/// Normalize one record, or `None` if it has no usable timestamp or price.
pub fn normalize_record(record: &Map<String, Value>) -> Option<RawPoint> {
    let ts = first_present(record, &TIMESTAMP_KEYS)?;
    let price = first_present(record, &PRICE_KEYS)?;
    Some(RawPoint {
        timestamp: parse_timestamp(ts)?,
        price: parse_price(price)?,
    })
}

/// Normalize every element of a decoded JSON array.
pub fn normalize_batch(values: &[Value]) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    for value in values {
        match normalize_value(value) {
            Some(point) => batch.points.push(point),
            None => batch.dropped += 1,
        }
    }
    if batch.dropped > 0 {
        debug!(
            kept = batch.points.len(),
            dropped = batch.dropped,
            "dropped unusable records"
        );
    }
    batch
}

/// First candidate key whose value is present and non-null.
fn first_present<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|k| record.get(*k).filter(|v| !v.is_null()))
}

/// Numbers are whole-second Unix epoch; strings are calendar date/times.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let secs = match n.as_i64() {
                Some(secs) => secs,
                None => {
                    let f = n.as_f64()?;
                    if !f.is_finite() {
                        return None;
                    }
                    f.floor() as i64
                }
            };
            DateTime::from_timestamp(secs, 0)
        }
        Value::String(s) => parse_datetime_str(s.trim()),
        _ => None,
    }
}

fn parse_datetime_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ndt.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
        }
    }
    None
}

/// Numbers pass through, strings are parsed; non-finite values are rejected.
pub fn parse_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    price.is_finite().then_some(price)
}
