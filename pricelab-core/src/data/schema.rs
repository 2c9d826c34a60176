//! Canonical price series types.

use super::provider::DataError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One daily sample: a UTC calendar day and a strictly positive price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, price: f64) -> Self {
        Self { date, price }
    }
}

/// An ordered, gap-free daily price series.
///
/// Invariants (checked by [`Dataset::new`]):
/// - dates strictly increasing, one point per calendar day
/// - every day between the first and last date is present
/// - every price is finite and `> 0`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PricePoint>", into = "Vec<PricePoint>")]
pub struct Dataset {
    points: Vec<PricePoint>,
}

impl Dataset {
    /// Build a Dataset, rejecting any sequence that breaks the invariants.
    pub fn new(points: Vec<PricePoint>) -> Result<Self, DataError> {
        for (i, p) in points.iter().enumerate() {
            if !(p.price.is_finite() && p.price > 0.0) {
                return Err(DataError::Validation(format!(
                    "non-positive price {} on {}",
                    p.price, p.date
                )));
            }
            if i > 0 {
                let prev = points[i - 1].date;
                if prev.succ_opt() != Some(p.date) {
                    return Err(DataError::Validation(format!(
                        "dates not contiguous: {prev} followed by {}",
                        p.date
                    )));
                }
            }
        }
        Ok(Self { points })
    }

    /// An empty series. Useful as a present-but-empty value; never persisted.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// Deterministic BLAKE3 hash over dates and prices.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for p in &self.points {
            hasher.update(p.date.to_string().as_bytes());
            hasher.update(&p.price.to_le_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Key naming one cached snapshot. One tag, one cache file.
///
/// Restricted to ASCII alphanumerics, `.`, `_` and `-` so the derived file
/// name always stays inside the cache directory.
impl TryFrom<Vec<PricePoint>> for Dataset {
    type Error = DataError;

    fn try_from(points: Vec<PricePoint>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<Dataset> for Vec<PricePoint> {
    fn from(dataset: Dataset) -> Self {
        dataset.points
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionTag(String);

impl VersionTag {
    pub fn new(tag: impl Into<String>) -> Result<Self, DataError> {
        let tag = tag.into();
        let valid = !tag.is_empty()
            && tag != "."
            && tag != ".."
            && tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid {
            return Err(DataError::Validation(format!("invalid version tag '{tag}'")));
        }
        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for VersionTag {
    type Error = DataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VersionTag> for String {
    fn from(tag: VersionTag) -> Self {
        tag.0
    }
}
