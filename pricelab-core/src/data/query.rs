//! Read accessors over the current Dataset.
//!
//! `None` means "no Dataset loaded". A loaded but empty Dataset is not
//! absence: it yields an empty window.

use super::schema::{Dataset, PricePoint};

/// Price of the most recent point; `None` if unset or empty.
pub fn latest_price(dataset: Option<&Dataset>) -> Option<f64> {
    dataset.and_then(|ds| ds.points().last()).map(|p| p.price)
}

/// The trailing `min(days, len)` points, oldest first.
pub fn historical_points(dataset: Option<&Dataset>, days: usize) -> Option<&[PricePoint]> {
    dataset.map(|ds| {
        let points = ds.points();
        &points[points.len().saturating_sub(days)..]
    })
}

/// The trailing `min(days, len)` prices, oldest first.
pub fn historical_prices(dataset: Option<&Dataset>, days: usize) -> Option<Vec<f64>> {
    historical_points(dataset, days).map(|pts| pts.iter().map(|p| p.price).collect())
}
