//! Aggregate price metrics over a record set.

use serde::Serialize;

use super::PriceRecord;

/// Aggregate over the positive prices of a record set.
///
/// Every field is zero when no record has a price above zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PriceStatistics {
    /// Arithmetic mean, rounded to 2 decimal places.
    pub average: f64,
    /// Lowest price.
    pub min: f64,
    /// Highest price.
    pub max: f64,
    /// Number of records with a positive price.
    pub count: usize,
    /// `max - min`, rounded to 2 decimal places.
    pub range: f64,
    /// `(max - min) / max * 100`, rounded to 1 decimal place; 0 when `max` is 0.
    pub range_percent: f64,
}

impl PriceStatistics {
    /// Computes statistics over `records`.
    ///
    /// Zero and negative prices are data artifacts and are excluded here,
    /// although the records themselves still appear in listings.
    #[must_use]
    pub fn compute(records: &[PriceRecord]) -> Self {
        Self::from_prices(records.iter().map(|r| r.price))
    }

    /// Computes statistics over raw prices.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // record counts are far below 2^52
    pub fn from_prices(prices: impl IntoIterator<Item = f64>) -> Self {
        let prices: Vec<f64> = prices.into_iter().filter(|p| *p > 0.0).collect();
        if prices.is_empty() {
            return Self::default();
        }

        let count = prices.len();
        let sum: f64 = prices.iter().sum();
        let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
        let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        let range_percent = if max > 0.0 { range / max * 100.0 } else { 0.0 };

        Self {
            average: round_to(sum / count as f64, 2),
            min,
            max,
            count,
            range: round_to(range, 2),
            range_percent: round_to(range_percent, 1),
        }
    }

    /// Returns `true` when no positive price contributed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Rounds half away from zero to `places` decimal places.
#[must_use]
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}
