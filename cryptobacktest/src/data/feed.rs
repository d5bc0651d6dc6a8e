//! Information feed: the ordered price history the engine replays.
//!
//! The controller only depends on [`PriceSource`]; where the bars came from
//! (CSV, an exchange API, a synthetic generator) is not its concern.

use chrono::{Duration, NaiveDate};

use crate::error::DataError;
use crate::volatility::{monthly_last, RealizedVolatility, VolatilityEstimator};

use super::types::{PricePoint, VolatilityEstimate};

/// Read-only access to a date-ordered price history.
pub trait PriceSource {
    /// All loaded points, ordered by date.
    fn prices(&self) -> &[PricePoint];

    /// The latest point at or before `date`.
    ///
    /// Fails with [`DataError::OutOfRange`] if `date` precedes the first
    /// point or follows the last one.
    fn as_of(&self, date: NaiveDate) -> Result<PricePoint, DataError>;

    /// Pass-through to a volatility estimator over the full history.
    fn volatility(
        &self,
        estimator: &dyn VolatilityEstimator,
    ) -> Result<Vec<VolatilityEstimate>, DataError> {
        Ok(estimator.estimate(self.prices())?.collect())
    }
}

/// In-memory price history.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    points: Vec<PricePoint>,
}

impl PriceHistory {
    /// Build a history, validating that dates strictly increase and prices
    /// are positive.
    pub fn new(points: Vec<PricePoint>) -> Result<Self, DataError> {
        if points.is_empty() {
            return Err(DataError::EmptyHistory);
        }

        for point in &points {
            if !(point.price > 0.0) {
                return Err(DataError::InvalidPrice {
                    date: point.date,
                    price: point.price,
                });
            }
        }

        for pair in points.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(DataError::Unordered(pair[1].date));
            }
        }

        Ok(Self { points })
    }

    /// Build a daily history from consecutive closing prices.
    pub fn from_daily_closes(start: NaiveDate, closes: &[f64]) -> Result<Self, DataError> {
        let points = closes
            .iter()
            .enumerate()
            .map(|(i, &price)| PricePoint::new(start + Duration::days(i as i64), price))
            .collect();
        Self::new(points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> NaiveDate {
        self.points[0].date
    }

    pub fn last_date(&self) -> NaiveDate {
        self.points[self.points.len() - 1].date
    }

    /// Realized volatility for a given window.
    pub fn realized_volatility(
        &self,
        window: usize,
        annualization_factor: f64,
    ) -> Result<Vec<VolatilityEstimate>, DataError> {
        let estimator = RealizedVolatility::new(window, annualization_factor)?;
        self.volatility(&estimator)
    }

    /// Realized volatility sampled at each month's last estimate.
    pub fn monthly_volatility(
        &self,
        window: usize,
        annualization_factor: f64,
    ) -> Result<Vec<VolatilityEstimate>, DataError> {
        let estimator = RealizedVolatility::new(window, annualization_factor)?;
        let estimates = estimator.estimate(self.prices())?;
        Ok(monthly_last(estimates))
    }
}

impl PriceSource for PriceHistory {
    fn prices(&self) -> &[PricePoint] {
        &self.points
    }

    fn as_of(&self, date: NaiveDate) -> Result<PricePoint, DataError> {
        let first = self.first_date();
        let last = self.last_date();
        if date < first || date > last {
            return Err(DataError::OutOfRange { date, first, last });
        }

        // Index of the first point strictly after `date`; the one before it
        // is the latest at or before `date`. date >= first guarantees idx > 0.
        let idx = self.points.partition_point(|p| p.date <= date);
        Ok(self.points[idx - 1])
    }
}
