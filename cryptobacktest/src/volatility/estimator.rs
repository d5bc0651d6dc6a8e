//! Realized volatility estimation.
//!
//! Realized volatility stands in for implied volatility until a market IV
//! source is wired in; anything that can produce a dated volatility stream
//! can implement [`VolatilityEstimator`] and replace it.

use chrono::Datelike;

use crate::data::{PricePoint, VolatilityEstimate};
use crate::error::DataError;

/// Produces a dated, annualized volatility stream from a price series.
pub trait VolatilityEstimator {
    /// Number of observations each estimate looks back over.
    fn window(&self) -> usize;

    /// Lazily estimate volatility over `prices`.
    ///
    /// Dates without enough history produce no estimate at all.
    fn estimate<'a>(
        &'a self,
        prices: &'a [PricePoint],
    ) -> Result<Box<dyn Iterator<Item = VolatilityEstimate> + 'a>, DataError>;
}

/// Annualized sample standard deviation of trailing log returns.
#[derive(Debug, Clone, Copy)]
pub struct RealizedVolatility {
    window: usize,
    annualization_factor: f64,
}

impl RealizedVolatility {
    /// `window` is the number of log returns per estimate; sampling
    /// frequency is folded in through `annualization_factor` (365 for daily
    /// crypto bars).
    pub fn new(window: usize, annualization_factor: f64) -> Result<Self, DataError> {
        if window < 2 {
            return Err(DataError::InvalidWindow(window));
        }
        Ok(Self {
            window,
            annualization_factor,
        })
    }

    pub fn annualization_factor(&self) -> f64 {
        self.annualization_factor
    }

    /// Iterator over estimates for `prices`.
    pub fn rolling<'a>(&self, prices: &'a [PricePoint]) -> Result<RollingVolatility<'a>, DataError> {
        let required = self.window + 1;
        if prices.len() < required {
            return Err(DataError::InsufficientData {
                required,
                available: prices.len(),
            });
        }

        if let Some(bad) = prices.iter().find(|p| !(p.price > 0.0)) {
            return Err(DataError::InvalidPrice {
                date: bad.date,
                price: bad.price,
            });
        }

        Ok(RollingVolatility {
            prices,
            window: self.window,
            scale: self.annualization_factor.sqrt(),
            next: self.window,
        })
    }
}

impl VolatilityEstimator for RealizedVolatility {
    fn window(&self) -> usize {
        self.window
    }

    fn estimate<'a>(
        &'a self,
        prices: &'a [PricePoint],
    ) -> Result<Box<dyn Iterator<Item = VolatilityEstimate> + 'a>, DataError> {
        Ok(Box::new(self.rolling(prices)?))
    }
}

/// Lazy rolling-window volatility stream.
#[derive(Debug, Clone)]
pub struct RollingVolatility<'a> {
    prices: &'a [PricePoint],
    window: usize,
    scale: f64,
    next: usize,
}

impl Iterator for RollingVolatility<'_> {
    type Item = VolatilityEstimate;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.prices.len() {
            return None;
        }

        let end = self.next;
        self.next += 1;

        let slice = &self.prices[end - self.window..=end];
        let returns: Vec<f64> = slice
            .windows(2)
            .map(|w| (w[1].price / w[0].price).ln())
            .collect();

        Some(VolatilityEstimate {
            date: self.prices[end].date,
            window: self.window,
            value: sample_std_dev(&returns) * self.scale,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.prices.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RollingVolatility<'_> {}

/// Resample a date-ordered estimate stream to one value per calendar month:
/// the last estimate of each month.
pub fn monthly_last<I>(estimates: I) -> Vec<VolatilityEstimate>
where
    I: IntoIterator<Item = VolatilityEstimate>,
{
    let mut months: Vec<VolatilityEstimate> = Vec::new();

    for estimate in estimates {
        let month = (estimate.date.year(), estimate.date.month());
        match months.last_mut() {
            Some(last) if (last.date.year(), last.date.month()) == month => *last = estimate,
            _ => months.push(estimate),
        }
    }

    months
}

/// Standard deviation with an n-1 denominator.
fn sample_std_dev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};
    use proptest::prelude::*;

    fn series(closes: &[f64]) -> Vec<PricePoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &p)| PricePoint::new(start + Duration::days(i as i64), p))
            .collect()
    }

    /// Prices whose log returns alternate +step, -step.
    fn alternating(n: usize, step: f64) -> Vec<f64> {
        let mut closes = vec![100.0];
        for i in 1..n {
            let r = if i % 2 == 1 { step } else { -step };
            closes.push(closes[i - 1] * r.exp());
        }
        closes
    }

    #[test]
    fn test_rejects_short_window() {
        assert!(matches!(
            RealizedVolatility::new(1, 365.0),
            Err(DataError::InvalidWindow(1))
        ));
    }

    #[test]
    fn test_insufficient_data() {
        let estimator = RealizedVolatility::new(5, 365.0).unwrap();
        let prices = series(&[100.0, 101.0, 102.0, 103.0, 104.0]);

        match estimator.estimate(&prices) {
            Err(DataError::InsufficientData {
                required,
                available,
            }) => {
                assert_eq!(required, 6);
                assert_eq!(available, 5);
            }
            _ => panic!("expected InsufficientData"),
        };
    }

    #[test]
    fn test_estimates_start_after_window() {
        let estimator = RealizedVolatility::new(3, 365.0).unwrap();
        let prices = series(&alternating(8, 0.01));

        let estimates: Vec<_> = estimator.estimate(&prices).unwrap().collect();
        assert_eq!(estimates.len(), 5);
        assert_eq!(estimates[0].date, prices[3].date);
        assert_eq!(estimates.last().unwrap().date, prices[7].date);
    }

    #[test]
    fn test_alternating_returns_volatility() {
        // Even window: mean return is zero, sample std = step * sqrt(w / (w - 1))
        let step = 0.02;
        let estimator = RealizedVolatility::new(4, 365.0).unwrap();
        let prices = series(&alternating(10, step));

        for estimate in estimator.estimate(&prices).unwrap() {
            let expected = step * (4.0_f64 / 3.0).sqrt() * 365.0_f64.sqrt();
            assert_relative_eq!(estimate.value, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_constant_growth_has_zero_volatility() {
        let closes: Vec<f64> = (0..6).map(|i| 100.0 * 1.01_f64.powi(i)).collect();
        let estimator = RealizedVolatility::new(3, 365.0).unwrap();

        for estimate in estimator.estimate(&series(&closes)).unwrap() {
            assert!(estimate.value.abs() < 1e-9);
        }
    }

    #[test]
    fn test_rolling_is_lazy_and_exact_size() {
        let estimator = RealizedVolatility::new(2, 252.0).unwrap();
        let prices = series(&alternating(6, 0.01));

        let mut rolling = estimator.rolling(&prices).unwrap();
        assert_eq!(rolling.len(), 4);
        rolling.next();
        assert_eq!(rolling.len(), 3);
    }

    #[test]
    fn test_monthly_last() {
        // Jan 20 .. Mar 9
        let closes: Vec<f64> = (0..50).map(|i| 100.0 + ((i * 3) % 7) as f64).collect();
        let prices: Vec<PricePoint> = {
            let start = NaiveDate::from_ymd_opt(2024, 1, 20).unwrap();
            closes
                .iter()
                .enumerate()
                .map(|(i, &p)| PricePoint::new(start + Duration::days(i as i64), p))
                .collect()
        };
        let estimator = RealizedVolatility::new(5, 365.0).unwrap();
        let daily: Vec<_> = estimator.estimate(&prices).unwrap().collect();

        let monthly = monthly_last(daily.iter().copied());
        let dates: Vec<NaiveDate> = monthly.iter().map(|e| e.date).collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
                NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            ]
        );

        let feb_end = daily.iter().find(|e| e.date == dates[1]).unwrap();
        assert_eq!(monthly[1], *feb_end);
        assert!(monthly_last(Vec::<VolatilityEstimate>::new()).is_empty());
    }

    proptest! {
        #[test]
        fn prop_estimate_count(window in 2usize..20, extra in 0usize..40) {
            let n = window + 1 + extra;
            let closes: Vec<f64> = (0..n).map(|i| 100.0 + ((i * 7) % 11) as f64).collect();
            let prices = series(&closes);
            let estimator = RealizedVolatility::new(window, 365.0).unwrap();

            let count = estimator.estimate(&prices).unwrap().count();
            prop_assert_eq!(count, n - window);
        }

        #[test]
        fn prop_too_short_always_fails(window in 2usize..20, len in 0usize..20) {
            prop_assume!(len < window + 1);
            let closes: Vec<f64> = (0..len).map(|i| 100.0 + i as f64).collect();
            let prices = series(&closes);
            let estimator = RealizedVolatility::new(window, 365.0).unwrap();

            let is_insufficient = matches!(
                estimator.estimate(&prices),
                Err(DataError::InsufficientData { .. })
            );
            prop_assert!(is_insufficient);
        }
    }
}
