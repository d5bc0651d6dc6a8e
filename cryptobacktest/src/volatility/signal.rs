//! Low-volatility entry signal.
//!
//! Compares short-window volatility against a long-window baseline. When
//! short-term volatility is subdued relative to the baseline, straddles are
//! cheap relative to the expected reversion and the signal flags an entry.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::VolatilityEstimate;
use crate::error::ConfigError;

/// Signal output for one date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalState {
    pub date: NaiveDate,
    /// Short-window volatility is at or below the discounted baseline.
    pub enter: bool,
    pub short_vol: f64,
    pub long_vol: f64,
}

impl SignalState {
    /// Short-window volatility has reverted to (or above) the baseline.
    pub fn reverted(&self) -> bool {
        VolatilitySignal::reverted(self.short_vol, self.long_vol)
    }
}

/// Short vs. long window volatility comparator.
#[derive(Debug, Clone, Copy)]
pub struct VolatilitySignal {
    threshold: f64,
}

impl VolatilitySignal {
    /// `threshold` is the fractional discount to the long-window volatility
    /// that short-window volatility must reach; must lie in (0, 1).
    pub fn new(threshold: f64) -> Result<Self, ConfigError> {
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "vol_threshold must be in (0, 1), got {}",
                threshold
            )));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Entry condition for a single pair of readings. Equality enters.
    pub fn should_enter(&self, short_vol: f64, long_vol: f64) -> bool {
        short_vol <= long_vol * (1.0 - self.threshold)
    }

    /// Mean-reversion condition used by the reversal exit.
    pub fn reverted(short_vol: f64, long_vol: f64) -> bool {
        short_vol >= long_vol
    }

    /// Align two estimate streams by date and emit one state per common date.
    ///
    /// Dates present in only one stream (the long window's warm-up) are
    /// skipped rather than reported as non-entries.
    pub fn evaluate<S, L>(&self, short: S, long: L) -> Vec<SignalState>
    where
        S: IntoIterator<Item = VolatilityEstimate>,
        L: IntoIterator<Item = VolatilityEstimate>,
    {
        let long_by_date: BTreeMap<NaiveDate, f64> =
            long.into_iter().map(|e| (e.date, e.value)).collect();

        let mut states: Vec<SignalState> = short
            .into_iter()
            .filter_map(|s| {
                let long_vol = *long_by_date.get(&s.date)?;
                Some(SignalState {
                    date: s.date,
                    enter: self.should_enter(s.value, long_vol),
                    short_vol: s.value,
                    long_vol,
                })
            })
            .collect();

        states.sort_by_key(|s| s.date);
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn est(d: u32, window: usize, value: f64) -> VolatilityEstimate {
        VolatilityEstimate {
            date: date(d),
            window,
            value,
        }
    }

    #[test]
    fn test_threshold_validation() {
        assert!(VolatilitySignal::new(0.0).is_err());
        assert!(VolatilitySignal::new(1.0).is_err());
        assert!(VolatilitySignal::new(f64::NAN).is_err());
        assert!(VolatilitySignal::new(0.3).is_ok());
    }

    #[test]
    fn test_boundary_counts_as_enter() {
        let signal = VolatilitySignal::new(0.25).unwrap();
        // 1.0 * (1 - 0.25) = 0.75 exactly
        assert!(signal.should_enter(0.75, 1.0));
        assert!(!signal.should_enter(0.750001, 1.0));
        assert!(signal.should_enter(0.5, 1.0));
    }

    #[test]
    fn test_never_enters_above_threshold() {
        let signal = VolatilitySignal::new(0.3).unwrap();
        for i in 0..100 {
            let long = 0.05 + i as f64 * 0.01;
            let short = long * 0.7 + 1e-9;
            assert!(!signal.should_enter(short, long));
        }
    }

    #[test]
    fn test_evaluate_skips_unaligned_dates() {
        let signal = VolatilitySignal::new(0.3).unwrap();
        let short = vec![est(1, 5, 0.5), est(2, 5, 0.5), est(3, 5, 0.2), est(4, 5, 0.9)];
        let long = vec![est(3, 30, 0.6), est(4, 30, 0.6)];

        let states = signal.evaluate(short, long);
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].date, date(3));
        assert!(states[0].enter);
        assert_eq!(states[1].date, date(4));
        assert!(!states[1].enter);
        assert!(states[1].reverted());
    }
}
