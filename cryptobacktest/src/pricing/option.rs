//! Option contracts and their point-in-time valuations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::OptionType;
use crate::error::ModelError;

use super::black_scholes::{BlackScholes, Greeks};

/// Calendar days per year used for time-to-expiry.
pub const DAYS_IN_YEAR: f64 = 365.0;

/// Year fraction between two dates (negative once `to` has passed).
pub fn year_fraction(from: NaiveDate, to: NaiveDate) -> f64 {
    (to - from).num_days() as f64 / DAYS_IN_YEAR
}

/// A European option contract on the underlying.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub option_type: OptionType,
    pub strike: f64,
    pub expiration: NaiveDate,
}

impl OptionContract {
    pub fn call(strike: f64, expiration: NaiveDate) -> Self {
        Self {
            option_type: OptionType::Call,
            strike,
            expiration,
        }
    }

    pub fn put(strike: f64, expiration: NaiveDate) -> Self {
        Self {
            option_type: OptionType::Put,
            strike,
            expiration,
        }
    }

    /// Years remaining until expiration as of `date`.
    pub fn time_to_expiry(&self, date: NaiveDate) -> f64 {
        year_fraction(date, self.expiration)
    }

    /// Payoff if exercised at `spot`.
    pub fn intrinsic(&self, spot: f64) -> f64 {
        BlackScholes::intrinsic(self.option_type, spot, self.strike)
    }

    /// Value the contract under the given market inputs.
    pub fn price(
        &self,
        model: &BlackScholes,
        spot: f64,
        time_to_expiry: f64,
        volatility: f64,
    ) -> Result<PricedOption, ModelError> {
        let valuation = model.value(
            self.option_type,
            spot,
            self.strike,
            time_to_expiry,
            volatility,
        )?;

        Ok(PricedOption {
            contract: *self,
            spot,
            time_to_expiry,
            volatility,
            rate: model.rate,
            price: valuation.price,
            greeks: valuation.greeks,
        })
    }
}

/// A contract together with the inputs it was valued at and the result.
///
/// Immutable: revaluing produces a new `PricedOption`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricedOption {
    pub contract: OptionContract,
    pub spot: f64,
    pub time_to_expiry: f64,
    pub volatility: f64,
    pub rate: f64,
    pub price: f64,
    pub greeks: Greeks,
}

impl PricedOption {
    pub fn option_type(&self) -> OptionType {
        self.contract.option_type
    }

    pub fn strike(&self) -> f64 {
        self.contract.strike
    }

    pub fn expiration(&self) -> NaiveDate {
        self.contract.expiration
    }

    /// Reprice the same contract under new inputs.
    pub fn revalue(
        &self,
        model: &BlackScholes,
        spot: f64,
        time_to_expiry: f64,
        volatility: f64,
    ) -> Result<PricedOption, ModelError> {
        self.contract.price(model, spot, time_to_expiry, volatility)
    }
}
