//! Black-Scholes pricing and analytic Greeks for European options.
//!
//! Continuous compounding, optional continuous dividend yield. Greeks are the
//! raw partial derivatives (vega per unit of volatility, theta per year);
//! use [`Greeks::vega_per_point`] / [`Greeks::theta_per_day`] for display.

use std::f64::consts::{PI, SQRT_2};
use std::ops::{Add, AddAssign, Mul};

use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;

use crate::data::OptionType;
use crate::error::ModelError;

use super::option::DAYS_IN_YEAR;

/// Option sensitivities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    /// dV/dS
    pub delta: f64,
    /// d2V/dS2
    pub gamma: f64,
    /// dV/dsigma
    pub vega: f64,
    /// -dV/dT, per year
    pub theta: f64,
}

impl Greeks {
    /// Vega per one volatility point (1%).
    pub fn vega_per_point(&self) -> f64 {
        self.vega / 100.0
    }

    /// Theta per calendar day.
    pub fn theta_per_day(&self) -> f64 {
        self.theta / DAYS_IN_YEAR
    }
}

impl Add for Greeks {
    type Output = Greeks;

    fn add(self, rhs: Greeks) -> Greeks {
        Greeks {
            delta: self.delta + rhs.delta,
            gamma: self.gamma + rhs.gamma,
            vega: self.vega + rhs.vega,
            theta: self.theta + rhs.theta,
        }
    }
}

impl AddAssign for Greeks {
    fn add_assign(&mut self, rhs: Greeks) {
        *self = *self + rhs;
    }
}

/// Scale by a position size.
impl Mul<f64> for Greeks {
    type Output = Greeks;

    fn mul(self, units: f64) -> Greeks {
        Greeks {
            delta: self.delta * units,
            gamma: self.gamma * units,
            vega: self.vega * units,
            theta: self.theta * units,
        }
    }
}

/// Price and Greeks of one option under one set of inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub price: f64,
    pub greeks: Greeks,
}

/// Black-Scholes calculator for options pricing and Greeks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlackScholes {
    /// Risk-free interest rate
    pub rate: f64,
    /// Continuous dividend yield
    pub dividend: f64,
}

impl Default for BlackScholes {
    fn default() -> Self {
        Self {
            rate: 0.0,
            dividend: 0.0,
        }
    }
}

impl BlackScholes {
    pub fn new(rate: f64, dividend: f64) -> Self {
        Self { rate, dividend }
    }

    /// Calculator with a rate and no dividend yield.
    pub fn with_rate(rate: f64) -> Self {
        Self::new(rate, 0.0)
    }

    fn check_inputs(spot: f64, strike: f64, time: f64, vol: f64) -> Result<(), ModelError> {
        if !(spot > 0.0 && strike > 0.0) {
            return Err(ModelError::InvalidPrice { spot, strike });
        }
        if !(time > 0.0) {
            return Err(ModelError::ExpiredOption(time));
        }
        if !(vol > 0.0) {
            return Err(ModelError::InvalidVolatility(vol));
        }
        Ok(())
    }

    /// Calculate d1 parameter.
    fn d1(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        let numerator =
            (spot / strike).ln() + (self.rate - self.dividend + 0.5 * vol * vol) * time;
        numerator / (vol * time.sqrt())
    }

    /// Standard normal CDF.
    fn norm_cdf(x: f64) -> f64 {
        0.5 * erfc(-x / SQRT_2)
    }

    /// Standard normal PDF.
    fn norm_pdf(x: f64) -> f64 {
        (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
    }

    /// Price and Greeks.
    ///
    /// Fails with [`ModelError::ExpiredOption`] when `time <= 0` and with
    /// [`ModelError::InvalidVolatility`] when `vol <= 0`; expired legs are
    /// settled at intrinsic value by the caller, not priced.
    pub fn value(
        &self,
        opt_type: OptionType,
        spot: f64,
        strike: f64,
        time: f64,
        vol: f64,
    ) -> Result<Valuation, ModelError> {
        Self::check_inputs(spot, strike, time, vol)?;

        let sqrt_t = time.sqrt();
        let d1 = self.d1(spot, strike, time, vol);
        let d2 = d1 - vol * sqrt_t;
        let discount_d = (-self.dividend * time).exp();
        let discount_r = (-self.rate * time).exp();
        let pdf_d1 = Self::norm_pdf(d1);

        // Shared by both option types
        let gamma = discount_d * pdf_d1 / (spot * vol * sqrt_t);
        let vega = spot * discount_d * pdf_d1 * sqrt_t;
        let decay = -spot * discount_d * pdf_d1 * vol / (2.0 * sqrt_t);

        let (price, delta, theta) = match opt_type {
            OptionType::Call => {
                let nd1 = Self::norm_cdf(d1);
                let nd2 = Self::norm_cdf(d2);
                (
                    spot * discount_d * nd1 - strike * discount_r * nd2,
                    discount_d * nd1,
                    decay + self.dividend * spot * discount_d * nd1
                        - self.rate * strike * discount_r * nd2,
                )
            }
            OptionType::Put => {
                let nmd1 = Self::norm_cdf(-d1);
                let nmd2 = Self::norm_cdf(-d2);
                (
                    strike * discount_r * nmd2 - spot * discount_d * nmd1,
                    -discount_d * nmd1,
                    decay - self.dividend * spot * discount_d * nmd1
                        + self.rate * strike * discount_r * nmd2,
                )
            }
        };

        Ok(Valuation {
            price,
            greeks: Greeks {
                delta,
                gamma,
                vega,
                theta,
            },
        })
    }

    /// Option price only.
    pub fn price(
        &self,
        opt_type: OptionType,
        spot: f64,
        strike: f64,
        time: f64,
        vol: f64,
    ) -> Result<f64, ModelError> {
        Ok(self.value(opt_type, spot, strike, time, vol)?.price)
    }

    /// Payoff at expiry.
    pub fn intrinsic(opt_type: OptionType, spot: f64, strike: f64) -> f64 {
        match opt_type {
            OptionType::Call => (spot - strike).max(0.0),
            OptionType::Put => (strike - spot).max(0.0),
        }
    }
}

/// Price one option: `(kind, spot, strike, time_to_expiry, volatility, rate)`.
pub fn price(
    opt_type: OptionType,
    spot: f64,
    strike: f64,
    time_to_expiry: f64,
    volatility: f64,
    rate: f64,
) -> Result<Valuation, ModelError> {
    BlackScholes::with_rate(rate).value(opt_type, spot, strike, time_to_expiry, volatility)
}
