//! Option pricing.
//!
//! - Black-Scholes prices and analytic Greeks
//! - Option contracts and immutable valuations

pub mod black_scholes;
pub mod option;

pub use black_scholes::{price, BlackScholes, Greeks, Valuation};
pub use option::{year_fraction, OptionContract, PricedOption, DAYS_IN_YEAR};
