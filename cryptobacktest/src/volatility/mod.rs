//! Volatility estimation and the low-volatility entry signal.
//!
//! - Realized volatility over rolling windows (implied-volatility proxy)
//! - Month-end resampling of a volatility stream
//! - Short vs. long window comparison for straddle entries

pub mod estimator;
pub mod signal;

pub use estimator::{monthly_last, RealizedVolatility, RollingVolatility, VolatilityEstimator};
pub use signal::{SignalState, VolatilitySignal};
