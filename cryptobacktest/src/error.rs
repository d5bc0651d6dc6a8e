//! Error taxonomy for the backtest engine.
//!
//! - [`DataError`]: the price history cannot support the request. The run
//!   aborts or cannot start.
//! - [`ModelError`]: pricing inputs are outside the model's domain. The
//!   controller recovers per step and records an anomaly.
//! - [`StateError`]: a position/broker invariant was violated. Always fatal.
//! - [`ConfigError`]: invalid or unreadable configuration.

use chrono::NaiveDate;
use thiserror::Error;

use crate::portfolio::PositionId;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Insufficient data: need at least {required} prices, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Date {date} outside loaded history ({first} to {last})")]
    OutOfRange {
        date: NaiveDate,
        first: NaiveDate,
        last: NaiveDate,
    },

    #[error("Price history is empty")]
    EmptyHistory,

    #[error("Volatility window must be at least 2, got {0}")]
    InvalidWindow(usize),

    #[error("Non-positive price {price} on {date}")]
    InvalidPrice { date: NaiveDate, price: f64 },

    #[error("Price history not strictly increasing at {0}")]
    Unordered(NaiveDate),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Volatility must be positive, got {0}")]
    InvalidVolatility(f64),

    #[error("Option expired (time to expiry {0:.6} years)")]
    ExpiredOption(f64),

    #[error("Spot and strike must be positive (spot {spot}, strike {strike})")]
    InvalidPrice { spot: f64, strike: f64 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("Unknown position {0}")]
    UnknownPosition(PositionId),

    #[error("Position {0} is already closed")]
    ClosedPosition(PositionId),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Straddle {0} is already open")]
    StraddleAlreadyOpen(PositionId),

    #[error("Straddle legs do not match: {0}")]
    MismatchedLegs(String),

    #[error("Invalid position size: {0}")]
    InvalidSize(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Any failure surfaced by a backtest run.
#[derive(Error, Debug)]
pub enum BacktestError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BacktestError {
    /// Whether the controller may recover from this error within a step.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Model(_))
    }
}
