//! Backtesting engine for volatility-driven straddles.
//!
//! This module provides the simulation around the portfolio and broker:
//! - Configuration and validation
//! - The run context (price source, broker, estimators, exit rule)
//! - The time-stepped controller
//! - Exit rules (fixed holding period, volatility reversal)
//! - Results with snapshots, anomalies and summary metrics

pub mod config;
pub mod engine;
pub mod exit_rule;
pub mod result;
pub mod run;

pub use config::{BacktestConfig, ExitRuleKind};
pub use engine::{run_backtest, BacktestController};
pub use exit_rule::{ExitContext, ExitRule, FixedHoldingPeriod, VolatilityReversal};
pub use result::{
    Anomaly, AnomalyKind, BacktestResult, EarlyTermination, OpenPositionSummary, Snapshot,
};
pub use run::BacktestRun;
