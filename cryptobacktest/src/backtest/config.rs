//! Backtest configuration.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::portfolio::PortfolioGreeksConfig;

/// Exit strategy for an open straddle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitRuleKind {
    /// Exit after `exit_holding_days`.
    #[default]
    HoldingPeriod,
    /// Exit once short-window volatility is back at or above the long
    /// window, or after `exit_holding_days` at the latest.
    VolatilityReversal,
}

/// Configuration for backtest execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Short volatility window (observations).
    #[serde(default = "default_short_window")]
    pub short_window: usize,

    /// Long volatility window (observations).
    #[serde(default = "default_long_window")]
    pub long_window: usize,

    /// Enter when short vol <= long vol * (1 - vol_threshold).
    #[serde(default = "default_vol_threshold")]
    pub vol_threshold: f64,

    /// Observations per year (365 for daily crypto bars).
    #[serde(default = "default_annualization_factor")]
    pub annualization_factor: f64,

    /// Strike as a fraction away from spot (0.0 = at the money).
    #[serde(default)]
    pub strike_offset: f64,

    /// Calendar days from entry to expiry.
    #[serde(default = "default_expiry_days")]
    pub expiry_days: u32,

    #[serde(default)]
    pub risk_free_rate: f64,

    /// Continuous dividend (or funding) yield.
    #[serde(default)]
    pub dividend_yield: f64,

    /// Holding period, or the holding cap for volatility reversal exits.
    #[serde(default = "default_exit_holding_days")]
    pub exit_holding_days: u32,

    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,

    /// Contracts bought per leg.
    #[serde(default = "default_quantity")]
    pub quantity: u32,

    /// Units of the underlying per contract.
    #[serde(default = "default_contract_size")]
    pub contract_size: f64,

    #[serde(default)]
    pub exit_rule: ExitRuleKind,

    /// First simulated day. Defaults to the first price.
    #[serde(default)]
    pub start: Option<NaiveDate>,

    /// Last simulated day. Defaults to the last price.
    #[serde(default)]
    pub end: Option<NaiveDate>,

    /// Close any open straddle on the last day.
    #[serde(default = "default_true")]
    pub close_at_end: bool,

    /// Net Greek limits; violations are logged.
    #[serde(default)]
    pub greeks_limits: PortfolioGreeksConfig,
}

fn default_short_window() -> usize {
    5
}

fn default_long_window() -> usize {
    30
}

fn default_vol_threshold() -> f64 {
    0.3
}

fn default_annualization_factor() -> f64 {
    365.0
}

fn default_expiry_days() -> u32 {
    30
}

fn default_exit_holding_days() -> u32 {
    10
}

fn default_initial_capital() -> f64 {
    100_000.0
}

fn default_quantity() -> u32 {
    1
}

fn default_contract_size() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            short_window: default_short_window(),
            long_window: default_long_window(),
            vol_threshold: default_vol_threshold(),
            annualization_factor: default_annualization_factor(),
            strike_offset: 0.0,
            expiry_days: default_expiry_days(),
            risk_free_rate: 0.0,
            dividend_yield: 0.0,
            exit_holding_days: default_exit_holding_days(),
            initial_capital: default_initial_capital(),
            quantity: default_quantity(),
            contract_size: default_contract_size(),
            exit_rule: ExitRuleKind::default(),
            start: None,
            end: None,
            close_at_end: true,
            greeks_limits: PortfolioGreeksConfig::default(),
        }
    }
}

impl BacktestConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };

        if self.short_window < 2 {
            return invalid(format!("short_window must be >= 2, got {}", self.short_window));
        }
        if self.long_window <= self.short_window {
            return invalid(format!(
                "long_window ({}) must exceed short_window ({})",
                self.long_window, self.short_window
            ));
        }
        if !(self.vol_threshold > 0.0 && self.vol_threshold < 1.0) {
            return invalid(format!(
                "vol_threshold must be in (0, 1), got {}",
                self.vol_threshold
            ));
        }
        if !(self.annualization_factor > 0.0) {
            return invalid(format!(
                "annualization_factor must be positive, got {}",
                self.annualization_factor
            ));
        }
        if !(self.strike_offset > -1.0) {
            return invalid(format!(
                "strike_offset must be > -1, got {}",
                self.strike_offset
            ));
        }
        if self.expiry_days == 0 {
            return invalid("expiry_days must be positive".to_string());
        }
        if self.exit_holding_days == 0 {
            return invalid("exit_holding_days must be positive".to_string());
        }
        if !(self.initial_capital > 0.0) {
            return invalid(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            ));
        }
        if self.quantity == 0 {
            return invalid("quantity must be positive".to_string());
        }
        if !(self.contract_size > 0.0) {
            return invalid(format!(
                "contract_size must be positive, got {}",
                self.contract_size
            ));
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if end < start {
                return invalid(format!("end {} precedes start {}", end, start));
            }
        }
        Ok(())
    }
}
