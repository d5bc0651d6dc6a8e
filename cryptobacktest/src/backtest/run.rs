//! Explicit state for one backtest run.

use crate::broker::{OrderExecutor, SimulatedExecutor, StraddleBroker};
use crate::data::PriceSource;
use crate::error::BacktestError;
use crate::portfolio::{Portfolio, PositionSize};
use crate::pricing::BlackScholes;
use crate::volatility::{RealizedVolatility, VolatilityEstimator, VolatilitySignal};

use super::config::BacktestConfig;
use super::exit_rule::{self, ExitRule};

/// Everything a run reads or mutates: configuration, the price source, the
/// broker with its portfolio, both volatility estimators, the entry signal
/// and the exit rule.
pub struct BacktestRun<'a, E: OrderExecutor = SimulatedExecutor> {
    pub(crate) config: BacktestConfig,
    pub(crate) source: &'a dyn PriceSource,
    pub(crate) broker: StraddleBroker<E>,
    pub(crate) short: Box<dyn VolatilityEstimator>,
    pub(crate) long: Box<dyn VolatilityEstimator>,
    pub(crate) signal: VolatilitySignal,
    pub(crate) exit_rule: Box<dyn ExitRule>,
}

impl<'a> BacktestRun<'a, SimulatedExecutor> {
    /// Validate `config` and wire the default components: realized
    /// volatility estimators and a simulated executor.
    pub fn new(config: BacktestConfig, source: &'a dyn PriceSource) -> Result<Self, BacktestError> {
        Self::with_executor(config, source, SimulatedExecutor::new())
    }
}

impl<'a, E: OrderExecutor> BacktestRun<'a, E> {
    pub fn with_executor(
        config: BacktestConfig,
        source: &'a dyn PriceSource,
        executor: E,
    ) -> Result<Self, BacktestError> {
        config.validate()?;

        let short = RealizedVolatility::new(config.short_window, config.annualization_factor)?;
        let long = RealizedVolatility::new(config.long_window, config.annualization_factor)?;
        let signal = VolatilitySignal::new(config.vol_threshold)?;
        let model = BlackScholes::new(config.risk_free_rate, config.dividend_yield);
        let portfolio = Portfolio::new(config.initial_capital, model);
        let size = PositionSize::new(config.quantity, config.contract_size);
        let exit_rule = exit_rule::from_config(&config);

        Ok(Self {
            config,
            source,
            broker: StraddleBroker::new(executor, portfolio).with_size(size),
            short: Box::new(short),
            long: Box::new(long),
            signal,
            exit_rule,
        })
    }

    /// Replace the volatility estimators, e.g. with a market IV source.
    pub fn with_estimators(
        mut self,
        short: Box<dyn VolatilityEstimator>,
        long: Box<dyn VolatilityEstimator>,
    ) -> Self {
        self.short = short;
        self.long = long;
        self
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn broker(&self) -> &StraddleBroker<E> {
        &self.broker
    }

    pub fn portfolio(&self) -> &Portfolio {
        self.broker.portfolio()
    }
}
