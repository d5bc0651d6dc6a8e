pub mod backtest;
pub mod broker;
pub mod data;
pub mod error;
pub mod portfolio;
pub mod pricing;
pub mod volatility;

// Re-export commonly used types
pub use backtest::{
    run_backtest, BacktestConfig, BacktestController, BacktestResult, BacktestRun, ExitRuleKind,
};
pub use broker::{OrderExecutor, SimulatedExecutor, StraddleBroker};
pub use data::{OptionType, PriceHistory, PriceLoader, PricePoint, PriceSource};
pub use error::{BacktestError, ConfigError, DataError, ModelError, StateError};
pub use portfolio::{
    ForwardPosition, Portfolio, PortfolioGreeks, PositionId, PositionSize, StraddlePosition, Trade,
};
pub use pricing::{BlackScholes, Greeks, OptionContract, PricedOption};
pub use volatility::{RealizedVolatility, VolatilityEstimator, VolatilitySignal};
