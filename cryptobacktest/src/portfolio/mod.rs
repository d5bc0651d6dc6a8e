//! Straddle positions and the portfolio that holds them.

pub mod book;
pub mod forward;
pub mod greeks;
pub mod position;

pub use book::Portfolio;
pub use forward::ForwardPosition;
pub use greeks::{GreeksLimitCheck, PortfolioGreeks, PortfolioGreeksConfig, RiskExposure};
pub use position::{
    ExitReason, PositionExit, PositionId, PositionSize, PositionStatus, StraddlePosition, Trade,
};
