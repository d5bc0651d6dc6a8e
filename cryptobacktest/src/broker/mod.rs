//! Order execution for straddles.
//!
//! - [`OrderExecutor`]: the execution boundary (fills and holdings)
//! - [`SimulatedExecutor`]: in-process fills at the order price
//! - [`StraddleBroker`]: long-only straddle entries and exits

pub mod executor;
pub mod order;
pub mod straddle;

pub use executor::{OrderExecutor, SimulatedExecutor};
pub use order::{Fill, Holdings, Order, OrderIntent, OrderKind, OrderSide};
pub use straddle::StraddleBroker;
