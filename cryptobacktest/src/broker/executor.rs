//! Execution boundary.
//!
//! An [`OrderExecutor`] fills orders and reports holdings. It applies no
//! trading policy of its own; the straddle broker decides which orders may
//! reach it.

use tracing::debug;

use crate::error::StateError;
use crate::pricing::OptionContract;

use super::order::{Fill, Holdings, Order, OrderKind};

pub trait OrderExecutor {
    /// Execute an order and report the fill.
    fn execute_order(&mut self, order: &Order) -> Result<Fill, StateError>;

    /// Net quantity currently held in `contract`.
    fn position_state(&self, contract: &OptionContract) -> i64;
}

/// In-process executor that fills market orders at the order price.
///
/// Permits any direction and order kind, shorts included.
#[derive(Debug, Clone, Default)]
pub struct SimulatedExecutor {
    fills: Vec<Fill>,
    holdings: Holdings,
}

impl SimulatedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn holdings(&self) -> &Holdings {
        &self.holdings
    }

    /// Net premium paid (positive) or received (negative) across all fills.
    pub fn net_premium(&self) -> f64 {
        self.fills
            .iter()
            .map(|f| f.fill_price * f.order.signed_quantity() as f64)
            .sum()
    }
}

impl OrderExecutor for SimulatedExecutor {
    fn execute_order(&mut self, order: &Order) -> Result<Fill, StateError> {
        // Stops are assumed to trigger immediately
        let fill_price = match order.kind {
            OrderKind::Market => order.price,
            OrderKind::StopLoss { trigger } => trigger,
        };

        let fill = Fill {
            order: *order,
            fill_price,
            date: order.date,
        };
        self.holdings.apply(order.contract, order.signed_quantity());
        self.fills.push(fill);

        debug!(
            "Filled {:?} {:?} {} x {:?} {} @ {:.4}",
            order.side,
            order.intent,
            order.quantity,
            order.contract.option_type,
            order.contract.strike,
            fill.fill_price
        );

        Ok(fill)
    }

    fn position_state(&self, contract: &OptionContract) -> i64 {
        self.holdings.quantity(contract)
    }
}
