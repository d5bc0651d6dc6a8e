//! Straddle broker.
//!
//! Wraps an [`OrderExecutor`] and the [`Portfolio`]. Entries and exits move
//! both legs together. Only long exposure is allowed: short sales and
//! stop-loss orders are rejected before they reach the executor.
//!
//! Orders carry the contract count and a per-contract price (option value
//! times contract size).

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::error::{BacktestError, StateError};
use crate::portfolio::{
    ExitReason, Portfolio, PositionExit, PositionId, PositionSize, StraddlePosition,
};
use crate::pricing::{year_fraction, BlackScholes, OptionContract};

use super::executor::{OrderExecutor, SimulatedExecutor};
use super::order::{Fill, Order, OrderIntent, OrderKind, OrderSide};

pub struct StraddleBroker<E: OrderExecutor = SimulatedExecutor> {
    executor: E,
    portfolio: Portfolio,
    /// Size of each new straddle.
    size: PositionSize,
    /// The single straddle currently open, if any.
    open: Option<PositionId>,
}

impl<E: OrderExecutor> StraddleBroker<E> {
    pub fn new(executor: E, portfolio: Portfolio) -> Self {
        Self {
            executor,
            portfolio,
            size: PositionSize::default(),
            open: None,
        }
    }

    pub fn with_size(mut self, size: PositionSize) -> Self {
        self.size = size;
        self
    }

    pub fn size(&self) -> PositionSize {
        self.size
    }

    /// Submit a single order to the executor.
    ///
    /// Rejects, whatever the order's other fields:
    /// - stop-loss orders
    /// - sell-to-open (short sale)
    /// - sell-to-close larger than the current holding
    /// - buy-to-close (there is never a short to cover)
    pub fn submit_order(&mut self, order: Order) -> Result<Fill, StateError> {
        if let OrderKind::StopLoss { .. } = order.kind {
            warn!("Rejected stop-loss order on {:?}", order.contract);
            return Err(StateError::UnsupportedOperation(
                "stop-loss orders are not supported".to_string(),
            ));
        }

        match (order.side, order.intent) {
            (OrderSide::Sell, OrderIntent::Open) => {
                warn!("Rejected sell-to-open on {:?}", order.contract);
                return Err(StateError::UnsupportedOperation(
                    "short sales are not supported".to_string(),
                ));
            }
            (OrderSide::Sell, OrderIntent::Close) => {
                let held = self.executor.position_state(&order.contract);
                if i64::from(order.quantity) > held {
                    warn!(
                        "Rejected sell-to-close of {} with {} held",
                        order.quantity, held
                    );
                    return Err(StateError::UnsupportedOperation(format!(
                        "sell-to-close of {} exceeds holding of {}",
                        order.quantity, held
                    )));
                }
            }
            (OrderSide::Buy, OrderIntent::Close) => {
                return Err(StateError::UnsupportedOperation(
                    "buy-to-close without a short holding".to_string(),
                ));
            }
            (OrderSide::Buy, OrderIntent::Open) => {}
        }

        self.executor.execute_order(&order)
    }

    /// Buy a call and a put at `strike`/`expiry`, `size` contracts each, and
    /// record the position.
    pub fn enter_straddle(
        &mut self,
        strike: f64,
        expiry: NaiveDate,
        spot: f64,
        volatility: f64,
        rate: f64,
        date: NaiveDate,
    ) -> Result<PositionId, BacktestError> {
        if let Some(id) = self.open {
            return Err(StateError::StraddleAlreadyOpen(id).into());
        }

        let size = self.size;
        size.validate()?;

        let model = self.model_at(rate);
        let tte = year_fraction(date, expiry);
        let call = OptionContract::call(strike, expiry).price(&model, spot, tte, volatility)?;
        let put = OptionContract::put(strike, expiry).price(&model, spot, tte, volatility)?;
        let entry_cost = (call.price + put.price) * size.units();

        for leg in [call, put] {
            let order = Order::buy_to_open(leg.contract, leg.price * size.contract_size, date)
                .with_quantity(size.quantity);
            self.submit_order(order)?;
        }

        let id = self
            .portfolio
            .open_position(call, put, size, entry_cost, date)?;
        self.open = Some(id);

        info!(
            "{}: opened straddle {} strike {:.2} exp {} cost {:.4} (call {:.4}, put {:.4}, vol {:.4})",
            date, id, strike, expiry, entry_cost, call.price, put.price, volatility
        );

        Ok(id)
    }

    /// Reprice both legs, sell them and close the position.
    ///
    /// A pricing failure leaves the position open and untouched.
    pub fn exit_straddle(
        &mut self,
        id: PositionId,
        spot: f64,
        volatility: f64,
        rate: f64,
        date: NaiveDate,
        reason: ExitReason,
    ) -> Result<f64, BacktestError> {
        let position = self.open_position(id)?;
        let model = self.model_at(rate);
        let tte = position.call.contract.time_to_expiry(date);

        let units = position.size.units();

        let call = position.call.revalue(&model, spot, tte, volatility)?;
        let put = position.put.revalue(&model, spot, tte, volatility)?;

        Ok(self.close_legs(id, call.price * units, put.price * units, date, reason)?)
    }

    /// Close at a caller-supplied value, split across legs by their last
    /// marks. Used when the legs can no longer be priced.
    pub fn force_exit(
        &mut self,
        id: PositionId,
        proceeds: f64,
        date: NaiveDate,
        reason: ExitReason,
    ) -> Result<f64, StateError> {
        let position = self.open_position(id)?;
        let marked = position.call.price + position.put.price;
        let call_share = if marked > 0.0 {
            position.call.price / marked
        } else {
            0.5
        };
        let call_proceeds = proceeds * call_share;
        let put_proceeds = proceeds - call_proceeds;

        self.close_legs(id, call_proceeds, put_proceeds, date, reason)
    }

    /// Sell both legs for the given totals and close the position.
    fn close_legs(
        &mut self,
        id: PositionId,
        call_proceeds: f64,
        put_proceeds: f64,
        date: NaiveDate,
        reason: ExitReason,
    ) -> Result<f64, StateError> {
        let (call, put, quantity) = {
            let position = self.open_position(id)?;
            (
                position.call.contract,
                position.put.contract,
                position.size.quantity,
            )
        };

        for (contract, total) in [(call, call_proceeds), (put, put_proceeds)] {
            let order = Order::sell_to_close(contract, total / f64::from(quantity), date)
                .with_quantity(quantity);
            self.submit_order(order)?;
        }

        let proceeds = call_proceeds + put_proceeds;
        let pnl = self.portfolio.close_position(
            id,
            PositionExit {
                date,
                proceeds,
                reason,
            },
        )?;
        if self.open == Some(id) {
            self.open = None;
        }

        info!(
            "{}: closed straddle {} ({:?}) proceeds {:.4} pnl {:.4}",
            date, id, reason, proceeds, pnl
        );

        Ok(pnl)
    }

    fn open_position(&self, id: PositionId) -> Result<&StraddlePosition, StateError> {
        self.portfolio
            .position(id)
            .filter(|p| p.is_open())
            .ok_or(StateError::UnknownPosition(id))
    }

    fn model_at(&self, rate: f64) -> BlackScholes {
        BlackScholes::new(rate, self.portfolio.model().dividend)
    }

    /// Id of the open straddle, if any.
    pub fn open_position_id(&self) -> Option<PositionId> {
        self.open
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    /// Mutable access for revaluation. Opening and closing go through the
    /// broker.
    pub fn portfolio_mut(&mut self) -> &mut Portfolio {
        &mut self.portfolio
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }
}
