//! Portfolio of straddle positions.
//!
//! Accounting convention: `cash` is capital not committed to open
//! premiums. Opening a straddle moves its entry cost out of cash; closing
//! returns the entry cost to cash and books `proceeds - entry_cost` to
//! realized P&L. Hence at any time
//!
//! ```text
//! total_value = cash + sum(open mark-to-market) + realized_pnl
//! ```
//!
//! Forwards sit outside this identity: they only add delta.

use chrono::NaiveDate;

use crate::error::{BacktestError, StateError};
use crate::pricing::{BlackScholes, PricedOption};

use super::forward::ForwardPosition;
use super::greeks::{PortfolioGreeks, RiskExposure};
use super::position::{PositionExit, PositionId, PositionSize, StraddlePosition};

#[derive(Debug, Clone)]
pub struct Portfolio {
    initial_capital: f64,
    cash: f64,
    realized_pnl: f64,
    /// Entry order; ids are increasing.
    positions: Vec<StraddlePosition>,
    forwards: Vec<ForwardPosition>,
    next_id: u64,
    model: BlackScholes,
}

impl Portfolio {
    pub fn new(initial_capital: f64, model: BlackScholes) -> Self {
        Self {
            initial_capital,
            cash: initial_capital,
            realized_pnl: 0.0,
            positions: Vec::new(),
            forwards: Vec::new(),
            next_id: 1,
            model,
        }
    }

    /// Record a new straddle of `size` contracts per leg, bought for
    /// `entry_cost` in total.
    pub fn open_position(
        &mut self,
        call: PricedOption,
        put: PricedOption,
        size: PositionSize,
        entry_cost: f64,
        entry_date: NaiveDate,
    ) -> Result<PositionId, StateError> {
        let id = PositionId(self.next_id);
        let position = StraddlePosition::open(id, call, put, size, entry_cost, entry_date)?;

        self.next_id += 1;
        self.cash -= entry_cost;
        self.positions.push(position);
        Ok(id)
    }

    /// Reprice both legs of an open position and return its new mark.
    ///
    /// On a pricing failure the position keeps its previous mark.
    pub fn revalue(
        &mut self,
        id: PositionId,
        spot: f64,
        time_to_expiry: f64,
        volatility: f64,
    ) -> Result<f64, BacktestError> {
        let model = self.model;
        let position = self.position_mut(id)?;
        if !position.is_open() {
            return Err(StateError::ClosedPosition(id).into());
        }

        let call = position.call.revalue(&model, spot, time_to_expiry, volatility)?;
        let put = position.put.revalue(&model, spot, time_to_expiry, volatility)?;
        position.update_legs(call, put);

        Ok(position.current_value)
    }

    /// Close an open position and return its realized P&L.
    pub fn close_position(
        &mut self,
        id: PositionId,
        exit: PositionExit,
    ) -> Result<f64, StateError> {
        let position = self
            .positions
            .iter_mut()
            .find(|p| p.id == id && p.is_open())
            .ok_or(StateError::UnknownPosition(id))?;

        let entry_cost = position.entry_cost;
        let pnl = position.close(exit);

        self.cash += entry_cost;
        self.realized_pnl += pnl;
        Ok(pnl)
    }

    pub fn add_forward(&mut self, forward: ForwardPosition) {
        self.forwards.push(forward);
    }

    pub fn forwards(&self) -> &[ForwardPosition] {
        &self.forwards
    }

    /// Net Greeks across open straddles and forwards.
    pub fn aggregate_greeks(&self) -> PortfolioGreeks {
        PortfolioGreeks::from_positions(&self.positions).with_forwards(&self.forwards)
    }

    /// Net Greeks normalized by the current portfolio value.
    pub fn exposure(&self, spot: f64) -> RiskExposure {
        self.aggregate_greeks().exposure(spot, self.total_value())
    }

    pub fn position(&self, id: PositionId) -> Option<&StraddlePosition> {
        self.positions.iter().find(|p| p.id == id)
    }

    fn position_mut(&mut self, id: PositionId) -> Result<&mut StraddlePosition, StateError> {
        self.positions
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StateError::UnknownPosition(id))
    }

    /// All positions in entry order, open and closed.
    pub fn positions(&self) -> &[StraddlePosition] {
        &self.positions
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &StraddlePosition> {
        self.positions.iter().filter(|p| p.is_open())
    }

    pub fn closed_positions(&self) -> impl Iterator<Item = &StraddlePosition> {
        self.positions.iter().filter(|p| !p.is_open())
    }

    /// Sum of current marks over open positions.
    pub fn mark_to_market(&self) -> f64 {
        self.open_positions().map(|p| p.current_value).sum()
    }

    pub fn total_value(&self) -> f64 {
        self.cash + self.mark_to_market() + self.realized_pnl
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn model(&self) -> &BlackScholes {
        &self.model
    }
}
