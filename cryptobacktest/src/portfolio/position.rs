//! Straddle positions.
//!
//! Handles the position lifecycle:
//! - Entry (both legs priced and paid for together)
//! - Mark-to-market while open
//! - Exit (both legs closed together) and realized P&L

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::OptionType;
use crate::error::StateError;
use crate::pricing::{Greeks, PricedOption};

/// Portfolio-scoped position identifier, assigned in entry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reason for exiting a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Held for the configured number of days.
    HoldingPeriod,
    /// Short-window volatility reverted to the baseline.
    VolatilityReversal,
    /// Closed after a pricing failure.
    ForcedClose,
    /// End of backtest period.
    EndOfPeriod,
    /// Closed by the caller outside the exit rules.
    Manual,
}

/// Status of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

/// How a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionExit {
    pub date: NaiveDate,
    /// Total value received for both legs.
    pub proceeds: f64,
    pub reason: ExitReason,
}

/// Contracts per leg and underlying units per contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSize {
    pub quantity: u32,
    pub contract_size: f64,
}

impl Default for PositionSize {
    fn default() -> Self {
        Self {
            quantity: 1,
            contract_size: 1.0,
        }
    }
}

impl PositionSize {
    pub fn new(quantity: u32, contract_size: f64) -> Self {
        Self {
            quantity,
            contract_size,
        }
    }

    /// Underlying units covered by each leg.
    pub fn units(&self) -> f64 {
        f64::from(self.quantity) * self.contract_size
    }

    pub fn validate(&self) -> Result<(), StateError> {
        if self.quantity == 0 || !(self.contract_size > 0.0) {
            return Err(StateError::InvalidSize(format!(
                "quantity {} x contract size {}",
                self.quantity, self.contract_size
            )));
        }
        Ok(())
    }
}

/// A long straddle: one call and one put at the same strike and expiry,
/// `size` contracts of each.
///
/// Leg valuations are per unit of underlying; `entry_cost`,
/// `current_value` and the Greeks are for the whole position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StraddlePosition {
    pub id: PositionId,
    pub entry_date: NaiveDate,
    /// Spot at entry.
    pub entry_spot: f64,
    pub call: PricedOption,
    pub put: PricedOption,
    pub size: PositionSize,
    /// Premium paid for both legs.
    pub entry_cost: f64,
    /// Latest mark-to-market value of both legs.
    pub current_value: f64,
    pub status: PositionStatus,
    pub exit: Option<PositionExit>,
    pub realized_pnl: Option<f64>,
}

impl StraddlePosition {
    /// Build an open straddle, rejecting legs that do not form a straddle.
    pub fn open(
        id: PositionId,
        call: PricedOption,
        put: PricedOption,
        size: PositionSize,
        entry_cost: f64,
        entry_date: NaiveDate,
    ) -> Result<Self, StateError> {
        size.validate()?;
        if call.option_type() != OptionType::Call || put.option_type() != OptionType::Put {
            return Err(StateError::MismatchedLegs(
                "straddle needs one call and one put".to_string(),
            ));
        }
        if call.strike() != put.strike() {
            return Err(StateError::MismatchedLegs(format!(
                "strikes differ ({} vs {})",
                call.strike(),
                put.strike()
            )));
        }
        if call.expiration() != put.expiration() {
            return Err(StateError::MismatchedLegs(format!(
                "expirations differ ({} vs {})",
                call.expiration(),
                put.expiration()
            )));
        }

        Ok(Self {
            id,
            entry_date,
            entry_spot: call.spot,
            call,
            put,
            size,
            entry_cost,
            current_value: (call.price + put.price) * size.units(),
            status: PositionStatus::Open,
            exit: None,
            realized_pnl: None,
        })
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn strike(&self) -> f64 {
        self.call.strike()
    }

    pub fn expiration(&self) -> NaiveDate {
        self.call.expiration()
    }

    /// Mark-to-market value minus premium paid.
    pub fn unrealized_pnl(&self) -> f64 {
        self.current_value - self.entry_cost
    }

    /// Combined Greeks of both legs, scaled by size.
    pub fn greeks(&self) -> Greeks {
        (self.call.greeks + self.put.greeks) * self.size.units()
    }

    pub fn days_held(&self, date: NaiveDate) -> i64 {
        (date - self.entry_date).num_days()
    }

    pub fn days_to_expiry(&self, date: NaiveDate) -> i64 {
        (self.expiration() - date).num_days()
    }

    /// Settlement value of both legs at `spot`.
    pub fn intrinsic_value(&self, spot: f64) -> f64 {
        (self.call.contract.intrinsic(spot) + self.put.contract.intrinsic(spot)) * self.size.units()
    }

    /// Replace both legs with fresh valuations.
    pub(crate) fn update_legs(&mut self, call: PricedOption, put: PricedOption) {
        self.call = call;
        self.put = put;
        self.current_value = (call.price + put.price) * self.size.units();
    }

    /// Close the position and return realized P&L.
    pub(crate) fn close(&mut self, exit: PositionExit) -> f64 {
        let pnl = exit.proceeds - self.entry_cost;
        self.status = PositionStatus::Closed;
        self.current_value = exit.proceeds;
        self.exit = Some(exit);
        self.realized_pnl = Some(pnl);
        pnl
    }
}

/// A completed trade (closed position) for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub position: StraddlePosition,
    pub days_held: i64,
    /// Realized P&L over premium paid.
    pub return_on_premium: f64,
}

impl Trade {
    /// Create a trade from a closed position.
    pub fn from_position(position: StraddlePosition) -> Option<Self> {
        if position.is_open() {
            return None;
        }

        let exit = position.exit?;
        let pnl = position.realized_pnl?;
        let days_held = position.days_held(exit.date);
        let return_on_premium = if position.entry_cost != 0.0 {
            pnl / position.entry_cost
        } else {
            0.0
        };

        Some(Self {
            position,
            days_held,
            return_on_premium,
        })
    }

    pub fn is_winner(&self) -> bool {
        self.pnl() > 0.0
    }

    pub fn pnl(&self) -> f64 {
        self.position.realized_pnl.unwrap_or(0.0)
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.position.exit.map(|e| e.reason)
    }
}
