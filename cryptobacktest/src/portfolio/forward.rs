//! Linear (forward) positions in the underlying.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A forward on the underlying, typically held against the straddles as a
/// delta hedge. Negative `quantity` is short.
///
/// Forwards contribute delta only and are not marked to market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForwardPosition {
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub quantity: f64,
    pub contract_size: f64,
}

impl ForwardPosition {
    pub fn new(entry_price: f64, quantity: f64, contract_size: f64, entry_date: NaiveDate) -> Self {
        Self {
            entry_date,
            entry_price,
            quantity,
            contract_size,
        }
    }

    /// Delta in units of the underlying.
    pub fn delta(&self) -> f64 {
        self.quantity * self.contract_size
    }

    /// Notional exposure at `spot`.
    pub fn notional(&self, spot: f64) -> f64 {
        self.delta() * spot
    }
}
