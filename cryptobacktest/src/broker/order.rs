//! Orders, fills and holdings.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::pricing::OptionContract;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Whether the order opens new exposure or reduces an existing holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderIntent {
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// Fill immediately at the order price.
    Market,
    /// Fill once the option trades through `trigger`.
    StopLoss { trigger: f64 },
}

/// An order for a single option contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub contract: OptionContract,
    pub side: OrderSide,
    pub intent: OrderIntent,
    pub kind: OrderKind,
    pub quantity: u32,
    /// Limit/fill price per contract.
    pub price: f64,
    pub date: NaiveDate,
}

impl Order {
    pub fn buy_to_open(contract: OptionContract, price: f64, date: NaiveDate) -> Self {
        Self {
            contract,
            side: OrderSide::Buy,
            intent: OrderIntent::Open,
            kind: OrderKind::Market,
            quantity: 1,
            price,
            date,
        }
    }

    pub fn sell_to_close(contract: OptionContract, price: f64, date: NaiveDate) -> Self {
        Self {
            contract,
            side: OrderSide::Sell,
            intent: OrderIntent::Close,
            kind: OrderKind::Market,
            quantity: 1,
            price,
            date,
        }
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_kind(mut self, kind: OrderKind) -> Self {
        self.kind = kind;
        self
    }

    /// Signed change in holdings if this order fills.
    pub fn signed_quantity(&self) -> i64 {
        match self.side {
            OrderSide::Buy => i64::from(self.quantity),
            OrderSide::Sell => -i64::from(self.quantity),
        }
    }

    /// Cash flow of the fill: negative when paying premium.
    pub fn cash_flow(&self) -> f64 {
        -(self.signed_quantity() as f64) * self.price
    }
}

/// An executed order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order: Order,
    pub fill_price: f64,
    pub date: NaiveDate,
}

/// Net quantity held per contract. Negative means short.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Holdings {
    entries: Vec<(OptionContract, i64)>,
}

impl Holdings {
    pub fn quantity(&self, contract: &OptionContract) -> i64 {
        self.entries
            .iter()
            .find(|(c, _)| c == contract)
            .map(|(_, q)| *q)
            .unwrap_or(0)
    }

    pub fn apply(&mut self, contract: OptionContract, delta: i64) {
        match self.entries.iter_mut().find(|(c, _)| *c == contract) {
            Some((_, quantity)) => *quantity += delta,
            None => self.entries.push((contract, delta)),
        }
        self.entries.retain(|(_, q)| *q != 0);
    }

    pub fn is_flat(&self) -> bool {
        self.entries.is_empty()
    }
}
