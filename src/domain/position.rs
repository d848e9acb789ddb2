//! Position book accounting.
//!
//! Holdings use weighted-average cost: every buy blends into a single running
//! average price, and a sell removes cost in proportion to the quantity sold
//! so the average price of the remainder does not move.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::CommodityxError;

/// Quantities closer than this to zero count as a closed position.
pub const QUANTITY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub user_id: i64,
    pub commodity_symbol: String,
    pub quantity: f64,
    pub average_price: f64,
    pub total_invested: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of removing quantity from a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SellOutcome {
    pub sold_cost: f64,
    pub closed: bool,
}

impl Position {
    /// A fresh position from a first buy.
    pub fn open(
        user_id: i64,
        symbol: &str,
        quantity: f64,
        price: f64,
        now: DateTime<Utc>,
    ) -> Position {
        Position {
            user_id,
            commodity_symbol: symbol.to_string(),
            quantity,
            average_price: price,
            total_invested: quantity * price,
            created_at: now,
            updated_at: now,
        }
    }

    /// Blend a buy of `quantity` at `price` into the running average.
    pub fn apply_buy(&mut self, quantity: f64, price: f64, now: DateTime<Utc>) {
        let new_quantity = self.quantity + quantity;
        let new_total = self.total_invested + quantity * price;
        self.quantity = new_quantity;
        self.total_invested = new_total;
        self.average_price = if new_quantity > 0.0 {
            new_total / new_quantity
        } else {
            0.0
        };
        self.updated_at = now;
    }

    /// Remove `quantity` units, reducing invested cost proportionally.
    ///
    /// Fails with `InsufficientHoldings` and leaves the position untouched
    /// when more is requested than is held.
    pub fn apply_sell(
        &mut self,
        quantity: f64,
        now: DateTime<Utc>,
    ) -> Result<SellOutcome, CommodityxError> {
        if quantity > self.quantity + QUANTITY_EPSILON {
            return Err(CommodityxError::InsufficientHoldings {
                symbol: self.commodity_symbol.clone(),
                requested: quantity,
                held: self.quantity,
            });
        }

        let sold_cost = (quantity / self.quantity) * self.total_invested;
        let remaining = self.quantity - quantity;

        self.quantity = remaining;
        self.total_invested -= sold_cost;
        if self.is_closed() {
            self.quantity = 0.0;
            self.total_invested = 0.0;
        }
        self.updated_at = now;

        Ok(SellOutcome {
            sold_cost,
            closed: self.is_closed(),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.quantity.abs() < QUANTITY_EPSILON
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }
}

/// A position joined with its commodity quote, plus derived P&L metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holding {
    #[serde(flatten)]
    pub position: Position,
    pub name: Option<String>,
    pub current_price: Option<f64>,
    pub change_percent: Option<f64>,
    pub current_value: f64,
    pub profit_loss: f64,
    pub profit_loss_percent: f64,
}

impl Holding {
    /// Derive valuation metrics. A missing quote values the holding at zero.
    pub fn new(
        position: Position,
        name: Option<String>,
        current_price: Option<f64>,
        change_percent: Option<f64>,
    ) -> Holding {
        let current_value = current_price
            .map(|p| position.market_value(p))
            .unwrap_or(0.0);
        let profit_loss = current_value - position.total_invested;
        let profit_loss_percent = if position.total_invested == 0.0 {
            0.0
        } else {
            profit_loss / position.total_invested * 100.0
        };
        Holding {
            position,
            name,
            current_price,
            change_percent,
            current_value,
            profit_loss,
            profit_loss_percent,
        }
    }
}
