//! Order log types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::CommodityxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderSide {
    type Err = CommodityxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            other => Err(CommodityxError::validation(
                "order_type",
                format!("unknown order type {other}"),
            )),
        }
    }
}

/// Lifecycle of an order. Synchronous execution only ever yields
/// `Completed`; `Pending` rows can only come from outside this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CommodityxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "COMPLETED" => Ok(OrderStatus::Completed),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(CommodityxError::validation(
                "status",
                format!("unknown order status {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub commodity_symbol: String,
    pub order_type: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub total_amount: f64,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: i64,
    pub commodity_symbol: String,
    pub order_type: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub total_amount: f64,
    pub status: OrderStatus,
    pub client_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A buy or sell submitted on behalf of an authenticated user.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRequest {
    pub user_id: i64,
    pub symbol: String,
    pub quantity: f64,
    /// Execution price; the current quote is used when absent.
    pub price: Option<f64>,
    /// Client-chosen idempotency key.
    pub client_order_id: Option<String>,
}

impl TradeRequest {
    pub fn new(user_id: i64, symbol: &str, quantity: f64, price: f64) -> TradeRequest {
        TradeRequest {
            user_id,
            symbol: symbol.to_string(),
            quantity,
            price: Some(price),
            client_order_id: None,
        }
    }

    pub fn with_client_order_id(mut self, key: impl Into<String>) -> TradeRequest {
        self.client_order_id = Some(key.into());
        self
    }

    pub fn validate(&self) -> Result<(), CommodityxError> {
        super::commodity::validate_symbol(&self.symbol)?;
        if !(self.quantity.is_finite() && self.quantity > 0.0) {
            return Err(CommodityxError::validation(
                "quantity",
                "invalid quantity or price",
            ));
        }
        if let Some(price) = self.price {
            if !(price.is_finite() && price > 0.0) {
                return Err(CommodityxError::validation(
                    "price",
                    "invalid quantity or price",
                ));
            }
        }
        if let Some(key) = &self.client_order_id {
            if key.trim().is_empty() || key.len() > 64 {
                return Err(CommodityxError::validation(
                    "idempotency_key",
                    "must be 1 to 64 characters",
                ));
            }
        }
        Ok(())
    }
}

/// Outcome of an executed (or replayed) trade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeReceipt {
    pub order_id: i64,
    pub order_type: OrderSide,
    pub commodity_symbol: String,
    pub quantity: f64,
    pub price: f64,
    pub total_amount: f64,
    pub new_balance: f64,
    /// True when an earlier order with the same idempotency key was returned.
    pub replayed: bool,
}
