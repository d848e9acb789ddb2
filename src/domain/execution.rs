//! Order execution engine.
//!
//! A buy or sell touches the cash balance, the position book, the order log
//! and the transaction log. All four are written inside a single unit of
//! work, so a failure at any step leaves the store exactly as it was.

use chrono::Utc;
use std::sync::Arc;

use super::error::CommodityxError;
use super::ledger::{MONEY_EPSILON, NewLedgerEntry, TransactionType};
use super::order::{NewOrder, Order, OrderSide, OrderStatus, TradeReceipt, TradeRequest};
use super::position::Position;
use crate::ports::store_port::{LedgerTx, Store};

pub struct TradingEngine {
    store: Arc<dyn Store>,
}

impl TradingEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        TradingEngine { store }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn execute_buy(&self, request: &TradeRequest) -> Result<TradeReceipt, CommodityxError> {
        self.execute(OrderSide::Buy, request)
    }

    pub fn execute_sell(&self, request: &TradeRequest) -> Result<TradeReceipt, CommodityxError> {
        self.execute(OrderSide::Sell, request)
    }

    /// Cancel a pending order owned by `user_id`.
    ///
    /// Orders of other users are reported as not found.
    pub fn cancel_order(&self, user_id: i64, order_id: i64) -> Result<Order, CommodityxError> {
        let tx = self.store.begin()?;
        let order = tx
            .find_order(order_id)?
            .filter(|o| o.user_id == user_id)
            .ok_or(CommodityxError::OrderNotFound { id: order_id })?;

        if order.status != OrderStatus::Pending {
            return Err(CommodityxError::OrderNotCancellable {
                id: order_id,
                status: order.status.to_string(),
            });
        }

        tx.set_order_status(order_id, OrderStatus::Cancelled)?;
        tx.commit()?;
        tracing::info!(user_id, order_id, "order cancelled");

        Ok(Order {
            status: OrderStatus::Cancelled,
            ..order
        })
    }

    fn execute(
        &self,
        side: OrderSide,
        request: &TradeRequest,
    ) -> Result<TradeReceipt, CommodityxError> {
        request.validate()?;
        let user_id = request.user_id;
        let symbol = request.symbol.trim();

        let tx = self.store.begin()?;

        if let Some(key) = request.client_order_id.as_deref() {
            if let Some(existing) = tx.find_order_by_client_id(user_id, key)? {
                return replay(tx.as_ref(), existing, side, symbol);
            }
        }

        let quantity = request.quantity;
        let commodity = tx.find_commodity(symbol)?;
        let now = Utc::now();

        let (transaction_type, description, price, total, new_balance) = match side {
            OrderSide::Buy => {
                let commodity = commodity.ok_or_else(|| CommodityxError::CommodityNotFound {
                    symbol: symbol.to_string(),
                })?;
                let price = request.price.unwrap_or(commodity.current_price);
                let total = trade_total(quantity, price)?;

                let available = tx
                    .balance(user_id)?
                    .ok_or(CommodityxError::UserNotFound { id: user_id })?;
                if available + MONEY_EPSILON < total {
                    return Err(CommodityxError::InsufficientFunds {
                        required: total,
                        available,
                    });
                }
                let new_balance = tx.adjust_balance(user_id, -total)?;

                let position = match tx.find_position(user_id, symbol)? {
                    Some(mut existing) => {
                        existing.apply_buy(quantity, price, now);
                        existing
                    }
                    None => Position::open(user_id, symbol, quantity, price, now),
                };
                tx.save_position(&position)?;

                (
                    TransactionType::TradeBuy,
                    format!("Bought {quantity} units of {} at ${price}", commodity.name),
                    price,
                    total,
                    new_balance,
                )
            }
            OrderSide::Sell => {
                let mut position = tx.find_position(user_id, symbol)?.ok_or_else(|| {
                    CommodityxError::InsufficientHoldings {
                        symbol: symbol.to_string(),
                        requested: quantity,
                        held: 0.0,
                    }
                })?;
                let outcome = position.apply_sell(quantity, now)?;

                // a delisted commodity has no quote to fall back on
                let price = match (request.price, commodity.as_ref()) {
                    (Some(price), _) => price,
                    (None, Some(c)) => c.current_price,
                    (None, None) => {
                        return Err(CommodityxError::validation(
                            "price",
                            format!("{symbol} has no market price"),
                        ));
                    }
                };
                let total = trade_total(quantity, price)?;

                if outcome.closed {
                    tx.delete_position(user_id, symbol)?;
                } else {
                    tx.save_position(&position)?;
                }
                let new_balance = tx.adjust_balance(user_id, total)?;
                tracing::debug!(
                    user_id,
                    symbol,
                    realized = total - outcome.sold_cost,
                    "position reduced"
                );

                let name = commodity.map_or_else(|| symbol.to_string(), |c| c.name);
                (
                    TransactionType::TradeSell,
                    format!("Sold {quantity} units of {name} at ${price}"),
                    price,
                    total,
                    new_balance,
                )
            }
        };

        let order_id = tx.insert_order(&NewOrder {
            user_id,
            commodity_symbol: symbol.to_string(),
            order_type: side,
            quantity,
            price,
            total_amount: total,
            status: OrderStatus::Completed,
            client_order_id: request.client_order_id.clone(),
            created_at: now,
        })?;
        tx.record_transaction(&NewLedgerEntry {
            user_id,
            transaction_type,
            amount: total,
            description,
            created_at: now,
        })?;
        tx.commit()?;

        tracing::info!(
            user_id,
            order_id,
            side = %side,
            symbol,
            quantity,
            price,
            total,
            new_balance,
            "order executed"
        );

        Ok(TradeReceipt {
            order_id,
            order_type: side,
            commodity_symbol: symbol.to_string(),
            quantity,
            price,
            total_amount: total,
            new_balance,
            replayed: false,
        })
    }
}

/// Cash value of a trade. Overflow is rejected before anything is written.
fn trade_total(quantity: f64, price: f64) -> Result<f64, CommodityxError> {
    let total = quantity * price;
    if total.is_finite() {
        Ok(total)
    } else {
        Err(CommodityxError::validation(
            "price",
            "invalid quantity or price",
        ))
    }
}

/// Answer a resubmitted request with the order it originally produced.
fn replay(
    tx: &dyn LedgerTx,
    existing: Order,
    side: OrderSide,
    symbol: &str,
) -> Result<TradeReceipt, CommodityxError> {
    if existing.order_type != side || existing.commodity_symbol != symbol {
        return Err(CommodityxError::Conflict {
            reason: "idempotency key already used for a different order".to_string(),
        });
    }
    let new_balance = tx
        .balance(existing.user_id)?
        .ok_or(CommodityxError::UserNotFound {
            id: existing.user_id,
        })?;
    tracing::debug!(
        user_id = existing.user_id,
        order_id = existing.id,
        "idempotent replay"
    );
    Ok(TradeReceipt {
        order_id: existing.id,
        order_type: existing.order_type,
        commodity_symbol: existing.commodity_symbol,
        quantity: existing.quantity,
        price: existing.price,
        total_amount: existing.total_amount,
        new_balance,
        replayed: true,
    })
}
