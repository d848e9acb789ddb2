//! Cash ledger: balance mutations and the append-only transaction log.
//!
//! Every change to a user's cash balance is paired with a [`LedgerEntry`]
//! written in the same unit of work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::CommodityxError;
use crate::ports::store_port::Store;

/// Tolerance for money comparisons on `f64` amounts.
pub const MONEY_EPSILON: f64 = 1e-6;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const MAX_HISTORY_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    TradeBuy,
    TradeSell,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
            TransactionType::TradeBuy => "TRADE_BUY",
            TransactionType::TradeSell => "TRADE_SELL",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = CommodityxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(TransactionType::Deposit),
            "WITHDRAWAL" => Ok(TransactionType::Withdrawal),
            "TRADE_BUY" => Ok(TransactionType::TradeBuy),
            "TRADE_SELL" => Ok(TransactionType::TradeSell),
            other => Err(CommodityxError::validation(
                "transaction_type",
                format!("unknown transaction type {other}"),
            )),
        }
    }
}

/// One row of the transaction log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: i64,
    pub transaction_type: TransactionType,
    pub amount: f64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub user_id: i64,
    pub transaction_type: TransactionType,
    pub amount: f64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Amounts must be finite and strictly positive; the type carries the sign.
pub fn validate_amount(amount: f64) -> Result<(), CommodityxError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(CommodityxError::validation("amount", "invalid amount"))
    }
}

/// Apply `delta` to `balance`, refusing to go below zero or past the range
/// of a finite `f64`.
///
/// Results within [`MONEY_EPSILON`] of zero are clamped to exactly zero.
pub fn apply_delta(balance: f64, delta: f64) -> Result<f64, CommodityxError> {
    let next = balance + delta;
    if !next.is_finite() {
        return Err(CommodityxError::validation("amount", "balance out of range"));
    }
    if next < -MONEY_EPSILON {
        return Err(CommodityxError::InsufficientFunds {
            required: -delta,
            available: balance,
        });
    }
    Ok(if next.abs() < MONEY_EPSILON { 0.0 } else { next })
}

/// Clamp a caller-supplied history limit into the supported range.
pub fn clamp_limit(limit: Option<usize>, default: usize) -> usize {
    match limit {
        Some(0) | None => default,
        Some(n) => n.min(MAX_HISTORY_LIMIT),
    }
}

pub fn balance(store: &dyn Store, user_id: i64) -> Result<f64, CommodityxError> {
    store
        .find_user(user_id)?
        .map(|u| u.balance)
        .ok_or(CommodityxError::UserNotFound { id: user_id })
}

/// Credit the user's cash balance. Returns the new balance.
pub fn deposit(store: &dyn Store, user_id: i64, amount: f64) -> Result<f64, CommodityxError> {
    validate_amount(amount)?;
    let tx = store.begin()?;
    if tx.balance(user_id)?.is_none() {
        return Err(CommodityxError::UserNotFound { id: user_id });
    }
    let new_balance = tx.adjust_balance(user_id, amount)?;
    tx.record_transaction(&NewLedgerEntry {
        user_id,
        transaction_type: TransactionType::Deposit,
        amount,
        description: "Account deposit".to_string(),
        created_at: Utc::now(),
    })?;
    tx.commit()?;
    tracing::info!(user_id, amount, new_balance, "deposit recorded");
    Ok(new_balance)
}

/// Debit the user's cash balance. Fails without side effects when short.
pub fn withdraw(store: &dyn Store, user_id: i64, amount: f64) -> Result<f64, CommodityxError> {
    validate_amount(amount)?;
    let tx = store.begin()?;
    let available = tx
        .balance(user_id)?
        .ok_or(CommodityxError::UserNotFound { id: user_id })?;
    if available + MONEY_EPSILON < amount {
        return Err(CommodityxError::InsufficientFunds {
            required: amount,
            available,
        });
    }
    let new_balance = tx.adjust_balance(user_id, -amount)?;
    tx.record_transaction(&NewLedgerEntry {
        user_id,
        transaction_type: TransactionType::Withdrawal,
        amount,
        description: "Account withdrawal".to_string(),
        created_at: Utc::now(),
    })?;
    tx.commit()?;
    tracing::info!(user_id, amount, new_balance, "withdrawal recorded");
    Ok(new_balance)
}

pub fn history(
    store: &dyn Store,
    user_id: i64,
    limit: Option<usize>,
    default_limit: usize,
) -> Result<Vec<LedgerEntry>, CommodityxError> {
    store.list_transactions(user_id, clamp_limit(limit, default_limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_type_round_trips_through_str() {
        for t in [
            TransactionType::Deposit,
            TransactionType::Withdrawal,
            TransactionType::TradeBuy,
            TransactionType::TradeSell,
        ] {
            assert_eq!(t.as_str().parse::<TransactionType>().unwrap(), t);
        }
        assert!("REFUND".parse::<TransactionType>().is_err());
    }

    #[test]
    fn serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&TransactionType::TradeBuy).unwrap();
        assert_eq!(json, "\"TRADE_BUY\"");
    }

    #[test]
    fn apply_delta_refuses_negative_result() {
        assert_eq!(apply_delta(100.0, -40.0).unwrap(), 60.0);
        assert!(matches!(
            apply_delta(100.0, -100.01),
            Err(CommodityxError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn apply_delta_refuses_overflow() {
        let err = apply_delta(f64::MAX, f64::MAX).unwrap_err();
        assert!(matches!(err, CommodityxError::Validation { .. }));
        assert!(apply_delta(100.0, f64::NAN).is_err());
    }

    #[test]
    fn apply_delta_clamps_rounding_dust_to_zero() {
        let balance = 0.1 + 0.2;
        assert_eq!(apply_delta(balance, -0.3).unwrap(), 0.0);
    }

    #[test]
    fn amount_must_be_positive() {
        assert!(validate_amount(0.0).is_err());
        assert!(validate_amount(-5.0).is_err());
        assert!(validate_amount(f64::INFINITY).is_err());
        assert!(validate_amount(0.01).is_ok());
    }

    #[test]
    fn clamp_limit_bounds() {
        assert_eq!(clamp_limit(None, 50), 50);
        assert_eq!(clamp_limit(Some(0), 50), 50);
        assert_eq!(clamp_limit(Some(10), 50), 10);
        assert_eq!(clamp_limit(Some(10_000), 50), MAX_HISTORY_LIMIT);
    }
}
