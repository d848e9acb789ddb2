//! Persistence port traits.
//!
//! Each repository trait covers one aggregate. [`UnitOfWork`] hands out a
//! [`LedgerTx`] for multi-row mutations that must commit or roll back as one.

use chrono::{DateTime, Utc};

use crate::domain::admin::OrderStats;
use crate::domain::alert::{AlertView, NewAlert};
use crate::domain::commodity::{Commodity, NewCommodity, QuoteUpdate};
use crate::domain::error::CommodityxError;
use crate::domain::ledger::{LedgerEntry, NewLedgerEntry};
use crate::domain::order::{NewOrder, Order, OrderStatus};
use crate::domain::position::{Holding, Position};
use crate::domain::user::{Registration, User, UserRecord};
use crate::domain::watchlist::WatchlistItem;

pub trait UserRepo {
    /// Insert the user and their opening DEPOSIT in one transaction.
    fn create_user(
        &self,
        registration: &Registration,
        password_hash: &str,
        initial_balance: f64,
        is_admin: bool,
        now: DateTime<Utc>,
    ) -> Result<User, CommodityxError>;

    fn find_user(&self, id: i64) -> Result<Option<User>, CommodityxError>;

    fn find_user_record(&self, username: &str) -> Result<Option<UserRecord>, CommodityxError>;

    fn find_user_record_by_id(&self, id: i64) -> Result<Option<UserRecord>, CommodityxError>;

    fn username_taken(&self, username: &str) -> Result<bool, CommodityxError>;

    /// Whether another user (other than `except`) already uses `email`.
    fn email_taken(&self, email: &str, except: Option<i64>) -> Result<bool, CommodityxError>;

    fn update_profile(
        &self,
        id: i64,
        full_name: Option<&str>,
        email: Option<&str>,
    ) -> Result<User, CommodityxError>;

    fn list_users(&self) -> Result<Vec<User>, CommodityxError>;

    /// Deletes the user and, by cascade, everything they own.
    fn delete_user(&self, id: i64) -> Result<bool, CommodityxError>;

    fn count_users(&self) -> Result<i64, CommodityxError>;
}

pub trait CommodityRepo {
    fn list_commodities(&self) -> Result<Vec<Commodity>, CommodityxError>;

    fn find_commodity(&self, symbol: &str) -> Result<Option<Commodity>, CommodityxError>;

    /// Fails with `Conflict` when the symbol is already listed.
    fn create_commodity(
        &self,
        commodity: &NewCommodity,
        now: DateTime<Utc>,
    ) -> Result<Commodity, CommodityxError>;

    fn upsert_commodity(
        &self,
        commodity: &NewCommodity,
        now: DateTime<Utc>,
    ) -> Result<(), CommodityxError>;

    fn update_quote(
        &self,
        symbol: &str,
        quote: &QuoteUpdate,
        now: DateTime<Utc>,
    ) -> Result<Commodity, CommodityxError>;

    fn delete_commodity(&self, symbol: &str) -> Result<bool, CommodityxError>;

    fn count_commodities(&self) -> Result<i64, CommodityxError>;
}

pub trait PositionRepo {
    fn find_position(
        &self,
        user_id: i64,
        symbol: &str,
    ) -> Result<Option<Position>, CommodityxError>;

    /// Open positions joined with quotes, most recently updated first.
    fn list_holdings(&self, user_id: i64) -> Result<Vec<Holding>, CommodityxError>;
}

pub trait OrderRepo {
    fn list_orders(&self, user_id: i64) -> Result<Vec<Order>, CommodityxError>;

    fn list_all_orders(&self) -> Result<Vec<Order>, CommodityxError>;

    fn order_stats(&self) -> Result<OrderStats, CommodityxError>;
}

pub trait TransactionRepo {
    /// Newest first.
    fn list_transactions(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, CommodityxError>;

    fn list_all_transactions(&self, limit: usize) -> Result<Vec<LedgerEntry>, CommodityxError>;

    fn count_transactions(&self) -> Result<i64, CommodityxError>;
}

pub trait WatchlistRepo {
    fn list_watchlist(&self, user_id: i64) -> Result<Vec<WatchlistItem>, CommodityxError>;

    /// Returns `None` when the symbol is already watched.
    fn add_to_watchlist(
        &self,
        user_id: i64,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, CommodityxError>;

    fn remove_from_watchlist(&self, user_id: i64, symbol: &str) -> Result<bool, CommodityxError>;
}

pub trait AlertRepo {
    fn create_alert(
        &self,
        user_id: i64,
        alert: &NewAlert,
        now: DateTime<Utc>,
    ) -> Result<i64, CommodityxError>;

    fn list_active_alerts(&self, user_id: i64) -> Result<Vec<AlertView>, CommodityxError>;

    /// Active alerts of every user whose commodity still exists.
    fn list_all_active_alerts(&self) -> Result<Vec<AlertView>, CommodityxError>;

    /// Flip an alert to inactive. Returns false if it was already inactive.
    fn deactivate_alert(&self, id: i64, now: DateTime<Utc>) -> Result<bool, CommodityxError>;

    fn delete_alert(&self, id: i64, user_id: i64) -> Result<bool, CommodityxError>;
}

/// Operations available inside an open unit of work.
///
/// Dropping the value without calling [`commit`](LedgerTx::commit) rolls
/// every change back.
pub trait LedgerTx {
    fn balance(&self, user_id: i64) -> Result<Option<f64>, CommodityxError>;

    /// Add `delta` to the balance and return the result. Refuses to take
    /// the balance below zero.
    fn adjust_balance(&self, user_id: i64, delta: f64) -> Result<f64, CommodityxError>;

    fn record_transaction(&self, entry: &NewLedgerEntry) -> Result<i64, CommodityxError>;

    fn find_commodity(&self, symbol: &str) -> Result<Option<Commodity>, CommodityxError>;

    fn find_position(
        &self,
        user_id: i64,
        symbol: &str,
    ) -> Result<Option<Position>, CommodityxError>;

    fn save_position(&self, position: &Position) -> Result<(), CommodityxError>;

    fn delete_position(&self, user_id: i64, symbol: &str) -> Result<(), CommodityxError>;

    fn insert_order(&self, order: &NewOrder) -> Result<i64, CommodityxError>;

    fn find_order(&self, id: i64) -> Result<Option<Order>, CommodityxError>;

    fn find_order_by_client_id(
        &self,
        user_id: i64,
        client_order_id: &str,
    ) -> Result<Option<Order>, CommodityxError>;

    fn set_order_status(&self, id: i64, status: OrderStatus) -> Result<(), CommodityxError>;

    fn commit(self: Box<Self>) -> Result<(), CommodityxError>;
}

pub trait UnitOfWork {
    /// Open a unit of work holding the store's write lock.
    fn begin(&self) -> Result<Box<dyn LedgerTx + '_>, CommodityxError>;
}

/// Everything the application needs from persistence.
pub trait Store:
    UserRepo
    + CommodityRepo
    + PositionRepo
    + OrderRepo
    + TransactionRepo
    + WatchlistRepo
    + AlertRepo
    + UnitOfWork
    + Send
    + Sync
{
}

impl<T> Store for T where
    T: UserRepo
        + CommodityRepo
        + PositionRepo
        + OrderRepo
        + TransactionRepo
        + WatchlistRepo
        + AlertRepo
        + UnitOfWork
        + Send
        + Sync
{
}
