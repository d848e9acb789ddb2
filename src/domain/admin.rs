//! Administrative queries and user management.

use serde::Serialize;

use super::error::CommodityxError;
use super::ledger::LedgerEntry;
use super::order::Order;
use super::user::User;
use crate::ports::store_port::Store;

/// Transactions shown in a user's admin detail view.
pub const USER_DETAIL_TRANSACTIONS: usize = 20;

pub const DEFAULT_ADMIN_TRANSACTION_LIMIT: usize = 100;

/// Aggregates over the order log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OrderStats {
    pub total_orders: i64,
    pub buy_orders: i64,
    pub sell_orders: i64,
    /// Sum of `total_amount` over all orders.
    pub total_volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformStats {
    pub total_users: i64,
    pub total_orders: i64,
    pub buy_orders: i64,
    pub sell_orders: i64,
    pub total_commodities: i64,
    pub total_volume: f64,
    pub total_transactions: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserDetails {
    pub user: User,
    pub orders: Vec<Order>,
    pub transactions: Vec<LedgerEntry>,
}

pub fn platform_stats(store: &dyn Store) -> Result<PlatformStats, CommodityxError> {
    let orders = store.order_stats()?;
    Ok(PlatformStats {
        total_users: store.count_users()?,
        total_orders: orders.total_orders,
        buy_orders: orders.buy_orders,
        sell_orders: orders.sell_orders,
        total_commodities: store.count_commodities()?,
        total_volume: orders.total_volume,
        total_transactions: store.count_transactions()?,
    })
}

pub fn user_details(store: &dyn Store, user_id: i64) -> Result<UserDetails, CommodityxError> {
    let user = store
        .find_user(user_id)?
        .ok_or(CommodityxError::UserNotFound { id: user_id })?;
    Ok(UserDetails {
        user,
        orders: store.list_orders(user_id)?,
        transactions: store.list_transactions(user_id, USER_DETAIL_TRANSACTIONS)?,
    })
}

/// Delete `target_id` on behalf of `acting_admin_id`. Admins cannot delete
/// their own account.
pub fn delete_user(
    store: &dyn Store,
    acting_admin_id: i64,
    target_id: i64,
) -> Result<(), CommodityxError> {
    if acting_admin_id == target_id {
        return Err(CommodityxError::validation(
            "id",
            "cannot delete your own account",
        ));
    }
    if !store.delete_user(target_id)? {
        return Err(CommodityxError::UserNotFound { id: target_id });
    }
    tracing::warn!(admin_id = acting_admin_id, user_id = target_id, "user deleted");
    Ok(())
}
