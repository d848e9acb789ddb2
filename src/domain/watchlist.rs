//! Per-user watchlist of commodity symbols.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::commodity::validate_symbol;
use super::error::CommodityxError;
use crate::ports::store_port::Store;

/// A watched symbol joined with its latest quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchlistItem {
    pub id: i64,
    pub user_id: i64,
    pub commodity_symbol: String,
    pub added_at: DateTime<Utc>,
    pub name: Option<String>,
    pub current_price: Option<f64>,
    pub change_percent: Option<f64>,
}

pub fn add(store: &dyn Store, user_id: i64, symbol: &str) -> Result<i64, CommodityxError> {
    validate_symbol(symbol)?;
    let symbol = symbol.trim();
    if store.find_commodity(symbol)?.is_none() {
        return Err(CommodityxError::CommodityNotFound {
            symbol: symbol.to_string(),
        });
    }
    store
        .add_to_watchlist(user_id, symbol, Utc::now())?
        .ok_or_else(|| CommodityxError::AlreadyInWatchlist {
            symbol: symbol.to_string(),
        })
}

pub fn remove(store: &dyn Store, user_id: i64, symbol: &str) -> Result<(), CommodityxError> {
    if store.remove_from_watchlist(user_id, symbol)? {
        Ok(())
    } else {
        Err(CommodityxError::NotInWatchlist {
            symbol: symbol.to_string(),
        })
    }
}
