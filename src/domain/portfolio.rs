//! Portfolio valuation.

use serde::Serialize;

use super::error::CommodityxError;
use super::ledger;
use super::position::Holding;
use crate::ports::store_port::Store;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub portfolio: Vec<Holding>,
    pub total_portfolio_value: f64,
    pub total_invested: f64,
    pub total_profit_loss: f64,
    pub cash_balance: f64,
    pub total_account_value: f64,
}

impl PortfolioSummary {
    pub fn new(holdings: Vec<Holding>, cash_balance: f64) -> Self {
        let total_portfolio_value = holdings.iter().map(|h| h.current_value).sum::<f64>();
        let total_invested = holdings
            .iter()
            .map(|h| h.position.total_invested)
            .sum::<f64>();
        PortfolioSummary {
            portfolio: holdings,
            total_portfolio_value,
            total_invested,
            total_profit_loss: total_portfolio_value - total_invested,
            cash_balance,
            total_account_value: total_portfolio_value + cash_balance,
        }
    }
}

pub fn get_portfolio(store: &dyn Store, user_id: i64) -> Result<PortfolioSummary, CommodityxError> {
    let cash = ledger::balance(store, user_id)?;
    let holdings = store.list_holdings(user_id)?;
    Ok(PortfolioSummary::new(holdings, cash))
}

/// A single holding. Fails with `PositionNotFound` when nothing is held.
pub fn get_holding(
    store: &dyn Store,
    user_id: i64,
    symbol: &str,
) -> Result<Holding, CommodityxError> {
    let position = store
        .find_position(user_id, symbol)?
        .ok_or_else(|| CommodityxError::PositionNotFound {
            symbol: symbol.to_string(),
        })?;
    let commodity = store.find_commodity(symbol)?;
    Ok(Holding::new(
        position,
        commodity.as_ref().map(|c| c.name.clone()),
        commodity.as_ref().map(|c| c.current_price),
        commodity.and_then(|c| c.change_percent),
    ))
}
