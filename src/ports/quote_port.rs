//! Quote feed port trait.

use crate::domain::commodity::NewCommodity;
use crate::domain::error::CommodityxError;

/// A source of commodity quotes, such as a CSV drop or a market data vendor.
pub trait QuoteFeed {
    fn fetch_quotes(&self) -> Result<Vec<NewCommodity>, CommodityxError>;
}
