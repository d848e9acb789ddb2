//! Applying quote feed snapshots to the commodity store.

use chrono::Utc;
use serde::Serialize;

use super::commodity::NewCommodity;
use super::error::CommodityxError;
use crate::ports::quote_port::QuoteFeed;
use crate::ports::store_port::Store;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    /// Symbols of rows that failed validation.
    pub rejected: Vec<String>,
}

/// Upsert every valid quote from `feed`. Invalid rows are skipped and
/// reported; a store failure aborts the import.
pub fn import_quotes(
    store: &dyn Store,
    feed: &dyn QuoteFeed,
) -> Result<ImportSummary, CommodityxError> {
    let quotes = feed.fetch_quotes()?;
    apply_quotes(store, quotes)
}

pub fn apply_quotes(
    store: &dyn Store,
    quotes: Vec<NewCommodity>,
) -> Result<ImportSummary, CommodityxError> {
    let now = Utc::now();
    let mut summary = ImportSummary::default();

    for mut quote in quotes {
        if let Err(e) = quote.validate() {
            tracing::warn!(symbol = %quote.symbol, error = %e, "skipping invalid quote");
            summary.rejected.push(quote.symbol);
            continue;
        }
        quote.symbol = quote.symbol.trim().to_string();
        quote.quote.change_percent = quote.quote.effective_change_percent();
        store.upsert_commodity(&quote, now)?;
        summary.imported += 1;
    }

    tracing::info!(
        imported = summary.imported,
        rejected = summary.rejected.len(),
        "quote import finished"
    );
    Ok(summary)
}
