//! Commodity reference data and quotes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::CommodityxError;

/// A tradable commodity with its latest quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Commodity {
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    pub previous_close: Option<f64>,
    pub open_price: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    pub volume: Option<i64>,
    pub market_cap: Option<f64>,
    pub change_percent: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

/// A price update from the feed or an administrator.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct QuoteUpdate {
    pub current_price: f64,
    pub previous_close: Option<f64>,
    pub open_price: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    pub volume: Option<i64>,
    pub change_percent: Option<f64>,
}

impl QuoteUpdate {
    pub fn validate(&self) -> Result<(), CommodityxError> {
        if !(self.current_price.is_finite() && self.current_price > 0.0) {
            return Err(CommodityxError::validation(
                "current_price",
                "must be greater than 0",
            ));
        }
        if let (Some(high), Some(low)) = (self.high_price, self.low_price) {
            if high < low {
                return Err(CommodityxError::validation(
                    "high_price",
                    "must not be below low_price",
                ));
            }
        }
        Ok(())
    }

    /// The supplied change percent, or one derived from the previous close.
    pub fn effective_change_percent(&self) -> Option<f64> {
        self.change_percent.or_else(|| {
            self.previous_close
                .filter(|prev| *prev > 0.0)
                .map(|prev| (self.current_price - prev) / prev * 100.0)
        })
    }
}

/// A new commodity listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewCommodity {
    pub symbol: String,
    pub name: String,
    #[serde(flatten)]
    pub quote: QuoteUpdate,
    pub market_cap: Option<f64>,
}

impl NewCommodity {
    pub fn validate(&self) -> Result<(), CommodityxError> {
        validate_symbol(&self.symbol)?;
        if self.name.trim().is_empty() {
            return Err(CommodityxError::validation("name", "is required"));
        }
        self.quote.validate()
    }
}

/// Symbols are short exchange tickers such as `GC=F`.
pub fn validate_symbol(symbol: &str) -> Result<(), CommodityxError> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() {
        return Err(CommodityxError::validation(
            "commodity_symbol",
            "is required",
        ));
    }
    if trimmed.len() > 20 {
        return Err(CommodityxError::validation(
            "commodity_symbol",
            "must be at most 20 characters",
        ));
    }
    Ok(())
}

/// Reference commodities loaded by `init-db --seed`.
pub fn default_commodities() -> Vec<NewCommodity> {
    let rows: [(&str, &str, f64, f64, f64, f64, f64, i64, f64, f64); 10] = [
        ("GC=F", "Gold", 2050.50, 2045.00, 2048.00, 2055.00, 2042.00, 125_000, 12.5e9, 0.27),
        ("SI=F", "Silver", 25.75, 25.60, 25.65, 25.90, 25.50, 85_000, 1.5e9, 0.59),
        ("CL=F", "Crude Oil", 78.25, 77.80, 78.00, 78.50, 77.50, 250_000, 8.5e9, 0.58),
        ("NG=F", "Natural Gas", 2.85, 2.90, 2.88, 2.95, 2.80, 180_000, 9.5e8, -1.72),
        ("HG=F", "Copper", 3.85, 3.82, 3.83, 3.88, 3.80, 95_000, 2.2e9, 0.79),
        ("PL=F", "Platinum", 925.50, 920.00, 922.00, 928.00, 918.00, 45_000, 7.5e8, 0.60),
        ("PA=F", "Palladium", 1050.75, 1045.00, 1048.00, 1055.00, 1042.00, 35_000, 6.5e8, 0.55),
        ("ZC=F", "Corn", 485.25, 483.50, 484.00, 487.00, 482.00, 150_000, 1.8e9, 0.36),
        ("ZW=F", "Wheat", 625.50, 622.00, 623.50, 627.00, 620.00, 120_000, 1.5e9, 0.56),
        ("KC=F", "Coffee", 185.75, 184.50, 185.00, 186.50, 184.00, 65_000, 8.5e8, 0.68),
    ];

    rows.iter()
        .map(
            |&(symbol, name, price, prev, open, high, low, volume, cap, change)| NewCommodity {
                symbol: symbol.to_string(),
                name: name.to_string(),
                quote: QuoteUpdate {
                    current_price: price,
                    previous_close: Some(prev),
                    open_price: Some(open),
                    high_price: Some(high),
                    low_price: Some(low),
                    volume: Some(volume),
                    change_percent: Some(change),
                },
                market_cap: Some(cap),
            },
        )
        .collect()
}
