//! CSV quote feed adapter.
//!
//! Expected header:
//! `symbol,name,current_price,previous_close,open_price,high_price,low_price,volume,change_percent`.
//! Every column after `current_price` may be left empty.

use crate::domain::commodity::{NewCommodity, QuoteUpdate};
use crate::domain::error::CommodityxError;
use crate::ports::quote_port::QuoteFeed;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
struct QuoteRow {
    symbol: String,
    name: String,
    current_price: f64,
    previous_close: Option<f64>,
    open_price: Option<f64>,
    high_price: Option<f64>,
    low_price: Option<f64>,
    volume: Option<i64>,
    change_percent: Option<f64>,
}

impl From<QuoteRow> for NewCommodity {
    fn from(row: QuoteRow) -> Self {
        NewCommodity {
            symbol: row.symbol,
            name: row.name,
            quote: QuoteUpdate {
                current_price: row.current_price,
                previous_close: row.previous_close,
                open_price: row.open_price,
                high_price: row.high_price,
                low_price: row.low_price,
                volume: row.volume,
                change_percent: row.change_percent,
            },
            market_cap: None,
        }
    }
}

pub struct CsvQuoteFeed {
    path: PathBuf,
}

impl CsvQuoteFeed {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Parse quotes from any reader; used by [`QuoteFeed::fetch_quotes`].
    pub fn parse<R: std::io::Read>(reader: R) -> Result<Vec<NewCommodity>, CommodityxError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut quotes = Vec::new();
        for (index, result) in rdr.deserialize::<QuoteRow>().enumerate() {
            let row = result.map_err(|e| CommodityxError::QuoteFeed {
                reason: format!("row {}: {}", index + 1, e),
            })?;
            quotes.push(NewCommodity::from(row));
        }
        Ok(quotes)
    }
}

impl QuoteFeed for CsvQuoteFeed {
    fn fetch_quotes(&self) -> Result<Vec<NewCommodity>, CommodityxError> {
        let file = std::fs::File::open(&self.path).map_err(|e| CommodityxError::QuoteFeed {
            reason: format!("failed to read {}: {}", self.path.display(), e),
        })?;
        Self::parse(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const HEADER: &str =
        "symbol,name,current_price,previous_close,open_price,high_price,low_price,volume,change_percent\n";

    #[test]
    fn parses_full_and_sparse_rows() {
        let content = format!(
            "{HEADER}GC=F,Gold,2050.50,2045.00,2048.00,2055.00,2042.00,125000,0.27\n\
             CL=F, Crude Oil ,78.25,,,,,,\n"
        );
        let quotes = CsvQuoteFeed::parse(content.as_bytes()).unwrap();

        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].symbol, "GC=F");
        assert_eq!(quotes[0].quote.current_price, 2050.50);
        assert_eq!(quotes[0].quote.volume, Some(125000));
        assert_eq!(quotes[0].quote.change_percent, Some(0.27));

        assert_eq!(quotes[1].name, "Crude Oil");
        assert_eq!(quotes[1].quote.previous_close, None);
        assert_eq!(quotes[1].quote.change_percent, None);
    }

    #[test]
    fn malformed_price_names_the_row() {
        let content = format!("{HEADER}GC=F,Gold,2050.50,,,,,,\nSI=F,Silver,cheap,,,,,,\n");
        let err = CsvQuoteFeed::parse(content.as_bytes()).unwrap_err();
        match err {
            CommodityxError::QuoteFeed { reason } => assert!(reason.starts_with("row 2")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn fetch_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quotes.csv");
        fs::write(&path, format!("{HEADER}KC=F,Coffee,185.75,184.50,,,,,\n")).unwrap();

        let quotes = CsvQuoteFeed::new(path).fetch_quotes().unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].quote.previous_close, Some(184.50));
    }

    #[test]
    fn fetch_missing_file_is_feed_error() {
        let feed = CsvQuoteFeed::new(PathBuf::from("/nonexistent/quotes.csv"));
        assert!(matches!(
            feed.fetch_quotes(),
            Err(CommodityxError::QuoteFeed { .. })
        ));
    }
}
