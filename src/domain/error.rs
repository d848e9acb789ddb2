//! Domain error types.

/// Top-level error type for commodityx.
#[derive(Debug, thiserror::Error)]
pub enum CommodityxError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("commodity not found: {symbol}")]
    CommodityNotFound { symbol: String },

    #[error("no position held in {symbol}")]
    PositionNotFound { symbol: String },

    #[error("insufficient balance: required {required:.2}, available {available:.2}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("insufficient holdings in {symbol}: requested {requested}, held {held}")]
    InsufficientHoldings {
        symbol: String,
        requested: f64,
        held: f64,
    },

    #[error("user not found: {id}")]
    UserNotFound { id: i64 },

    #[error("order not found: {id}")]
    OrderNotFound { id: i64 },

    #[error("order {id} is {status} and cannot be cancelled")]
    OrderNotCancellable { id: i64, status: String },

    #[error("alert not found: {id}")]
    AlertNotFound { id: i64 },

    #[error("{symbol} is already in the watchlist")]
    AlreadyInWatchlist { symbol: String },

    #[error("{symbol} is not in the watchlist")]
    NotInWatchlist { symbol: String },

    #[error("{reason}")]
    Conflict { reason: String },

    #[error("invalid credentials")]
    Unauthorized,

    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("quote feed error: {reason}")]
    QuoteFeed { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CommodityxError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CommodityxError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn db(err: impl std::fmt::Display) -> Self {
        CommodityxError::Database {
            reason: err.to_string(),
        }
    }

    pub fn query(err: impl std::fmt::Display) -> Self {
        CommodityxError::DatabaseQuery {
            reason: err.to_string(),
        }
    }

    /// True for failures that are the caller's fault rather than the server's.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            CommodityxError::Database { .. }
                | CommodityxError::DatabaseQuery { .. }
                | CommodityxError::ConfigParse { .. }
                | CommodityxError::ConfigMissing { .. }
                | CommodityxError::ConfigInvalid { .. }
                | CommodityxError::QuoteFeed { .. }
                | CommodityxError::Io(_)
        )
    }
}

impl From<&CommodityxError> for std::process::ExitCode {
    fn from(err: &CommodityxError) -> Self {
        let code: u8 = match err {
            CommodityxError::Io(_) | CommodityxError::QuoteFeed { .. } => 1,
            CommodityxError::ConfigParse { .. }
            | CommodityxError::ConfigMissing { .. }
            | CommodityxError::ConfigInvalid { .. } => 2,
            CommodityxError::Database { .. } | CommodityxError::DatabaseQuery { .. } => 3,
            CommodityxError::Validation { .. }
            | CommodityxError::InsufficientFunds { .. }
            | CommodityxError::InsufficientHoldings { .. }
            | CommodityxError::OrderNotCancellable { .. }
            | CommodityxError::AlreadyInWatchlist { .. }
            | CommodityxError::Conflict { .. }
            | CommodityxError::Unauthorized
            | CommodityxError::Forbidden { .. } => 4,
            CommodityxError::CommodityNotFound { .. }
            | CommodityxError::PositionNotFound { .. }
            | CommodityxError::UserNotFound { .. }
            | CommodityxError::OrderNotFound { .. }
            | CommodityxError::AlertNotFound { .. }
            | CommodityxError::NotInWatchlist { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
