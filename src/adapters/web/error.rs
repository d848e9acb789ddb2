//! JSON error responses for the web adapter.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::auth::Backend;
use crate::domain::error::CommodityxError;

#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub message: String,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "authentication required")
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }
}

impl From<CommodityxError> for WebError {
    fn from(err: CommodityxError) -> Self {
        if !err.is_client_error() {
            tracing::error!(error = %err, "request failed");
            return Self::internal();
        }
        let status = match &err {
            CommodityxError::CommodityNotFound { .. }
            | CommodityxError::PositionNotFound { .. }
            | CommodityxError::UserNotFound { .. }
            | CommodityxError::OrderNotFound { .. }
            | CommodityxError::OrderNotCancellable { .. }
            | CommodityxError::AlertNotFound { .. }
            | CommodityxError::NotInWatchlist { .. } => StatusCode::NOT_FOUND,
            CommodityxError::Unauthorized => StatusCode::UNAUTHORIZED,
            CommodityxError::Forbidden { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, err.to_string())
    }
}

/// Malformed or incomplete request bodies are validation failures.
impl From<JsonRejection> for WebError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            format!("invalid request body: {}", rejection.body_text()),
        )
    }
}

impl From<axum_login::Error<Backend>> for WebError {
    fn from(err: axum_login::Error<Backend>) -> Self {
        match err {
            axum_login::Error::Backend(e) => e.into(),
            axum_login::Error::Session(e) => {
                tracing::error!(error = %e, "session store failure");
                Self::internal()
            }
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
