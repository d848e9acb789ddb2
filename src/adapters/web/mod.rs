//! Web server adapter.
//!
//! JSON REST API under `/api`, authenticated with cookie sessions.

mod auth;
mod error;
mod handlers;

pub use auth::{AuthSession, Backend, Credentials, SessionUser};
pub use error::WebError;

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    routing::{delete, get, post, put},
};
use axum_login::AuthManagerLayerBuilder;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tower_sessions::cookie::Key;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::domain::error::CommodityxError;
use crate::domain::execution::TradingEngine;
use crate::domain::ledger::DEFAULT_HISTORY_LIMIT;
use crate::domain::user::DEFAULT_INITIAL_BALANCE;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::Store;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";
pub const DEFAULT_SESSION_LIFETIME: i64 = 86_400;

/// Settings read from the `[web]`, `[auth]` and `[trading]` sections.
#[derive(Debug, Clone)]
pub struct WebSettings {
    pub listen: String,
    pub cors_origin: Option<String>,
    /// 64-byte cookie signing key.
    pub session_key: Option<Vec<u8>>,
    pub session_lifetime: i64,
    pub secure_cookies: bool,
    pub initial_balance: f64,
    pub history_limit: usize,
}

impl Default for WebSettings {
    fn default() -> Self {
        WebSettings {
            listen: DEFAULT_LISTEN.to_string(),
            cors_origin: None,
            session_key: None,
            session_lifetime: DEFAULT_SESSION_LIFETIME,
            secure_cookies: false,
            initial_balance: DEFAULT_INITIAL_BALANCE,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl WebSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, CommodityxError> {
        let invalid = |section: &str, key: &str, reason: String| CommodityxError::ConfigInvalid {
            section: section.into(),
            key: key.into(),
            reason,
        };

        let session_key = match config.get_string("auth", "session_secret") {
            Some(secret) if !secret.trim().is_empty() => {
                let bytes = hex::decode(secret.trim())
                    .map_err(|e| invalid("auth", "session_secret", e.to_string()))?;
                if bytes.len() != 64 {
                    return Err(invalid(
                        "auth",
                        "session_secret",
                        format!("expected 128 hex characters, got {}", secret.trim().len()),
                    ));
                }
                Some(bytes)
            }
            _ => None,
        };

        let session_lifetime =
            config.get_int("auth", "session_lifetime", DEFAULT_SESSION_LIFETIME);
        if session_lifetime <= 0 {
            return Err(invalid(
                "auth",
                "session_lifetime",
                format!("must be positive, got {session_lifetime}"),
            ));
        }

        let initial_balance =
            config.get_double("trading", "initial_balance", DEFAULT_INITIAL_BALANCE);
        if !(initial_balance.is_finite() && initial_balance >= 0.0) {
            return Err(invalid(
                "trading",
                "initial_balance",
                format!("must not be negative, got {initial_balance}"),
            ));
        }

        let history_limit =
            config.get_int("trading", "history_limit", DEFAULT_HISTORY_LIMIT as i64);
        let history_limit = usize::try_from(history_limit)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                invalid(
                    "trading",
                    "history_limit",
                    format!("must be positive, got {history_limit}"),
                )
            })?;

        Ok(WebSettings {
            listen: config
                .get_string("web", "listen")
                .unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
            cors_origin: config
                .get_string("web", "cors_origin")
                .filter(|o| !o.trim().is_empty()),
            session_key,
            session_lifetime,
            secure_cookies: config.get_bool("auth", "secure_cookies", false),
            initial_balance,
            history_limit,
        })
    }
}

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub engine: TradingEngine,
    pub settings: WebSettings,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, settings: WebSettings) -> Self {
        AppState {
            engine: TradingEngine::new(Arc::clone(&store)),
            store,
            settings,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let key = match &state.settings.session_key {
        Some(bytes) => Key::from(bytes.as_slice()),
        None => {
            tracing::warn!(
                "no [auth] session_secret configured; sessions will not survive a restart"
            );
            Key::generate()
        }
    };
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(state.settings.secure_cookies)
        .with_expiry(Expiry::OnInactivity(time::Duration::seconds(
            state.settings.session_lifetime,
        )))
        .with_signed(key);
    let backend = Backend::new(Arc::clone(&state.store));
    let auth_layer = AuthManagerLayerBuilder::new(backend, session_layer).build();
    let cors_origin = state.settings.cors_origin.clone();

    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .route(
            "/auth/profile",
            get(handlers::get_profile).put(handlers::update_profile),
        )
        .route(
            "/commodities",
            get(handlers::list_commodities).post(handlers::create_commodity),
        )
        .route(
            "/commodities/{symbol}",
            get(handlers::get_commodity).delete(handlers::delete_commodity),
        )
        .route("/commodities/{symbol}/price", put(handlers::update_price))
        .route("/trading/buy", post(handlers::buy))
        .route("/trading/sell", post(handlers::sell))
        .route("/trading/portfolio", get(handlers::portfolio))
        .route("/trading/portfolio/{symbol}", get(handlers::holding))
        .route("/trading/orders", get(handlers::orders))
        .route("/trading/orders/{id}/cancel", post(handlers::cancel_order))
        .route(
            "/watchlist",
            get(handlers::list_watchlist).post(handlers::add_to_watchlist),
        )
        .route("/watchlist/{symbol}", delete(handlers::remove_from_watchlist))
        .route(
            "/alerts",
            get(handlers::list_alerts).post(handlers::create_alert),
        )
        .route("/alerts/check", post(handlers::check_alerts))
        .route("/alerts/{id}", delete(handlers::delete_alert))
        .route("/transactions", get(handlers::transactions))
        .route("/transactions/deposit", post(handlers::deposit))
        .route("/transactions/withdraw", post(handlers::withdraw))
        .route("/admin/users", get(handlers::admin_users))
        .route(
            "/admin/users/{id}",
            get(handlers::admin_user_details).delete(handlers::admin_delete_user),
        )
        .route("/admin/orders", get(handlers::admin_orders))
        .route("/admin/transactions", get(handlers::admin_transactions))
        .route("/admin/stats", get(handlers::admin_stats))
        .with_state(Arc::new(state));

    let mut router = Router::new()
        .nest("/api", api)
        .fallback(handlers::not_found)
        .layer(auth_layer)
        .layer(TraceLayer::new_for_http());

    if let Some(origin) = cors_origin {
        match origin.parse::<HeaderValue>() {
            Ok(origin) => {
                router = router.layer(
                    CorsLayer::new()
                        .allow_origin(origin)
                        .allow_credentials(true)
                        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                        .allow_headers([
                            header::CONTENT_TYPE,
                            HeaderName::from_static(handlers::IDEMPOTENCY_KEY),
                        ]),
                );
            }
            Err(e) => tracing::warn!(%origin, error = %e, "ignoring invalid cors_origin"),
        }
    }

    router
}
