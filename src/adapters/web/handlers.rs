//! HTTP request handlers for the JSON API.

use axum::{
    Json,
    extract::{FromRequest, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::domain::account;
use crate::domain::admin::{self, DEFAULT_ADMIN_TRANSACTION_LIMIT};
use crate::domain::alert::{self, NewAlert};
use crate::domain::commodity::{NewCommodity, QuoteUpdate};
use crate::domain::error::CommodityxError;
use crate::domain::ledger::{self, clamp_limit};
use crate::domain::order::{OrderSide, TradeRequest};
use crate::domain::portfolio;
use crate::domain::user::{ProfileUpdate, Registration};
use crate::domain::watchlist;

use super::auth::{AuthSession, Credentials, SessionUser};
use super::{AppState, WebError};

/// Header carrying a client-chosen idempotency key for trades.
pub const IDEMPOTENCY_KEY: &str = "idempotency-key";

type Shared = State<Arc<AppState>>;

/// `Json` whose rejections are reported as 400 with a JSON error body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(WebError))]
pub struct ApiJson<T>(pub T);

/// Run store work on the blocking pool.
async fn blocking<T, F>(state: &Arc<AppState>, f: F) -> Result<T, WebError>
where
    F: FnOnce(&AppState) -> Result<T, CommodityxError> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "blocking task failed");
            WebError::internal()
        })?
        .map_err(WebError::from)
}

fn current_user(auth: &AuthSession) -> Result<SessionUser, WebError> {
    auth.user.clone().ok_or_else(WebError::unauthorized)
}

fn current_admin(auth: &AuthSession) -> Result<SessionUser, WebError> {
    let user = current_user(auth)?;
    if user.is_admin {
        Ok(user)
    } else {
        Err(CommodityxError::Forbidden {
            reason: "admin access required".to_string(),
        }
        .into())
    }
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn not_found() -> WebError {
    WebError::new(StatusCode::NOT_FOUND, "not found")
}

// ---- auth ----

pub async fn register(
    mut auth: AuthSession,
    State(state): Shared,
    ApiJson(registration): ApiJson<Registration>,
) -> Result<impl IntoResponse, WebError> {
    let (user, record) = blocking(&state, move |s| {
        let user = account::register(
            s.store.as_ref(),
            registration,
            s.settings.initial_balance,
            false,
        )?;
        let record = s
            .store
            .find_user_record_by_id(user.id)?
            .ok_or(CommodityxError::UserNotFound { id: user.id })?;
        Ok((user, record))
    })
    .await?;

    auth.login(&SessionUser::from(record)).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered successfully", "user": user })),
    ))
}

pub async fn login(
    mut auth: AuthSession,
    State(state): Shared,
    ApiJson(creds): ApiJson<Credentials>,
) -> Result<impl IntoResponse, WebError> {
    let Some(session_user) = auth.authenticate(creds).await? else {
        return Err(CommodityxError::Unauthorized.into());
    };
    auth.login(&session_user).await?;

    let id = session_user.id;
    let user = blocking(&state, move |s| account::profile(s.store.as_ref(), id)).await?;
    tracing::info!(user_id = id, "user logged in");
    Ok(Json(json!({ "message": "Login successful", "user": user })))
}

pub async fn logout(mut auth: AuthSession) -> Result<impl IntoResponse, WebError> {
    auth.logout().await?;
    Ok(Json(json!({ "message": "Logged out successfully" })))
}

pub async fn get_profile(
    auth: AuthSession,
    State(state): Shared,
) -> Result<impl IntoResponse, WebError> {
    let me = current_user(&auth)?;
    let user = blocking(&state, move |s| account::profile(s.store.as_ref(), me.id)).await?;
    Ok(Json(user))
}

pub async fn update_profile(
    auth: AuthSession,
    State(state): Shared,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> Result<impl IntoResponse, WebError> {
    let me = current_user(&auth)?;
    let user = blocking(&state, move |s| {
        account::update_profile(s.store.as_ref(), me.id, update)
    })
    .await?;
    Ok(Json(json!({ "message": "Profile updated successfully", "user": user })))
}

// ---- commodities ----

pub async fn list_commodities(State(state): Shared) -> Result<impl IntoResponse, WebError> {
    let commodities = blocking(&state, |s| s.store.list_commodities()).await?;
    Ok(Json(commodities))
}

pub async fn get_commodity(
    State(state): Shared,
    Path(symbol): Path<String>,
) -> Result<impl IntoResponse, WebError> {
    let commodity = blocking(&state, move |s| {
        s.store
            .find_commodity(&symbol)?
            .ok_or(CommodityxError::CommodityNotFound { symbol })
    })
    .await?;
    Ok(Json(commodity))
}

pub async fn create_commodity(
    auth: AuthSession,
    State(state): Shared,
    ApiJson(commodity): ApiJson<NewCommodity>,
) -> Result<impl IntoResponse, WebError> {
    current_admin(&auth)?;
    commodity.validate()?;
    let created = blocking(&state, move |s| {
        s.store.create_commodity(&commodity, Utc::now())
    })
    .await?;
    tracing::info!(symbol = %created.symbol, "commodity created");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_price(
    auth: AuthSession,
    State(state): Shared,
    Path(symbol): Path<String>,
    ApiJson(quote): ApiJson<QuoteUpdate>,
) -> Result<impl IntoResponse, WebError> {
    current_admin(&auth)?;
    quote.validate()?;
    let updated =
        blocking(&state, move |s| s.store.update_quote(&symbol, &quote, Utc::now())).await?;
    Ok(Json(updated))
}

pub async fn delete_commodity(
    auth: AuthSession,
    State(state): Shared,
    Path(symbol): Path<String>,
) -> Result<impl IntoResponse, WebError> {
    current_admin(&auth)?;
    blocking(&state, move |s| {
        if s.store.delete_commodity(&symbol)? {
            tracing::warn!(%symbol, "commodity deleted");
            Ok(())
        } else {
            Err(CommodityxError::CommodityNotFound { symbol })
        }
    })
    .await?;
    Ok(Json(json!({ "message": "Commodity deleted successfully" })))
}

// ---- trading ----

#[derive(Debug, Deserialize)]
pub struct TradeBody {
    #[serde(alias = "symbol")]
    pub commodity_symbol: String,
    pub quantity: f64,
    pub price: Option<f64>,
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, WebError> {
    match headers.get(IDEMPOTENCY_KEY) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim().to_string()))
            .map_err(|_| {
                WebError::from(CommodityxError::validation(
                    "idempotency_key",
                    "must be visible ASCII",
                ))
            }),
    }
}

async fn trade(
    side: OrderSide,
    auth: AuthSession,
    state: Arc<AppState>,
    headers: HeaderMap,
    body: TradeBody,
) -> Result<impl IntoResponse, WebError> {
    let me = current_user(&auth)?;
    let request = TradeRequest {
        user_id: me.id,
        symbol: body.commodity_symbol,
        quantity: body.quantity,
        price: body.price,
        client_order_id: idempotency_key(&headers)?,
    };

    let receipt = blocking(&state, move |s| match side {
        OrderSide::Buy => s.engine.execute_buy(&request),
        OrderSide::Sell => s.engine.execute_sell(&request),
    })
    .await?;

    let message = match side {
        OrderSide::Buy => "Buy order executed successfully",
        OrderSide::Sell => "Sell order executed successfully",
    };
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": message,
            "order_id": receipt.order_id,
            "new_balance": receipt.new_balance,
            "price": receipt.price,
            "total_amount": receipt.total_amount,
            "replayed": receipt.replayed,
        })),
    ))
}

pub async fn buy(
    auth: AuthSession,
    State(state): Shared,
    headers: HeaderMap,
    ApiJson(body): ApiJson<TradeBody>,
) -> Result<impl IntoResponse, WebError> {
    trade(OrderSide::Buy, auth, state, headers, body).await
}

pub async fn sell(
    auth: AuthSession,
    State(state): Shared,
    headers: HeaderMap,
    ApiJson(body): ApiJson<TradeBody>,
) -> Result<impl IntoResponse, WebError> {
    trade(OrderSide::Sell, auth, state, headers, body).await
}

pub async fn portfolio(
    auth: AuthSession,
    State(state): Shared,
) -> Result<impl IntoResponse, WebError> {
    let me = current_user(&auth)?;
    let summary =
        blocking(&state, move |s| portfolio::get_portfolio(s.store.as_ref(), me.id)).await?;
    Ok(Json(summary))
}

pub async fn holding(
    auth: AuthSession,
    State(state): Shared,
    Path(symbol): Path<String>,
) -> Result<impl IntoResponse, WebError> {
    let me = current_user(&auth)?;
    let holding = blocking(&state, move |s| {
        portfolio::get_holding(s.store.as_ref(), me.id, &symbol)
    })
    .await?;
    Ok(Json(holding))
}

pub async fn orders(
    auth: AuthSession,
    State(state): Shared,
) -> Result<impl IntoResponse, WebError> {
    let me = current_user(&auth)?;
    let orders = blocking(&state, move |s| s.store.list_orders(me.id)).await?;
    Ok(Json(orders))
}

pub async fn cancel_order(
    auth: AuthSession,
    State(state): Shared,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, WebError> {
    let me = current_user(&auth)?;
    let order = blocking(&state, move |s| s.engine.cancel_order(me.id, id)).await?;
    Ok(Json(json!({ "message": "Order cancelled successfully", "order": order })))
}

// ---- watchlist ----

#[derive(Debug, Deserialize)]
pub struct WatchBody {
    #[serde(alias = "symbol")]
    pub commodity_symbol: String,
}

pub async fn list_watchlist(
    auth: AuthSession,
    State(state): Shared,
) -> Result<impl IntoResponse, WebError> {
    let me = current_user(&auth)?;
    let items = blocking(&state, move |s| s.store.list_watchlist(me.id)).await?;
    Ok(Json(items))
}

pub async fn add_to_watchlist(
    auth: AuthSession,
    State(state): Shared,
    ApiJson(body): ApiJson<WatchBody>,
) -> Result<impl IntoResponse, WebError> {
    let me = current_user(&auth)?;
    let id = blocking(&state, move |s| {
        watchlist::add(s.store.as_ref(), me.id, &body.commodity_symbol)
    })
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Added to watchlist", "id": id })),
    ))
}

pub async fn remove_from_watchlist(
    auth: AuthSession,
    State(state): Shared,
    Path(symbol): Path<String>,
) -> Result<impl IntoResponse, WebError> {
    let me = current_user(&auth)?;
    blocking(&state, move |s| {
        watchlist::remove(s.store.as_ref(), me.id, &symbol)
    })
    .await?;
    Ok(Json(json!({ "message": "Removed from watchlist" })))
}

// ---- alerts ----

#[derive(Debug, Deserialize)]
pub struct AlertBody {
    #[serde(alias = "symbol")]
    pub commodity_symbol: String,
    pub alert_type: String,
    pub target_price: f64,
}

pub async fn list_alerts(
    auth: AuthSession,
    State(state): Shared,
) -> Result<impl IntoResponse, WebError> {
    let me = current_user(&auth)?;
    let alerts = blocking(&state, move |s| s.store.list_active_alerts(me.id)).await?;
    Ok(Json(alerts))
}

pub async fn create_alert(
    auth: AuthSession,
    State(state): Shared,
    ApiJson(body): ApiJson<AlertBody>,
) -> Result<impl IntoResponse, WebError> {
    let me = current_user(&auth)?;
    let new_alert = NewAlert::parse(&body.commodity_symbol, &body.alert_type, body.target_price)?;
    let id = blocking(&state, move |s| {
        alert::create_alert(s.store.as_ref(), me.id, &new_alert)
    })
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Alert created successfully", "id": id })),
    ))
}

pub async fn delete_alert(
    auth: AuthSession,
    State(state): Shared,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, WebError> {
    let me = current_user(&auth)?;
    blocking(&state, move |s| alert::delete_alert(s.store.as_ref(), me.id, id)).await?;
    Ok(Json(json!({ "message": "Alert deleted successfully" })))
}

pub async fn check_alerts(
    auth: AuthSession,
    State(state): Shared,
) -> Result<impl IntoResponse, WebError> {
    current_user(&auth)?;
    let triggered =
        blocking(&state, |s| alert::check_alerts(s.store.as_ref(), Utc::now())).await?;
    Ok(Json(json!({
        "message": "Alerts checked",
        "triggered_count": triggered.len(),
        "triggered_alerts": triggered,
    })))
}

// ---- transactions ----

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AmountBody {
    pub amount: f64,
}

pub async fn transactions(
    auth: AuthSession,
    State(state): Shared,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, WebError> {
    let me = current_user(&auth)?;
    let entries = blocking(&state, move |s| {
        ledger::history(s.store.as_ref(), me.id, query.limit, s.settings.history_limit)
    })
    .await?;
    Ok(Json(entries))
}

pub async fn deposit(
    auth: AuthSession,
    State(state): Shared,
    ApiJson(body): ApiJson<AmountBody>,
) -> Result<impl IntoResponse, WebError> {
    let me = current_user(&auth)?;
    let new_balance =
        blocking(&state, move |s| ledger::deposit(s.store.as_ref(), me.id, body.amount)).await?;
    Ok(Json(json!({ "message": "Deposit successful", "new_balance": new_balance })))
}

pub async fn withdraw(
    auth: AuthSession,
    State(state): Shared,
    ApiJson(body): ApiJson<AmountBody>,
) -> Result<impl IntoResponse, WebError> {
    let me = current_user(&auth)?;
    let new_balance =
        blocking(&state, move |s| ledger::withdraw(s.store.as_ref(), me.id, body.amount)).await?;
    Ok(Json(json!({ "message": "Withdrawal successful", "new_balance": new_balance })))
}

// ---- admin ----

pub async fn admin_users(
    auth: AuthSession,
    State(state): Shared,
) -> Result<impl IntoResponse, WebError> {
    current_admin(&auth)?;
    let users = blocking(&state, |s| s.store.list_users()).await?;
    Ok(Json(users))
}

pub async fn admin_user_details(
    auth: AuthSession,
    State(state): Shared,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, WebError> {
    current_admin(&auth)?;
    let details = blocking(&state, move |s| admin::user_details(s.store.as_ref(), id)).await?;
    Ok(Json(details))
}

pub async fn admin_delete_user(
    auth: AuthSession,
    State(state): Shared,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, WebError> {
    let me = current_admin(&auth)?;
    blocking(&state, move |s| admin::delete_user(s.store.as_ref(), me.id, id)).await?;
    Ok(Json(json!({ "message": "User deleted successfully" })))
}

pub async fn admin_orders(
    auth: AuthSession,
    State(state): Shared,
) -> Result<impl IntoResponse, WebError> {
    current_admin(&auth)?;
    let orders = blocking(&state, |s| s.store.list_all_orders()).await?;
    Ok(Json(orders))
}

pub async fn admin_transactions(
    auth: AuthSession,
    State(state): Shared,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, WebError> {
    current_admin(&auth)?;
    let limit = clamp_limit(query.limit, DEFAULT_ADMIN_TRANSACTION_LIMIT);
    let entries = blocking(&state, move |s| s.store.list_all_transactions(limit)).await?;
    Ok(Json(entries))
}

pub async fn admin_stats(
    auth: AuthSession,
    State(state): Shared,
) -> Result<impl IntoResponse, WebError> {
    current_admin(&auth)?;
    let stats = blocking(&state, |s| admin::platform_stats(s.store.as_ref())).await?;
    Ok(Json(stats))
}
