#![cfg(feature = "web")]
//! HTTP API tests driven through the router with `oneshot`.
//!
//! Tests cover:
//! - Registration, login, logout and session cookies
//! - Trading with idempotency keys
//! - Error bodies and status codes
//! - Watchlist, alerts, cash movements and admin endpoints

mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use common::*;
use commodityx::adapters::web::{AppState, WebSettings, build_router};
use commodityx::ports::store_port::Store;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn create_app() -> (Router, Arc<dyn Store>) {
    let store: Arc<dyn Store> = seeded_store();
    let app = build_router(AppState::new(Arc::clone(&store), WebSettings::default()));
    (app, store)
}

fn request(method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

struct Reply {
    status: StatusCode,
    cookie: Option<String>,
    body: Value,
}

async fn send(app: &Router, req: Request<Body>) -> Reply {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let cookies: Vec<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|sc| sc.split(';').next().unwrap_or("").to_string())
        .collect();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    Reply {
        status,
        cookie: (!cookies.is_empty()).then(|| cookies.join("; ")),
        body,
    }
}

async fn login(app: &Router, username: &str) -> String {
    let reply = send(
        app,
        request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "username": username, "password": TEST_PASSWORD })),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "login failed: {}", reply.body);
    reply.cookie.expect("login should set a session cookie")
}

async fn signup(app: &Router, username: &str) -> String {
    let reply = send(
        app,
        request(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": TEST_PASSWORD,
            })),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED, "register failed: {}", reply.body);
    reply.cookie.expect("registration should set a session cookie")
}

mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn health_is_public() {
        let (app, _) = create_app();
        let reply = send(&app, request("GET", "/api/health", None, None)).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["status"], "ok");
    }

    #[tokio::test]
    async fn register_logs_the_user_in() {
        let (app, _) = create_app();
        let cookie = signup(&app, "newbie").await;

        let reply = send(&app, request("GET", "/api/auth/profile", Some(&cookie), None)).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["username"], "newbie");
        assert_eq!(reply.body["balance"], 100_000.0);
        assert!(reply.body.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn duplicate_usernames_are_rejected() {
        let (app, _) = create_app();
        signup(&app, "taken").await;
        let reply = send(
            &app,
            request(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({
                    "username": "taken",
                    "email": "other@example.com",
                    "password": TEST_PASSWORD,
                })),
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert!(reply.body["error"].as_str().unwrap().contains("username already exists"));
    }

    #[tokio::test]
    async fn short_passwords_are_rejected() {
        let (app, _) = create_app();
        let reply = send(
            &app,
            request(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({ "username": "shorty", "email": "s@example.com", "password": "123" })),
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let (app, store) = create_app();
        register_user(store.as_ref(), "carol", 0.0);
        let reply = send(
            &app,
            request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "username": "carol", "password": "not-it" })),
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert!(reply.body["error"].is_string());
    }

    #[tokio::test]
    async fn protected_routes_need_a_session() {
        let (app, _) = create_app();
        for uri in ["/api/trading/portfolio", "/api/watchlist", "/api/transactions"] {
            let reply = send(&app, request("GET", uri, None, None)).await;
            assert_eq!(reply.status, StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn logout_ends_the_session() {
        let (app, store) = create_app();
        register_user(store.as_ref(), "dave", 0.0);
        let cookie = login(&app, "dave").await;

        let reply = send(&app, request("POST", "/api/auth/logout", Some(&cookie), None)).await;
        assert_eq!(reply.status, StatusCode::OK);

        let reply = send(&app, request("GET", "/api/auth/profile", Some(&cookie), None)).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn profile_update_changes_full_name() {
        let (app, store) = create_app();
        register_user(store.as_ref(), "erin", 0.0);
        let cookie = login(&app, "erin").await;

        let reply = send(
            &app,
            request(
                "PUT",
                "/api/auth/profile",
                Some(&cookie),
                Some(json!({ "full_name": "Erin Example" })),
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["user"]["full_name"], "Erin Example");
    }
}

mod trading_tests {
    use super::*;

    fn trade(uri: &str, cookie: &str, body: Value, key: Option<&str>) -> Request<Body> {
        let mut req = request("POST", uri, Some(cookie), Some(body));
        if let Some(key) = key {
            req.headers_mut().insert("idempotency-key", key.parse().unwrap());
        }
        req
    }

    #[tokio::test]
    async fn buy_then_sell_updates_portfolio() {
        let (app, store) = create_app();
        register_user(store.as_ref(), "trader", 100_000.0);
        let cookie = login(&app, "trader").await;

        let reply = send(
            &app,
            trade(
                "/api/trading/buy",
                &cookie,
                json!({ "commodity_symbol": "GC=F", "quantity": 10, "price": 2050.5 }),
                None,
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        assert_eq!(reply.body["new_balance"], 79_495.0);
        assert_eq!(reply.body["replayed"], false);

        let reply = send(
            &app,
            trade(
                "/api/trading/sell",
                &cookie,
                json!({ "symbol": "GC=F", "quantity": 4, "price": 2100 }),
                None,
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::CREATED);

        let reply = send(&app, request("GET", "/api/trading/portfolio", Some(&cookie), None)).await;
        assert_eq!(reply.status, StatusCode::OK);
        let holdings = reply.body["portfolio"].as_array().unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0]["commodity_symbol"], "GC=F");
        assert_eq!(holdings[0]["quantity"], 6.0);
        // bought and valued at the same quote
        assert!(reply.body["total_profit_loss"].as_f64().unwrap().abs() < 1e-6);

        let reply = send(
            &app,
            request("GET", "/api/trading/portfolio/GC=F", Some(&cookie), None),
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["name"], "Gold");

        let reply = send(&app, request("GET", "/api/trading/orders", Some(&cookie), None)).await;
        assert_eq!(reply.body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn idempotency_key_prevents_double_charges() {
        let (app, store) = create_app();
        register_user(store.as_ref(), "retry", 100_000.0);
        let cookie = login(&app, "retry").await;
        let body = json!({ "commodity_symbol": "SI=F", "quantity": 100, "price": 25 });

        let first = send(
            &app,
            trade("/api/trading/buy", &cookie, body.clone(), Some("abc-1")),
        )
        .await;
        let second = send(&app, trade("/api/trading/buy", &cookie, body, Some("abc-1"))).await;

        assert_eq!(first.status, StatusCode::CREATED);
        assert_eq!(second.status, StatusCode::CREATED);
        assert_eq!(first.body["order_id"], second.body["order_id"]);
        assert_eq!(second.body["replayed"], true);
        assert_eq!(second.body["new_balance"], 97_500.0);

        let reply = send(
            &app,
            trade(
                "/api/trading/sell",
                &cookie,
                json!({ "commodity_symbol": "SI=F", "quantity": 1, "price": 25 }),
                Some("abc-1"),
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn business_rule_failures_are_bad_requests() {
        let (app, store) = create_app();
        register_user(store.as_ref(), "poor", 100.0);
        let cookie = login(&app, "poor").await;

        let reply = send(
            &app,
            trade(
                "/api/trading/buy",
                &cookie,
                json!({ "commodity_symbol": "GC=F", "quantity": 10, "price": 2050.5 }),
                None,
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert!(reply.body["error"].as_str().unwrap().contains("insufficient balance"));

        let reply = send(
            &app,
            trade(
                "/api/trading/sell",
                &cookie,
                json!({ "commodity_symbol": "GC=F", "quantity": 1 }),
                None,
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);

        let reply = send(
            &app,
            trade(
                "/api/trading/buy",
                &cookie,
                json!({ "commodity_symbol": "GC=F", "quantity": -1, "price": 10 }),
                None,
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert!(reply.body["error"].as_str().unwrap().contains("invalid quantity or price"));

        let reply = send(
            &app,
            trade(
                "/api/trading/buy",
                &cookie,
                json!({ "commodity_symbol": "NOPE", "quantity": 1, "price": 10 }),
                None,
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn incomplete_trade_bodies_are_json_bad_requests() {
        let (app, store) = create_app();
        let user = register_user(store.as_ref(), "sloppy", 100_000.0);
        let cookie = login(&app, "sloppy").await;

        let reply = send(
            &app,
            trade(
                "/api/trading/buy",
                &cookie,
                json!({ "commodity_symbol": "GC=F", "price": 10.0 }),
                None,
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert!(reply.body["error"].as_str().unwrap().contains("quantity"));

        let garbled = Request::builder()
            .method("POST")
            .uri("/api/trading/sell")
            .header(header::COOKIE, &cookie)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"commodity_symbol\": "))
            .unwrap();
        let reply = send(&app, garbled).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert!(reply.body["error"].is_string());
        assert!(store.list_orders(user.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn completed_orders_cannot_be_cancelled() {
        let (app, store) = create_app();
        register_user(store.as_ref(), "canceller", 100_000.0);
        let cookie = login(&app, "canceller").await;
        let reply = send(
            &app,
            trade(
                "/api/trading/buy",
                &cookie,
                json!({ "commodity_symbol": "SI=F", "quantity": 1, "price": 25 }),
                None,
            ),
        )
        .await;
        let id = reply.body["order_id"].as_i64().unwrap();

        let reply = send(
            &app,
            request("POST", &format!("/api/trading/orders/{id}/cancel"), Some(&cookie), None),
        )
        .await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
    }
}

mod feature_tests {
    use super::*;

    #[tokio::test]
    async fn commodities_are_public() {
        let (app, _) = create_app();
        let reply = send(&app, request("GET", "/api/commodities", None, None)).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body.as_array().unwrap().len(), 10);

        let reply = send(&app, request("GET", "/api/commodities/GC=F", None, None)).await;
        assert_eq!(reply.body["name"], "Gold");

        let reply = send(&app, request("GET", "/api/commodities/NOPE", None, None)).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert!(reply.body["error"].is_string());
    }

    #[tokio::test]
    async fn watchlist_round_trip() {
        let (app, store) = create_app();
        register_user(store.as_ref(), "watcher", 0.0);
        let cookie = login(&app, "watcher").await;
        let add = || {
            request(
                "POST",
                "/api/watchlist",
                Some(&cookie),
                Some(json!({ "commodity_symbol": "CL=F" })),
            )
        };

        assert_eq!(send(&app, add()).await.status, StatusCode::CREATED);
        assert_eq!(send(&app, add()).await.status, StatusCode::BAD_REQUEST);

        let reply = send(&app, request("GET", "/api/watchlist", Some(&cookie), None)).await;
        assert_eq!(reply.body[0]["name"], "Crude Oil");

        let remove = || request("DELETE", "/api/watchlist/CL=F", Some(&cookie), None);
        assert_eq!(send(&app, remove()).await.status, StatusCode::OK);
        assert_eq!(send(&app, remove()).await.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn alerts_fire_once_through_the_api() {
        let (app, store) = create_app();
        register_user(store.as_ref(), "alerter", 0.0);
        let cookie = login(&app, "alerter").await;

        let reply = send(
            &app,
            request(
                "POST",
                "/api/alerts",
                Some(&cookie),
                Some(json!({
                    "commodity_symbol": "GC=F",
                    "alert_type": "BELOW",
                    "target_price": 3000,
                })),
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::CREATED);

        let reply = send(
            &app,
            request(
                "POST",
                "/api/alerts",
                Some(&cookie),
                Some(json!({
                    "commodity_symbol": "GC=F",
                    "alert_type": "SIDEWAYS",
                    "target_price": 1,
                })),
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);

        let check = || request("POST", "/api/alerts/check", Some(&cookie), None);
        let reply = send(&app, check()).await;
        assert_eq!(reply.body["triggered_count"], 1);
        let reply = send(&app, check()).await;
        assert_eq!(reply.body["triggered_count"], 0);

        let reply = send(&app, request("GET", "/api/alerts", Some(&cookie), None)).await;
        assert!(reply.body.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deposits_withdrawals_and_history() {
        let (app, store) = create_app();
        register_user(store.as_ref(), "saver", 100.0);
        let cookie = login(&app, "saver").await;

        let reply = send(
            &app,
            request(
                "POST",
                "/api/transactions/deposit",
                Some(&cookie),
                Some(json!({ "amount": 50 })),
            ),
        )
        .await;
        assert_eq!(reply.body["new_balance"], 150.0);

        let reply = send(
            &app,
            request(
                "POST",
                "/api/transactions/withdraw",
                Some(&cookie),
                Some(json!({ "amount": 500 })),
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);

        let reply = send(
            &app,
            request(
                "POST",
                "/api/transactions/deposit",
                Some(&cookie),
                Some(json!({ "amount": 0 })),
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);

        let reply = send(
            &app,
            request("GET", "/api/transactions?limit=10", Some(&cookie), None),
        )
        .await;
        let entries = reply.body.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["transaction_type"], "DEPOSIT");
    }

    #[tokio::test]
    async fn unknown_routes_are_json_404s() {
        let (app, _) = create_app();
        let reply = send(&app, request("GET", "/nowhere", None, None)).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.body["error"], "not found");
    }
}

mod admin_tests {
    use super::*;

    #[tokio::test]
    async fn regular_users_are_forbidden() {
        let (app, store) = create_app();
        register_user(store.as_ref(), "pleb", 0.0);
        let cookie = login(&app, "pleb").await;

        let reply = send(&app, request("GET", "/api/admin/stats", Some(&cookie), None)).await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN);

        let reply = send(
            &app,
            request(
                "POST",
                "/api/commodities",
                Some(&cookie),
                Some(json!({ "symbol": "LB=F", "name": "Lumber", "current_price": 550.0 })),
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admins_manage_commodities_and_users() {
        let (app, store) = create_app();
        register_admin(store.as_ref(), "root");
        let target = register_user(store.as_ref(), "target", 0.0);
        let cookie = login(&app, "root").await;

        let listing = json!({ "symbol": "LB=F", "name": "Lumber", "current_price": 550.0 });
        let create = |body: Value| request("POST", "/api/commodities", Some(&cookie), Some(body));
        let reply = send(&app, create(listing.clone())).await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        let reply = send(&app, create(listing)).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);

        let reply = send(
            &app,
            request(
                "PUT",
                "/api/commodities/LB=F/price",
                Some(&cookie),
                Some(json!({ "current_price": 560.0 })),
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["current_price"], 560.0);

        let reply = send(&app, request("GET", "/api/admin/stats", Some(&cookie), None)).await;
        assert_eq!(reply.body["total_users"], 2);
        assert_eq!(reply.body["total_commodities"], 11);

        let reply = send(&app, request("GET", "/api/admin/users", Some(&cookie), None)).await;
        assert_eq!(reply.body.as_array().unwrap().len(), 2);

        let me = store.find_user_record("root").unwrap().unwrap().user.id;
        let uri = format!("/api/admin/users/{me}");
        let reply = send(&app, request("DELETE", &uri, Some(&cookie), None)).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);

        let uri = format!("/api/admin/users/{}", target.id);
        let reply = send(&app, request("DELETE", &uri, Some(&cookie), None)).await;
        assert_eq!(reply.status, StatusCode::OK);
        let reply = send(&app, request("GET", &uri, Some(&cookie), None)).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);

        let reply = send(
            &app,
            request("DELETE", "/api/commodities/LB=F", Some(&cookie), None),
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK);
    }
}
