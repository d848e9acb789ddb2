#![allow(dead_code)]

use chrono::Utc;
use commodityx::adapters::sqlite_adapter::SqliteStore;
use commodityx::domain::account;
use commodityx::domain::commodity::{NewCommodity, QuoteUpdate};
use commodityx::domain::user::{Registration, User};
use commodityx::ports::store_port::Store;
use std::io::Write;
use std::sync::Arc;

pub const TEST_PASSWORD: &str = "secret123";

/// In-memory store with the schema and reference commodities loaded.
pub fn seeded_store() -> Arc<SqliteStore> {
    let store = SqliteStore::in_memory().unwrap();
    store.initialize_schema().unwrap();
    store.seed_commodities().unwrap();
    Arc::new(store)
}

/// On-disk store for tests that need several pooled connections.
pub fn file_store(dir: &tempfile::TempDir, pool_size: u32) -> Arc<SqliteStore> {
    let path = dir.path().join("commodityx.db");
    let store =
        SqliteStore::open(&path, pool_size, std::time::Duration::from_secs(10)).unwrap();
    store.initialize_schema().unwrap();
    store.seed_commodities().unwrap();
    Arc::new(store)
}

pub fn registration(username: &str) -> Registration {
    Registration {
        username: username.to_string(),
        email: format!("{username}@example.com"),
        password: TEST_PASSWORD.to_string(),
        full_name: None,
    }
}

pub fn register_user(store: &dyn Store, username: &str, balance: f64) -> User {
    account::register(store, registration(username), balance, false).unwrap()
}

/// A user inserted straight into the store, skipping password hashing.
/// Such accounts cannot log in.
pub fn fixture_user(store: &dyn Store, username: &str, balance: f64) -> User {
    store
        .create_user(
            &registration(username),
            "$argon2id$fixture",
            balance,
            false,
            Utc::now(),
        )
        .unwrap()
}

pub fn register_admin(store: &dyn Store, username: &str) -> User {
    account::register(store, registration(username), 100_000.0, true).unwrap()
}

pub fn set_price(store: &dyn Store, symbol: &str, price: f64) {
    store
        .update_quote(
            symbol,
            &QuoteUpdate {
                current_price: price,
                ..QuoteUpdate::default()
            },
            Utc::now(),
        )
        .unwrap();
}

pub fn listing(symbol: &str, name: &str, price: f64) -> NewCommodity {
    NewCommodity {
        symbol: symbol.to_string(),
        name: name.to_string(),
        quote: QuoteUpdate {
            current_price: price,
            ..QuoteUpdate::default()
        },
        market_cap: None,
    }
}

pub fn write_temp_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
