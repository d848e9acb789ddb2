//! SQLite persistence adapter.
//!
//! Implements every repository port plus the unit of work. A unit of work
//! owns one pooled connection and holds SQLite's write lock from
//! `BEGIN IMMEDIATE` until commit or drop, which serializes concurrent
//! balance and position updates.

use crate::domain::admin::OrderStats;
use crate::domain::alert::{AlertType, AlertView, NewAlert, PriceAlert};
use crate::domain::commodity::{Commodity, NewCommodity, QuoteUpdate, default_commodities};
use crate::domain::error::CommodityxError;
use crate::domain::ledger::{LedgerEntry, NewLedgerEntry, TransactionType, apply_delta};
use crate::domain::order::{NewOrder, Order, OrderSide, OrderStatus};
use crate::domain::position::{Holding, Position};
use crate::domain::user::{Registration, User, UserRecord};
use crate::domain::watchlist::WatchlistItem;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::{
    AlertRepo, CommodityRepo, LedgerTx, OrderRepo, PositionRepo, TransactionRepo, UnitOfWork,
    UserRepo, WatchlistRepo,
};
use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_POOL_SIZE: u32 = 4;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    full_name TEXT,
    balance REAL NOT NULL DEFAULT 100000.00 CHECK (balance >= 0),
    is_admin INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS commodities (
    symbol TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    current_price REAL NOT NULL,
    previous_close REAL,
    open_price REAL,
    high_price REAL,
    low_price REAL,
    volume INTEGER,
    market_cap REAL,
    change_percent REAL,
    last_updated TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS portfolio (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    commodity_symbol TEXT NOT NULL,
    quantity REAL NOT NULL,
    average_price REAL NOT NULL,
    total_invested REAL NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (user_id, commodity_symbol),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);
CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    commodity_symbol TEXT NOT NULL,
    order_type TEXT NOT NULL CHECK (order_type IN ('BUY', 'SELL')),
    quantity REAL NOT NULL,
    price REAL NOT NULL,
    total_amount REAL NOT NULL,
    status TEXT NOT NULL DEFAULT 'PENDING'
        CHECK (status IN ('PENDING', 'COMPLETED', 'CANCELLED')),
    client_order_id TEXT,
    created_at TEXT NOT NULL,
    UNIQUE (user_id, client_order_id),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);
CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    transaction_type TEXT NOT NULL
        CHECK (transaction_type IN ('DEPOSIT', 'WITHDRAWAL', 'TRADE_BUY', 'TRADE_SELL')),
    amount REAL NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);
CREATE TABLE IF NOT EXISTS watchlist (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    commodity_symbol TEXT NOT NULL,
    added_at TEXT NOT NULL,
    UNIQUE (user_id, commodity_symbol),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);
CREATE TABLE IF NOT EXISTS price_alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    commodity_symbol TEXT NOT NULL,
    alert_type TEXT NOT NULL CHECK (alert_type IN ('ABOVE', 'BELOW')),
    target_price REAL NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    triggered_at TEXT,
    created_at TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_alerts_active ON price_alerts(is_active);
";

const USER_COLUMNS: &str =
    "id, username, email, full_name, balance, is_admin, created_at, password";
const COMMODITY_COLUMNS: &str = "symbol, name, current_price, previous_close, open_price, \
     high_price, low_price, volume, market_cap, change_percent, last_updated";
const POSITION_COLUMNS: &str = "p.user_id, p.commodity_symbol, p.quantity, p.average_price, \
     p.total_invested, p.created_at, p.updated_at";
const ORDER_COLUMNS: &str = "id, user_id, commodity_symbol, order_type, quantity, price, \
     total_amount, status, client_order_id, created_at";
const TRANSACTION_COLUMNS: &str =
    "id, user_id, transaction_type, amount, description, created_at";
const ALERT_VIEW_SELECT: &str = "SELECT a.id, a.user_id, a.commodity_symbol, a.alert_type, \
     a.target_price, a.is_active, a.triggered_at, a.created_at, c.name, c.current_price \
     FROM price_alerts a";

type PooledSqlite = PooledConnection<SqliteConnectionManager>;

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Open the database named by `[database] path`.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, CommodityxError> {
        let path = config.require_string("database", "path")?;
        let pool_size = config.get_int("database", "pool_size", DEFAULT_POOL_SIZE as i64);
        let busy_timeout_ms = config.get_int(
            "database",
            "busy_timeout_ms",
            DEFAULT_BUSY_TIMEOUT_MS as i64,
        );

        let pool_size = u32::try_from(pool_size)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| CommodityxError::ConfigInvalid {
                section: "database".into(),
                key: "pool_size".into(),
                reason: format!("must be a positive integer, got {pool_size}"),
            })?;
        let busy_timeout_ms =
            u64::try_from(busy_timeout_ms).map_err(|_| CommodityxError::ConfigInvalid {
                section: "database".into(),
                key: "busy_timeout_ms".into(),
                reason: format!("must not be negative, got {busy_timeout_ms}"),
            })?;

        Self::open(&path, pool_size, Duration::from_millis(busy_timeout_ms))
    }

    pub fn open<P: AsRef<Path>>(
        path: P,
        pool_size: u32,
        busy_timeout: Duration,
    ) -> Result<Self, CommodityxError> {
        let manager = SqliteConnectionManager::file(path).with_init(move |c: &mut Connection| {
            c.busy_timeout(busy_timeout)?;
            c.execute_batch("PRAGMA foreign_keys = ON;")
        });
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| CommodityxError::db(e))?;

        Ok(Self { pool })
    }

    /// A private in-memory database. The pool holds a single connection, so
    /// callers must not keep a unit of work open while using the store.
    pub fn in_memory() -> Result<Self, CommodityxError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|c: &mut Connection| c.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)
            .map_err(|e: r2d2::Error| CommodityxError::db(e))?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledSqlite, CommodityxError> {
        self.pool.get().map_err(|e: r2d2::Error| CommodityxError::db(e))
    }

    pub fn initialize_schema(&self) -> Result<(), CommodityxError> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA).map_err(CommodityxError::query)?;
        Ok(())
    }

    /// Insert the reference commodities that are not already listed.
    /// Returns how many rows were added.
    pub fn seed_commodities(&self) -> Result<usize, CommodityxError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(CommodityxError::query)?;
        let now = ts(&Utc::now());
        let mut inserted = 0;

        for c in default_commodities() {
            inserted += tx
                .execute(
                    &format!(
                        "INSERT OR IGNORE INTO commodities ({COMMODITY_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                    ),
                    params![
                        c.symbol,
                        c.name,
                        c.quote.current_price,
                        c.quote.previous_close,
                        c.quote.open_price,
                        c.quote.high_price,
                        c.quote.low_price,
                        c.quote.volume,
                        c.market_cap,
                        c.quote.change_percent,
                        now
                    ],
                )
                .map_err(CommodityxError::query)?;
        }

        tx.commit().map_err(CommodityxError::query)?;
        Ok(inserted)
    }
}

fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => get_ts(row, idx).map(Some),
        None => Ok(None),
    }
}

fn get_parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = CommodityxError>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_error(idx, e))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        full_name: row.get(3)?,
        balance: row.get(4)?,
        is_admin: row.get(5)?,
        created_at: get_ts(row, 6)?,
    })
}

fn map_user_record(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        user: map_user(row)?,
        password_hash: row.get(7)?,
    })
}

fn map_commodity(row: &Row<'_>) -> rusqlite::Result<Commodity> {
    Ok(Commodity {
        symbol: row.get(0)?,
        name: row.get(1)?,
        current_price: row.get(2)?,
        previous_close: row.get(3)?,
        open_price: row.get(4)?,
        high_price: row.get(5)?,
        low_price: row.get(6)?,
        volume: row.get(7)?,
        market_cap: row.get(8)?,
        change_percent: row.get(9)?,
        last_updated: get_ts(row, 10)?,
    })
}

fn map_position(row: &Row<'_>) -> rusqlite::Result<Position> {
    Ok(Position {
        user_id: row.get(0)?,
        commodity_symbol: row.get(1)?,
        quantity: row.get(2)?,
        average_price: row.get(3)?,
        total_invested: row.get(4)?,
        created_at: get_ts(row, 5)?,
        updated_at: get_ts(row, 6)?,
    })
}

fn map_order(row: &Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        user_id: row.get(1)?,
        commodity_symbol: row.get(2)?,
        order_type: get_parsed::<OrderSide>(row, 3)?,
        quantity: row.get(4)?,
        price: row.get(5)?,
        total_amount: row.get(6)?,
        status: get_parsed::<OrderStatus>(row, 7)?,
        client_order_id: row.get(8)?,
        created_at: get_ts(row, 9)?,
    })
}

fn map_transaction(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        transaction_type: get_parsed::<TransactionType>(row, 2)?,
        amount: row.get(3)?,
        description: row.get(4)?,
        created_at: get_ts(row, 5)?,
    })
}

fn map_alert_view(row: &Row<'_>) -> rusqlite::Result<AlertView> {
    Ok(AlertView {
        alert: PriceAlert {
            id: row.get(0)?,
            user_id: row.get(1)?,
            commodity_symbol: row.get(2)?,
            alert_type: get_parsed::<AlertType>(row, 3)?,
            target_price: row.get(4)?,
            is_active: row.get(5)?,
            triggered_at: get_opt_ts(row, 6)?,
            created_at: get_ts(row, 7)?,
        },
        name: row.get(8)?,
        current_price: row.get(9)?,
    })
}

fn query_list<T, P, F>(
    conn: &Connection,
    sql: &str,
    params: P,
    f: F,
) -> Result<Vec<T>, CommodityxError>
where
    P: rusqlite::Params,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql).map_err(CommodityxError::query)?;
    let rows = stmt.query_map(params, f).map_err(CommodityxError::query)?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(CommodityxError::query)
}

fn query_commodity(conn: &Connection, symbol: &str) -> Result<Option<Commodity>, CommodityxError> {
    conn.query_row(
        &format!("SELECT {COMMODITY_COLUMNS} FROM commodities WHERE symbol = ?1"),
        params![symbol],
        map_commodity,
    )
    .optional()
    .map_err(CommodityxError::query)
}

fn query_position(
    conn: &Connection,
    user_id: i64,
    symbol: &str,
) -> Result<Option<Position>, CommodityxError> {
    conn.query_row(
        &format!(
            "SELECT {POSITION_COLUMNS} FROM portfolio p
             WHERE p.user_id = ?1 AND p.commodity_symbol = ?2"
        ),
        params![user_id, symbol],
        map_position,
    )
    .optional()
    .map_err(CommodityxError::query)
}

fn query_user(conn: &Connection, id: i64) -> Result<Option<User>, CommodityxError> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        map_user,
    )
    .optional()
    .map_err(CommodityxError::query)
}

impl UserRepo for SqliteStore {
    fn create_user(
        &self,
        registration: &Registration,
        password_hash: &str,
        initial_balance: f64,
        is_admin: bool,
        now: DateTime<Utc>,
    ) -> Result<User, CommodityxError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(CommodityxError::query)?;

        tx.execute(
            "INSERT INTO users (username, email, password, full_name, balance, is_admin, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                registration.username,
                registration.email,
                password_hash,
                registration.full_name,
                initial_balance,
                is_admin,
                ts(&now)
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                CommodityxError::Conflict {
                    reason: "username or email already exists".into(),
                }
            } else {
                CommodityxError::query(e)
            }
        })?;
        let id = tx.last_insert_rowid();

        if initial_balance > 0.0 {
            tx.execute(
                "INSERT INTO transactions (user_id, transaction_type, amount, description, created_at)
                 VALUES (?1, 'DEPOSIT', ?2, 'Initial account balance', ?3)",
                params![id, initial_balance, ts(&now)],
            )
            .map_err(CommodityxError::query)?;
        }

        tx.commit().map_err(CommodityxError::query)?;

        Ok(User {
            id,
            username: registration.username.clone(),
            email: registration.email.clone(),
            full_name: registration.full_name.clone(),
            balance: initial_balance,
            is_admin,
            created_at: now,
        })
    }

    fn find_user(&self, id: i64) -> Result<Option<User>, CommodityxError> {
        query_user(&*self.conn()?, id)
    }

    fn find_user_record(&self, username: &str) -> Result<Option<UserRecord>, CommodityxError> {
        self.conn()?
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                map_user_record,
            )
            .optional()
            .map_err(CommodityxError::query)
    }

    fn find_user_record_by_id(&self, id: i64) -> Result<Option<UserRecord>, CommodityxError> {
        self.conn()?
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                map_user_record,
            )
            .optional()
            .map_err(CommodityxError::query)
    }

    fn username_taken(&self, username: &str) -> Result<bool, CommodityxError> {
        self.conn()?
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
                params![username],
                |row| row.get(0),
            )
            .map_err(CommodityxError::query)
    }

    fn email_taken(&self, email: &str, except: Option<i64>) -> Result<bool, CommodityxError> {
        self.conn()?
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1 AND (?2 IS NULL OR id != ?2))",
                params![email, except],
                |row| row.get(0),
            )
            .map_err(CommodityxError::query)
    }

    fn update_profile(
        &self,
        id: i64,
        full_name: Option<&str>,
        email: Option<&str>,
    ) -> Result<User, CommodityxError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE users SET full_name = COALESCE(?2, full_name), email = COALESCE(?3, email)
                 WHERE id = ?1",
                params![id, full_name, email],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    CommodityxError::Conflict {
                        reason: "email already exists".into(),
                    }
                } else {
                    CommodityxError::query(e)
                }
            })?;
        if changed == 0 {
            return Err(CommodityxError::UserNotFound { id });
        }
        query_user(&conn, id)?.ok_or(CommodityxError::UserNotFound { id })
    }

    fn list_users(&self) -> Result<Vec<User>, CommodityxError> {
        query_list(
            &*self.conn()?,
            &format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC"),
            [],
            map_user,
        )
    }

    fn delete_user(&self, id: i64) -> Result<bool, CommodityxError> {
        let changed = self
            .conn()?
            .execute("DELETE FROM users WHERE id = ?1", params![id])
            .map_err(CommodityxError::query)?;
        Ok(changed > 0)
    }

    fn count_users(&self) -> Result<i64, CommodityxError> {
        self.conn()?
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .map_err(CommodityxError::query)
    }
}

impl CommodityRepo for SqliteStore {
    fn list_commodities(&self) -> Result<Vec<Commodity>, CommodityxError> {
        query_list(
            &*self.conn()?,
            &format!("SELECT {COMMODITY_COLUMNS} FROM commodities ORDER BY symbol"),
            [],
            map_commodity,
        )
    }

    fn find_commodity(&self, symbol: &str) -> Result<Option<Commodity>, CommodityxError> {
        query_commodity(&*self.conn()?, symbol)
    }

    fn create_commodity(
        &self,
        commodity: &NewCommodity,
        now: DateTime<Utc>,
    ) -> Result<Commodity, CommodityxError> {
        let conn = self.conn()?;
        let q = &commodity.quote;
        conn.execute(
            &format!(
                "INSERT INTO commodities ({COMMODITY_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                commodity.symbol,
                commodity.name,
                q.current_price,
                q.previous_close,
                q.open_price,
                q.high_price,
                q.low_price,
                q.volume,
                commodity.market_cap,
                q.effective_change_percent(),
                ts(&now)
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                CommodityxError::Conflict {
                    reason: format!("commodity {} already exists", commodity.symbol),
                }
            } else {
                CommodityxError::query(e)
            }
        })?;

        query_commodity(&conn, &commodity.symbol)?.ok_or_else(|| {
            CommodityxError::CommodityNotFound {
                symbol: commodity.symbol.clone(),
            }
        })
    }

    fn upsert_commodity(
        &self,
        commodity: &NewCommodity,
        now: DateTime<Utc>,
    ) -> Result<(), CommodityxError> {
        let q = &commodity.quote;
        self.conn()?
            .execute(
                &format!(
                    "INSERT INTO commodities ({COMMODITY_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                     ON CONFLICT(symbol) DO UPDATE SET
                        name = excluded.name,
                        current_price = excluded.current_price,
                        previous_close = excluded.previous_close,
                        open_price = excluded.open_price,
                        high_price = excluded.high_price,
                        low_price = excluded.low_price,
                        volume = excluded.volume,
                        market_cap = COALESCE(excluded.market_cap, commodities.market_cap),
                        change_percent = excluded.change_percent,
                        last_updated = excluded.last_updated"
                ),
                params![
                    commodity.symbol,
                    commodity.name,
                    q.current_price,
                    q.previous_close,
                    q.open_price,
                    q.high_price,
                    q.low_price,
                    q.volume,
                    commodity.market_cap,
                    q.effective_change_percent(),
                    ts(&now)
                ],
            )
            .map_err(CommodityxError::query)?;
        Ok(())
    }

    fn update_quote(
        &self,
        symbol: &str,
        quote: &QuoteUpdate,
        now: DateTime<Utc>,
    ) -> Result<Commodity, CommodityxError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE commodities SET
                    current_price = ?2,
                    previous_close = COALESCE(?3, previous_close),
                    open_price = COALESCE(?4, open_price),
                    high_price = COALESCE(?5, high_price),
                    low_price = COALESCE(?6, low_price),
                    volume = COALESCE(?7, volume),
                    change_percent = COALESCE(?8, CASE
                        WHEN COALESCE(?3, previous_close) > 0
                        THEN (?2 - COALESCE(?3, previous_close)) / COALESCE(?3, previous_close) * 100.0
                        ELSE change_percent END),
                    last_updated = ?9
                 WHERE symbol = ?1",
                params![
                    symbol,
                    quote.current_price,
                    quote.previous_close,
                    quote.open_price,
                    quote.high_price,
                    quote.low_price,
                    quote.volume,
                    quote.effective_change_percent(),
                    ts(&now)
                ],
            )
            .map_err(CommodityxError::query)?;

        let not_found = || CommodityxError::CommodityNotFound {
            symbol: symbol.to_string(),
        };
        if changed == 0 {
            return Err(not_found());
        }
        query_commodity(&conn, symbol)?.ok_or_else(not_found)
    }

    fn delete_commodity(&self, symbol: &str) -> Result<bool, CommodityxError> {
        let changed = self
            .conn()?
            .execute("DELETE FROM commodities WHERE symbol = ?1", params![symbol])
            .map_err(CommodityxError::query)?;
        Ok(changed > 0)
    }

    fn count_commodities(&self) -> Result<i64, CommodityxError> {
        self.conn()?
            .query_row("SELECT COUNT(*) FROM commodities", [], |row| row.get(0))
            .map_err(CommodityxError::query)
    }
}

impl PositionRepo for SqliteStore {
    fn find_position(
        &self,
        user_id: i64,
        symbol: &str,
    ) -> Result<Option<Position>, CommodityxError> {
        query_position(&*self.conn()?, user_id, symbol)
    }

    fn list_holdings(&self, user_id: i64) -> Result<Vec<Holding>, CommodityxError> {
        query_list(
            &*self.conn()?,
            &format!(
                "SELECT {POSITION_COLUMNS}, c.name, c.current_price, c.change_percent
                 FROM portfolio p
                 LEFT JOIN commodities c ON c.symbol = p.commodity_symbol
                 WHERE p.user_id = ?1 AND p.quantity > 0
                 ORDER BY p.updated_at DESC, p.id DESC"
            ),
            params![user_id],
            |row| {
                Ok(Holding::new(
                    map_position(row)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                ))
            },
        )
    }
}

impl OrderRepo for SqliteStore {
    fn list_orders(&self, user_id: i64) -> Result<Vec<Order>, CommodityxError> {
        query_list(
            &*self.conn()?,
            &format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC"
            ),
            params![user_id],
            map_order,
        )
    }

    fn list_all_orders(&self) -> Result<Vec<Order>, CommodityxError> {
        query_list(
            &*self.conn()?,
            &format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC"),
            [],
            map_order,
        )
    }

    fn order_stats(&self) -> Result<OrderStats, CommodityxError> {
        self.conn()?
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN order_type = 'BUY' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN order_type = 'SELL' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(total_amount), 0.0)
                 FROM orders",
                [],
                |row| {
                    Ok(OrderStats {
                        total_orders: row.get(0)?,
                        buy_orders: row.get(1)?,
                        sell_orders: row.get(2)?,
                        total_volume: row.get(3)?,
                    })
                },
            )
            .map_err(CommodityxError::query)
    }
}

impl TransactionRepo for SqliteStore {
    fn list_transactions(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, CommodityxError> {
        query_list(
            &*self.conn()?,
            &format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC LIMIT ?2"
            ),
            params![user_id, limit as i64],
            map_transaction,
        )
    }

    fn list_all_transactions(&self, limit: usize) -> Result<Vec<LedgerEntry>, CommodityxError> {
        query_list(
            &*self.conn()?,
            &format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions
                 ORDER BY created_at DESC, id DESC LIMIT ?1"
            ),
            params![limit as i64],
            map_transaction,
        )
    }

    fn count_transactions(&self) -> Result<i64, CommodityxError> {
        self.conn()?
            .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))
            .map_err(CommodityxError::query)
    }
}

impl WatchlistRepo for SqliteStore {
    fn list_watchlist(&self, user_id: i64) -> Result<Vec<WatchlistItem>, CommodityxError> {
        query_list(
            &*self.conn()?,
            "SELECT w.id, w.user_id, w.commodity_symbol, w.added_at,
                    c.name, c.current_price, c.change_percent
             FROM watchlist w
             LEFT JOIN commodities c ON c.symbol = w.commodity_symbol
             WHERE w.user_id = ?1
             ORDER BY w.added_at DESC, w.id DESC",
            params![user_id],
            |row| {
                Ok(WatchlistItem {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    commodity_symbol: row.get(2)?,
                    added_at: get_ts(row, 3)?,
                    name: row.get(4)?,
                    current_price: row.get(5)?,
                    change_percent: row.get(6)?,
                })
            },
        )
    }

    fn add_to_watchlist(
        &self,
        user_id: i64,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, CommodityxError> {
        let conn = self.conn()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO watchlist (user_id, commodity_symbol, added_at)
                 VALUES (?1, ?2, ?3)",
                params![user_id, symbol, ts(&now)],
            )
            .map_err(CommodityxError::query)?;
        Ok((inserted > 0).then(|| conn.last_insert_rowid()))
    }

    fn remove_from_watchlist(&self, user_id: i64, symbol: &str) -> Result<bool, CommodityxError> {
        let changed = self
            .conn()?
            .execute(
                "DELETE FROM watchlist WHERE user_id = ?1 AND commodity_symbol = ?2",
                params![user_id, symbol],
            )
            .map_err(CommodityxError::query)?;
        Ok(changed > 0)
    }
}

impl AlertRepo for SqliteStore {
    fn create_alert(
        &self,
        user_id: i64,
        alert: &NewAlert,
        now: DateTime<Utc>,
    ) -> Result<i64, CommodityxError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO price_alerts (user_id, commodity_symbol, alert_type, target_price, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
            params![
                user_id,
                alert.commodity_symbol,
                alert.alert_type.as_str(),
                alert.target_price,
                ts(&now)
            ],
        )
        .map_err(CommodityxError::query)?;
        Ok(conn.last_insert_rowid())
    }

    fn list_active_alerts(&self, user_id: i64) -> Result<Vec<AlertView>, CommodityxError> {
        query_list(
            &*self.conn()?,
            &format!(
                "{ALERT_VIEW_SELECT}
                 LEFT JOIN commodities c ON c.symbol = a.commodity_symbol
                 WHERE a.user_id = ?1 AND a.is_active = 1
                 ORDER BY a.created_at DESC, a.id DESC"
            ),
            params![user_id],
            map_alert_view,
        )
    }

    fn list_all_active_alerts(&self) -> Result<Vec<AlertView>, CommodityxError> {
        query_list(
            &*self.conn()?,
            &format!(
                "{ALERT_VIEW_SELECT}
                 JOIN commodities c ON c.symbol = a.commodity_symbol
                 WHERE a.is_active = 1
                 ORDER BY a.id"
            ),
            [],
            map_alert_view,
        )
    }

    fn deactivate_alert(&self, id: i64, now: DateTime<Utc>) -> Result<bool, CommodityxError> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE price_alerts SET is_active = 0, triggered_at = ?2
                 WHERE id = ?1 AND is_active = 1",
                params![id, ts(&now)],
            )
            .map_err(CommodityxError::query)?;
        Ok(changed == 1)
    }

    fn delete_alert(&self, id: i64, user_id: i64) -> Result<bool, CommodityxError> {
        let changed = self
            .conn()?
            .execute(
                "DELETE FROM price_alerts WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .map_err(CommodityxError::query)?;
        Ok(changed > 0)
    }
}

/// An open `BEGIN IMMEDIATE` transaction on a pooled connection.
pub struct SqliteLedgerTx {
    conn: PooledSqlite,
    committed: bool,
}

impl Drop for SqliteLedgerTx {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::error!(error = %e, "rollback failed");
            }
        }
    }
}

impl UnitOfWork for SqliteStore {
    fn begin(&self) -> Result<Box<dyn LedgerTx + '_>, CommodityxError> {
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(CommodityxError::db)?;
        Ok(Box::new(SqliteLedgerTx {
            conn,
            committed: false,
        }))
    }
}

impl LedgerTx for SqliteLedgerTx {
    fn balance(&self, user_id: i64) -> Result<Option<f64>, CommodityxError> {
        self.conn
            .query_row(
                "SELECT balance FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(CommodityxError::query)
    }

    fn adjust_balance(&self, user_id: i64, delta: f64) -> Result<f64, CommodityxError> {
        let current = self
            .balance(user_id)?
            .ok_or(CommodityxError::UserNotFound { id: user_id })?;
        let next = apply_delta(current, delta)?;
        self.conn
            .execute(
                "UPDATE users SET balance = ?2 WHERE id = ?1",
                params![user_id, next],
            )
            .map_err(CommodityxError::query)?;
        Ok(next)
    }

    fn record_transaction(&self, entry: &NewLedgerEntry) -> Result<i64, CommodityxError> {
        self.conn
            .execute(
                "INSERT INTO transactions (user_id, transaction_type, amount, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.user_id,
                    entry.transaction_type.as_str(),
                    entry.amount,
                    entry.description,
                    ts(&entry.created_at)
                ],
            )
            .map_err(CommodityxError::query)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn find_commodity(&self, symbol: &str) -> Result<Option<Commodity>, CommodityxError> {
        query_commodity(&self.conn, symbol)
    }

    fn find_position(
        &self,
        user_id: i64,
        symbol: &str,
    ) -> Result<Option<Position>, CommodityxError> {
        query_position(&self.conn, user_id, symbol)
    }

    fn save_position(&self, position: &Position) -> Result<(), CommodityxError> {
        self.conn
            .execute(
                "INSERT INTO portfolio
                    (user_id, commodity_symbol, quantity, average_price, total_invested, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(user_id, commodity_symbol) DO UPDATE SET
                    quantity = excluded.quantity,
                    average_price = excluded.average_price,
                    total_invested = excluded.total_invested,
                    updated_at = excluded.updated_at",
                params![
                    position.user_id,
                    position.commodity_symbol,
                    position.quantity,
                    position.average_price,
                    position.total_invested,
                    ts(&position.created_at),
                    ts(&position.updated_at)
                ],
            )
            .map_err(CommodityxError::query)?;
        Ok(())
    }

    fn delete_position(&self, user_id: i64, symbol: &str) -> Result<(), CommodityxError> {
        self.conn
            .execute(
                "DELETE FROM portfolio WHERE user_id = ?1 AND commodity_symbol = ?2",
                params![user_id, symbol],
            )
            .map_err(CommodityxError::query)?;
        Ok(())
    }

    fn insert_order(&self, order: &NewOrder) -> Result<i64, CommodityxError> {
        self.conn
            .execute(
                "INSERT INTO orders
                    (user_id, commodity_symbol, order_type, quantity, price, total_amount, status, client_order_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    order.user_id,
                    order.commodity_symbol,
                    order.order_type.as_str(),
                    order.quantity,
                    order.price,
                    order.total_amount,
                    order.status.as_str(),
                    order.client_order_id,
                    ts(&order.created_at)
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    CommodityxError::Conflict {
                        reason: "idempotency key already used".into(),
                    }
                } else {
                    CommodityxError::query(e)
                }
            })?;
        Ok(self.conn.last_insert_rowid())
    }

    fn find_order(&self, id: i64) -> Result<Option<Order>, CommodityxError> {
        self.conn
            .query_row(
                &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
                params![id],
                map_order,
            )
            .optional()
            .map_err(CommodityxError::query)
    }

    fn find_order_by_client_id(
        &self,
        user_id: i64,
        client_order_id: &str,
    ) -> Result<Option<Order>, CommodityxError> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ?1 AND client_order_id = ?2"
                ),
                params![user_id, client_order_id],
                map_order,
            )
            .optional()
            .map_err(CommodityxError::query)
    }

    fn set_order_status(&self, id: i64, status: OrderStatus) -> Result<(), CommodityxError> {
        self.conn
            .execute(
                "UPDATE orders SET status = ?2 WHERE id = ?1",
                params![id, status.as_str()],
            )
            .map_err(CommodityxError::query)?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), CommodityxError> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(CommodityxError::db)?;
        self.committed = true;
        Ok(())
    }
}
