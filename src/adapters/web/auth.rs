//! Authentication backend for axum-login.
//!
//! Users live in the store; the session keeps only the user id and checks it
//! against the stored password hash on every request.

use axum_login::{AuthUser, AuthnBackend, UserId};
use serde::Deserialize;
use std::sync::Arc;

use crate::domain::account;
use crate::domain::error::CommodityxError;
use crate::domain::user::UserRecord;
use crate::ports::store_port::Store;

/// The authenticated principal attached to a session.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
    /// The password hash string as bytes. Changing the password invalidates
    /// existing sessions.
    pw_hash_bytes: Vec<u8>,
}

impl From<UserRecord> for SessionUser {
    fn from(record: UserRecord) -> Self {
        SessionUser {
            id: record.user.id,
            username: record.user.username,
            is_admin: record.user.is_admin,
            pw_hash_bytes: record.password_hash.into_bytes(),
        }
    }
}

impl AuthUser for SessionUser {
    type Id = i64;

    fn id(&self) -> i64 {
        self.id
    }

    fn session_auth_hash(&self) -> &[u8] {
        &self.pw_hash_bytes
    }
}

/// Login credentials submitted as JSON.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Clone)]
pub struct Backend {
    store: Arc<dyn Store>,
}

impl Backend {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl AuthnBackend for Backend {
    type User = SessionUser;
    type Credentials = Credentials;
    type Error = CommodityxError;

    async fn authenticate(
        &self,
        creds: Self::Credentials,
    ) -> Result<Option<Self::User>, Self::Error> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || -> Result<Option<SessionUser>, CommodityxError> {
            let record = account::authenticate(store.as_ref(), &creds.username, &creds.password)?;
            Ok(record.map(SessionUser::from))
        })
        .await
        .map_err(|e| CommodityxError::db(format!("authentication task failed: {e}")))?
    }

    async fn get_user(
        &self,
        user_id: &UserId<Self>,
    ) -> Result<Option<Self::User>, Self::Error> {
        let store = Arc::clone(&self.store);
        let id = *user_id;
        tokio::task::spawn_blocking(move || -> Result<Option<SessionUser>, CommodityxError> {
            Ok(store.find_user_record_by_id(id)?.map(SessionUser::from))
        })
        .await
        .map_err(|e| CommodityxError::db(format!("session lookup task failed: {e}")))?
    }
}

pub type AuthSession = axum_login::AuthSession<Backend>;
