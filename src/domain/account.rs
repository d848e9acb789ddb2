//! Registration, login and profile management.

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use chrono::Utc;
use rand::rngs::OsRng;

use super::error::CommodityxError;
use super::user::{ProfileUpdate, Registration, User, UserRecord};
use crate::ports::store_port::Store;

fn hasher() -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default())
}

/// Hash a password with argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, CommodityxError> {
    let salt = SaltString::generate(&mut OsRng);
    hasher()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| CommodityxError::validation("password", e.to_string()))
}

/// Check a password against a stored PHC hash string. A malformed hash never
/// verifies.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Create an account funded with `initial_balance`.
pub fn register(
    store: &dyn Store,
    registration: Registration,
    initial_balance: f64,
    is_admin: bool,
) -> Result<User, CommodityxError> {
    let registration = registration.normalized()?;

    if store.username_taken(&registration.username)? {
        return Err(CommodityxError::Conflict {
            reason: "username already exists".to_string(),
        });
    }
    if store.email_taken(&registration.email, None)? {
        return Err(CommodityxError::Conflict {
            reason: "email already exists".to_string(),
        });
    }

    let hash = hash_password(&registration.password)?;
    let user = store.create_user(&registration, &hash, initial_balance, is_admin, Utc::now())?;
    tracing::info!(user_id = user.id, username = %user.username, is_admin, "user registered");
    Ok(user)
}

/// Verify credentials and return the matching account. Unknown users and
/// wrong passwords both come back as `None`.
pub fn authenticate(
    store: &dyn Store,
    username: &str,
    password: &str,
) -> Result<Option<UserRecord>, CommodityxError> {
    let username = username.trim();
    match store.find_user_record(username)? {
        Some(record) if verify_password(password, &record.password_hash) => Ok(Some(record)),
        Some(_) | None => {
            tracing::warn!(username, "failed login attempt");
            Ok(None)
        }
    }
}

pub fn profile(store: &dyn Store, user_id: i64) -> Result<User, CommodityxError> {
    store
        .find_user(user_id)?
        .ok_or(CommodityxError::UserNotFound { id: user_id })
}

pub fn update_profile(
    store: &dyn Store,
    user_id: i64,
    update: ProfileUpdate,
) -> Result<User, CommodityxError> {
    let update = update.normalized()?;
    if let Some(email) = update.email.as_deref() {
        if store.email_taken(email, Some(user_id))? {
            return Err(CommodityxError::Conflict {
                reason: "email already exists".to_string(),
            });
        }
    }
    store.update_profile(user_id, update.full_name.as_deref(), update.email.as_deref())
}
