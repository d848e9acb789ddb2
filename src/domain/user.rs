//! User accounts and registration rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::CommodityxError;

/// Cash balance granted to every new account unless configured otherwise.
pub const DEFAULT_INITIAL_BALANCE: f64 = 100_000.0;

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

/// A registered user. The password hash lives in [`UserRecord`] only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub balance: f64,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// A user together with the stored argon2 hash, used for authentication.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user: User,
    pub password_hash: String,
}

/// Registration request as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

impl Registration {
    /// Trim fields and check the registration rules.
    pub fn normalized(self) -> Result<Registration, CommodityxError> {
        let username = self.username.trim().to_string();
        if username.chars().count() < MIN_USERNAME_LEN {
            return Err(CommodityxError::validation(
                "username",
                format!("must be at least {MIN_USERNAME_LEN} characters"),
            ));
        }
        let email = normalize_email(&self.email)?;
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(CommodityxError::validation(
                "password",
                format!("must be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }
        let full_name = self
            .full_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        Ok(Registration {
            username,
            email,
            password: self.password,
            full_name,
        })
    }
}

/// Fields a user may change on their own profile.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

impl ProfileUpdate {
    pub fn normalized(self) -> Result<ProfileUpdate, CommodityxError> {
        let email = match self.email {
            Some(e) => Some(normalize_email(&e)?),
            None => None,
        };
        Ok(ProfileUpdate {
            full_name: self.full_name.map(|n| n.trim().to_string()),
            email,
        })
    }
}

/// Lowercase and sanity-check an email address.
pub fn normalize_email(email: &str) -> Result<String, CommodityxError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(CommodityxError::validation("email", "invalid email"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(username: &str, email: &str, password: &str) -> Registration {
        Registration {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            full_name: Some("  Ada Lovelace ".into()),
        }
    }

    #[test]
    fn normalizes_valid_registration() {
        let reg = registration(" ada ", "Ada@Example.com", "secret1")
            .normalized()
            .unwrap();
        assert_eq!(reg.username, "ada");
        assert_eq!(reg.email, "ada@example.com");
        assert_eq!(reg.full_name.as_deref(), Some("Ada Lovelace"));
    }

    #[test]
    fn rejects_short_username() {
        let err = registration("ab", "ab@example.com", "secret1")
            .normalized()
            .unwrap_err();
        assert!(matches!(err, CommodityxError::Validation { field, .. } if field == "username"));
    }

    #[test]
    fn rejects_short_password() {
        let err = registration("ada", "ada@example.com", "12345")
            .normalized()
            .unwrap_err();
        assert!(matches!(err, CommodityxError::Validation { field, .. } if field == "password"));
    }

    #[test]
    fn email_rules() {
        assert!(normalize_email("trader@commodityx.io").is_ok());
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("a@nodot").is_err());
        assert!(normalize_email("a@b@c.com").is_err());
        assert!(normalize_email("a b@c.com").is_err());
    }

    #[test]
    fn blank_full_name_becomes_none() {
        let mut reg = registration("ada", "ada@example.com", "secret1");
        reg.full_name = Some("   ".into());
        assert_eq!(reg.normalized().unwrap().full_name, None);
    }
}
