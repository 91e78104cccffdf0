//! Login identifiers and their resolution to user records
//!
//! [`Username`] and [`Email`] are normalised value types: once constructed
//! they are trimmed, lower-cased and known to be well-formed. The
//! [`IdentityResolver`] parses a free-form login identifier into one of them
//! before touching the store.

use std::fmt;
use std::sync::Arc;

use crate::core::auth::error::AuthError;
use crate::core::db::models::User;
use crate::core::db::store::UserStore;

const USERNAME_MIN_LEN: usize = 3;
const USERNAME_MAX_LEN: usize = 20;

const RESERVED_USERNAMES: &[&str] = &[
    "admin",
    "administrator",
    "root",
    "null",
    "undefined",
    "system",
    "support",
    "info",
    "true",
    "false",
    "yes",
    "no",
    "user",
    "superadmin",
    "moderator",
    "member",
    "guest",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("username is required")]
    UsernameRequired,

    #[error("username must be between 3 and 20 characters")]
    UsernameLength,

    #[error("username must start with a letter and contain only letters, digits and underscores")]
    UsernameFormat,

    #[error("username is reserved")]
    UsernameReserved,

    #[error("email is required")]
    EmailRequired,

    #[error("email is invalid")]
    EmailFormat,
}

// ============================================================================
// Username
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let value = raw.trim().to_lowercase();
        if value.is_empty() {
            return Err(IdentifierError::UsernameRequired);
        }

        let len = value.chars().count();
        if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
            return Err(IdentifierError::UsernameLength);
        }

        let mut chars = value.chars();
        if !chars.next().is_some_and(|c| c.is_ascii_lowercase()) {
            return Err(IdentifierError::UsernameFormat);
        }

        if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
            return Err(IdentifierError::UsernameFormat);
        }

        if RESERVED_USERNAMES.contains(&value.as_str()) {
            return Err(IdentifierError::UsernameReserved);
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Email
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let value = raw.trim().to_lowercase();
        if value.is_empty() {
            return Err(IdentifierError::EmailRequired);
        }

        if value.chars().any(char::is_whitespace) {
            return Err(IdentifierError::EmailFormat);
        }

        let Some((local, domain)) = value.split_once('@') else {
            return Err(IdentifierError::EmailFormat);
        };

        if local.is_empty() || domain.contains('@') {
            return Err(IdentifierError::EmailFormat);
        }

        // Domain needs at least two labels, none of them empty
        if !domain.contains('.') || domain.split('.').any(str::is_empty) {
            return Err(IdentifierError::EmailFormat);
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Identity Resolver
// ============================================================================

/// Resolves a login identifier to a user: username first, then email.
#[derive(Clone)]
pub struct IdentityResolver {
    users: Arc<dyn UserStore>,
}

impl IdentityResolver {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Returns `Ok(None)` when nothing matches, including when the
    /// identifier is neither a valid username nor a valid email.
    pub async fn resolve_login(&self, identifier: &str) -> Result<Option<User>, AuthError> {
        if let Ok(username) = Username::parse(identifier) {
            let found = self
                .users
                .get_user_by_username(&username)
                .await
                .map_err(|e| AuthError::internal("get user by username", e))?;

            if found.is_some() {
                return Ok(found);
            }
        }

        if let Ok(email) = Email::parse(identifier) {
            return self
                .users
                .get_user_by_email(&email)
                .await
                .map_err(|e| AuthError::internal("get user by email", e));
        }

        Ok(None)
    }
}
