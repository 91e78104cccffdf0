//! Password hashing
//!
//! Passwords are hashed with bcrypt. The resulting hash string is
//! self-describing (it embeds algorithm, cost and salt), so verification
//! needs nothing but the stored [`PasswordHash`].

use std::fmt;

/// Default bcrypt cost
pub const DEFAULT_COST: u32 = 12;

const MIN_COST: u32 = 4;
const MAX_COST: u32 = 31;

/// Password hashing errors
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password is required")]
    PasswordRequired,

    #[error("hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
}

/// Stored bcrypt hash. `Debug` never reveals the hash material.
#[derive(Clone, Default, PartialEq, Eq, sqlx::Type)]
#[sqlx(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Wrap a hash loaded from storage
    pub fn from_hash(hash: impl Into<String>) -> Result<Self, PasswordError> {
        let hash = hash.into();
        if hash.is_empty() {
            return Err(PasswordError::PasswordRequired);
        }
        Ok(Self(hash))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the empty hash, which never matches any password
    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(*****)")
    }
}

/// bcrypt hasher with a fixed work factor
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    /// Costs outside bcrypt's supported range fall back to [`DEFAULT_COST`]
    pub fn new(cost: u32) -> Self {
        let cost = if (MIN_COST..=MAX_COST).contains(&cost) {
            cost
        } else {
            DEFAULT_COST
        };
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn hash(&self, password: &str) -> Result<PasswordHash, PasswordError> {
        if password.is_empty() {
            return Err(PasswordError::PasswordRequired);
        }

        let hash = bcrypt::hash(password, self.cost)?;
        Ok(PasswordHash(hash))
    }

    /// Returns false on mismatch, on empty input, and on malformed hashes
    pub fn compare(&self, password: &str, hash: &PasswordHash) -> bool {
        if password.is_empty() || hash.is_zero() {
            return false;
        }

        bcrypt::verify(password, hash.as_str()).unwrap_or(false)
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_COST)
    }
}
