//! Persistence contract
//!
//! The auth core talks to storage only through [`UserStore`] and
//! [`SessionStore`]. The PostgreSQL repositories and the in-memory store both
//! implement them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::auth::identity::{Email, Username};
use crate::core::auth::session::Session;
use crate::core::db::models::User;

/// Unique constraint names, shared by every store implementation
pub const USERNAME_CONSTRAINT: &str = "users_username_key";
pub const EMAIL_CONSTRAINT: &str = "users_email_key";
pub const TOKEN_HASH_CONSTRAINT: &str = "sessions_token_hash_key";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The stored record changed underneath the caller (e.g. a session was
    /// revoked by a concurrent request)
    #[error("record was modified concurrently")]
    Conflict,

    #[error("unique constraint violated: {0}")]
    Duplicate(String),

    #[error("record not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Which half of a rotation failed
#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error("failed to revoke previous session: {0}")]
    Revoke(#[source] StoreError),

    #[error("failed to insert replacement session: {0}")]
    Insert(#[source] StoreError),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn save_user(&self, user: &User) -> Result<(), StoreError>;

    async fn update_user(&self, user: &User) -> Result<(), StoreError>;

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn get_user_by_username(&self, username: &Username)
    -> Result<Option<User>, StoreError>;

    async fn get_user_by_email(&self, email: &Email) -> Result<Option<User>, StoreError>;

    async fn username_exists(&self, username: &Username) -> Result<bool, StoreError> {
        Ok(self.get_user_by_username(username).await?.is_some())
    }

    async fn email_exists(&self, email: &Email) -> Result<bool, StoreError> {
        Ok(self.get_user_by_email(email).await?.is_some())
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new session. Token hashes are unique.
    async fn save_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn get_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>, StoreError>;

    /// Persist a state change. Applies only while the stored row is still
    /// unrevoked and returns [`StoreError::Conflict`] otherwise.
    async fn update_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn sessions_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, StoreError>;

    /// Remove sessions that expired before `now`, returning how many
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Persist a rotation: the revoked predecessor, then its replacement.
    ///
    /// The default runs the two writes back to back with no atomicity, so a
    /// failed insert leaves the user without a usable session. Stores that
    /// can do better override it.
    async fn rotate_session(
        &self,
        revoked: &Session,
        replacement: &Session,
    ) -> Result<(), RotationError> {
        self.update_session(revoked)
            .await
            .map_err(RotationError::Revoke)?;
        self.save_session(replacement)
            .await
            .map_err(RotationError::Insert)
    }
}
