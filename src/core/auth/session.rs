//! Refresh sessions
//!
//! A session is one refresh-token lifetime. It only ever moves forward:
//! `active -> revoked`, or `active -> active'` through [`Session::rotate`],
//! which revokes the current session and yields its successor. Revocation is
//! permanent and the raw refresh secret is never stored, only its digest.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Session state errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("user id is required")]
    UserIdRequired,

    #[error("token hash is required")]
    TokenRequired,

    #[error("session expired")]
    SessionExpired,

    #[error("session revoked")]
    SessionRevoked,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub user_agent: String,
    pub client_addr: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Open a new session. `expires_at` must lie in the future.
    pub fn new(
        user_id: Uuid,
        token_hash: impl Into<String>,
        user_agent: impl Into<String>,
        client_addr: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        if user_id.is_nil() {
            return Err(SessionError::UserIdRequired);
        }

        let token_hash = token_hash.into();
        if token_hash.is_empty() {
            return Err(SessionError::TokenRequired);
        }

        let now = Utc::now();
        if expires_at <= now {
            return Err(SessionError::SessionExpired);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            token_hash,
            user_agent: user_agent.into(),
            client_addr: client_addr.into(),
            expires_at,
            revoked_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// A session expiring exactly at `now` counts as expired
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_active(&self) -> bool {
        !self.is_expired() && !self.is_revoked()
    }

    pub fn revoke(&mut self) -> Result<(), SessionError> {
        if self.is_revoked() {
            return Err(SessionError::SessionRevoked);
        }

        let now = Utc::now();
        self.revoked_at = Some(now);
        self.updated_at = now;

        Ok(())
    }

    /// Revoke this session and produce its successor for the same user.
    ///
    /// The successor inherits the user agent and client address unless new,
    /// non-empty values are supplied. Nothing is modified when an error is
    /// returned.
    pub fn rotate(
        &mut self,
        new_token_hash: impl Into<String>,
        new_expires_at: DateTime<Utc>,
        user_agent: Option<String>,
        client_addr: Option<String>,
    ) -> Result<Session, SessionError> {
        if self.is_revoked() {
            return Err(SessionError::SessionRevoked);
        }

        if self.is_expired() {
            return Err(SessionError::SessionExpired);
        }

        let user_agent = user_agent
            .filter(|ua| !ua.is_empty())
            .unwrap_or_else(|| self.user_agent.clone());
        let client_addr = client_addr
            .filter(|addr| !addr.is_empty())
            .unwrap_or_else(|| self.client_addr.clone());

        let successor = Session::new(
            self.user_id,
            new_token_hash,
            user_agent,
            client_addr,
            new_expires_at,
        )?;

        self.revoke()?;

        Ok(successor)
    }
}
