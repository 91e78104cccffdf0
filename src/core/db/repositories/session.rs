//! Session repository backed by the `sessions` table
//!
//! Only SHA-256 digests of refresh secrets reach this table. Revocation is
//! a conditional update (`revoked_at IS NULL`) so two requests racing on the
//! same session cannot both succeed, and rotation runs the revoke and the
//! replacement insert in one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::core::auth::session::Session;
use crate::core::db::repositories::classify;
use crate::core::db::store::{RotationError, SessionStore, StoreError};

const SESSION_COLUMNS: &str = "id, user_id, token_hash, user_agent, client_addr, \
                               expires_at, revoked_at, created_at, updated_at";

const INSERT_SESSION: &str = r#"
    INSERT INTO sessions (id, user_id, token_hash, user_agent, client_addr,
                          expires_at, revoked_at, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
"#;

const UPDATE_SESSION: &str = r#"
    UPDATE sessions
    SET
        user_agent = $2,
        client_addr = $3,
        expires_at = $4,
        revoked_at = $5,
        updated_at = $6
    WHERE id = $1 AND revoked_at IS NULL
"#;

#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        session: &Session,
    ) -> Result<(), StoreError> {
        sqlx::query(INSERT_SESSION)
            .bind(session.id)
            .bind(session.user_id)
            .bind(&session.token_hash)
            .bind(&session.user_agent)
            .bind(&session.client_addr)
            .bind(session.expires_at)
            .bind(session.revoked_at)
            .bind(session.created_at)
            .bind(session.updated_at)
            .execute(&mut **tx)
            .await
            .map_err(classify)?;

        Ok(())
    }

    async fn update(
        tx: &mut Transaction<'_, Postgres>,
        session: &Session,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(UPDATE_SESSION)
            .bind(session.id)
            .bind(&session.user_agent)
            .bind(&session.client_addr)
            .bind(session.expires_at)
            .bind(session.revoked_at)
            .bind(session.updated_at)
            .execute(&mut **tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Self::missing_or_conflict(tx, session.id).await?);
        }

        Ok(())
    }

    /// Tell a vanished row apart from one that was revoked concurrently
    async fn missing_or_conflict(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<StoreError, StoreError> {
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(match exists {
            Some(_) => StoreError::Conflict,
            None => StoreError::NotFound,
        })
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::insert(&mut tx, session).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>, StoreError> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE token_hash = $1");
        let session = sqlx::query_as::<_, Session>(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;

        Ok(session)
    }

    async fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::update(&mut tx, session).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn sessions_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, StoreError> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = $1 ORDER BY created_at DESC"
        );
        let sessions = sqlx::query_as::<_, Session>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(sessions)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn rotate_session(
        &self,
        revoked: &Session,
        replacement: &Session,
    ) -> Result<(), RotationError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RotationError::Revoke(e.into()))?;

        Self::update(&mut tx, revoked)
            .await
            .map_err(RotationError::Revoke)?;
        Self::insert(&mut tx, replacement)
            .await
            .map_err(RotationError::Insert)?;

        // Dropping an uncommitted transaction rolls it back
        tx.commit()
            .await
            .map_err(|e| RotationError::Insert(e.into()))
    }
}
