//! User repository backed by the `users` table

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::auth::identity::{Email, Username};
use crate::core::db::models::User;
use crate::core::db::repositories::classify;
use crate::core::db::store::{StoreError, UserStore};

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, \
                            role, status, verified_at, created_at, updated_at";

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, first_name, last_name,
                               role, status, verified_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role)
        .bind(user.status)
        .bind(user.verified_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET
                username = $2,
                email = $3,
                password_hash = $4,
                first_name = $5,
                last_name = $6,
                role = $7,
                status = $8,
                verified_at = $9,
                updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role)
        .bind(user.status)
        .bind(user.verified_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn get_user_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, StoreError> {
        self.find_one("username", username.as_str()).await
    }

    async fn get_user_by_email(&self, email: &Email) -> Result<Option<User>, StoreError> {
        self.find_one("email", email.as_str()).await
    }
}
