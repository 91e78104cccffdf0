//! Database models for Gatekeeper
//!
//! This module defines the user entity and the small enumerations stored
//! alongside it. Sessions live in [`crate::core::auth::session`] because they
//! carry their own state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::core::auth::identity::{Email, Username};
use crate::core::auth::password::PasswordHash;

// ============================================================================
// Role Model
// ============================================================================

/// Permission granted by a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    UserRead,
    UserWrite,
    UserBan,
    UserDelete,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Permission::UserRead => write!(f, "user:read"),
            Permission::UserWrite => write!(f, "user:write"),
            Permission::UserBan => write!(f, "user:ban"),
            Permission::UserDelete => write!(f, "user:delete"),
        }
    }
}

/// Role carried by a user and embedded in access tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
    SuperAdmin,
}

/// Role parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoleError {
    #[error("role is required")]
    Required,

    #[error("role is invalid")]
    Invalid,
}

impl Role {
    /// Permissions granted to this role
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            Role::User => &[Permission::UserRead],
            Role::Admin => &[
                Permission::UserRead,
                Permission::UserWrite,
                Permission::UserBan,
            ],
            Role::SuperAdmin => &[
                Permission::UserRead,
                Permission::UserWrite,
                Permission::UserBan,
                Permission::UserDelete,
            ],
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "superadmin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = RoleError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RoleError::Required);
        }

        match trimmed.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "superadmin" => Ok(Role::SuperAdmin),
            _ => Err(RoleError::Invalid),
        }
    }
}

// ============================================================================
// User Model
// ============================================================================

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Activated,
    Banned,
    Deleted,
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserStatus::Activated => write!(f, "activated"),
            UserStatus::Banned => write!(f, "banned"),
            UserStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// User domain errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UserError {
    #[error("password is required")]
    PasswordRequired,

    #[error("first name is required")]
    FirstNameRequired,

    #[error("last name is required")]
    LastNameRequired,

    #[error("user is not activated")]
    NotActivated,

    #[error("user is already verified")]
    AlreadyVerified,

    #[error("user is already banned")]
    AlreadyBanned,

    #[error("user is not banned")]
    NotBanned,
}

/// User entity representing a registered account
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: PasswordHash,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub status: UserStatus,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a freshly registered user: role `user`, activated, unverified
    pub fn new(
        username: Username,
        email: Email,
        password_hash: PasswordHash,
        first_name: &str,
        last_name: &str,
    ) -> Result<Self, UserError> {
        if password_hash.is_zero() {
            return Err(UserError::PasswordRequired);
        }

        let first_name = first_name.trim();
        if first_name.is_empty() {
            return Err(UserError::FirstNameRequired);
        }

        let last_name = last_name.trim();
        if last_name.is_empty() {
            return Err(UserError::LastNameRequired);
        }

        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            username: username.into_inner(),
            email: email.into_inner(),
            password_hash,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            role: Role::User,
            status: UserStatus::Activated,
            verified_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_activated(&self) -> bool {
        self.status == UserStatus::Activated
    }

    pub fn is_banned(&self) -> bool {
        self.status == UserStatus::Banned
    }

    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }

    /// Eligibility predicate checked on every login and refresh
    pub fn can_authenticate(&self) -> bool {
        self.is_activated() && self.is_verified() && !self.is_banned()
    }

    /// Mark the account's email as verified
    pub fn verify(&mut self) -> Result<(), UserError> {
        if !self.is_activated() {
            return Err(UserError::NotActivated);
        }

        if self.is_verified() {
            return Err(UserError::AlreadyVerified);
        }

        let now = Utc::now();
        self.verified_at = Some(now);
        self.updated_at = now;

        Ok(())
    }

    pub fn ban(&mut self) -> Result<(), UserError> {
        if self.is_banned() {
            return Err(UserError::AlreadyBanned);
        }

        self.status = UserStatus::Banned;
        self.updated_at = Utc::now();

        Ok(())
    }

    pub fn unban(&mut self) -> Result<(), UserError> {
        if !self.is_banned() {
            return Err(UserError::NotBanned);
        }

        self.status = UserStatus::Activated;
        self.updated_at = Utc::now();

        Ok(())
    }
}

// ============================================================================
// One-time Token Purposes
// ============================================================================

/// Purposes of single-use emailed tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    VerifyEmail,
    PasswordReset,
    MagicLink,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::VerifyEmail => write!(f, "verify_email"),
            TokenType::PasswordReset => write!(f, "password_reset"),
            TokenType::MagicLink => write!(f, "magic_link"),
        }
    }
}
