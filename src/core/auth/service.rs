//! Authentication service
//!
//! Owns the session lifecycle: registration, login, refresh-token rotation,
//! logout and access-token authentication. Coordinates the identity
//! resolver, password hasher, opaque token manager and JWT service, and
//! persists through the store traits.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::auth::error::AuthError;
use crate::core::auth::identity::{Email, IdentityResolver, Username};
use crate::core::auth::jwt::{AccessClaims, JwtService};
use crate::core::auth::opaque::OpaqueTokenManager;
use crate::core::auth::password::PasswordHasher;
use crate::core::auth::session::Session;
use crate::core::db::models::User;
use crate::core::db::store::{
    EMAIL_CONSTRAINT, RotationError, SessionStore, StoreError, UserStore,
};

/// Minimum password length accepted at registration
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Service construction errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceConfigError {
    #[error("refresh token TTL must be positive")]
    RefreshTtlRequired,

    #[error("refresh token TTL must be longer than the access token TTL")]
    RefreshTtlTooShort,
}

/// Registration request data
#[derive(Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"*****")
            .finish_non_exhaustive()
    }
}

/// Login request data
#[derive(Clone)]
pub struct LoginRequest {
    /// Username or email
    pub login: String,
    pub password: String,
    pub user_agent: String,
    pub client_addr: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("password", &"*****")
            .field("user_agent", &self.user_agent)
            .field("client_addr", &self.client_addr)
            .finish_non_exhaustive()
    }
}

/// Token refresh request. Missing client details are inherited from the
/// rotated session.
#[derive(Clone, Default)]
pub struct RefreshRequest {
    pub refresh_token: String,
    pub user_agent: Option<String>,
    pub client_addr: Option<String>,
}

/// Token pair (access + refresh)
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    /// Raw refresh secret; only ever returned here
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    /// Token type (always "Bearer")
    pub token_type: &'static str,
}

/// Successful login
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    identity: IdentityResolver,
    hasher: PasswordHasher,
    opaque: OpaqueTokenManager,
    jwt: JwtService,
    refresh_ttl: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        jwt: JwtService,
        hasher: PasswordHasher,
        opaque: OpaqueTokenManager,
        refresh_ttl: Duration,
    ) -> Result<Self, ServiceConfigError> {
        if refresh_ttl <= Duration::zero() {
            return Err(ServiceConfigError::RefreshTtlRequired);
        }

        if refresh_ttl <= jwt.access_ttl() {
            return Err(ServiceConfigError::RefreshTtlTooShort);
        }

        Ok(Self {
            identity: IdentityResolver::new(users.clone()),
            users,
            sessions,
            hasher,
            opaque,
            jwt,
            refresh_ttl,
        })
    }

    /// Register a new user. The account starts activated but unverified.
    pub async fn register(&self, request: RegisterRequest) -> Result<Uuid, AuthError> {
        let username = Username::parse(&request.username)
            .map_err(|e| AuthError::InvalidParameter(e.to_string()))?;
        let email =
            Email::parse(&request.email).map_err(|e| AuthError::InvalidParameter(e.to_string()))?;

        if request.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::InvalidParameter(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        if self
            .users
            .username_exists(&username)
            .await
            .map_err(|e| AuthError::internal("check username", e))?
        {
            return Err(AuthError::UsernameTaken);
        }

        if self
            .users
            .email_exists(&email)
            .await
            .map_err(|e| AuthError::internal("check email", e))?
        {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = self
            .hasher
            .hash(&request.password)
            .map_err(|e| AuthError::internal("hash password", e))?;

        let user = User::new(
            username,
            email,
            password_hash,
            &request.first_name,
            &request.last_name,
        )
        .map_err(|e| AuthError::InvalidParameter(e.to_string()))?;

        self.users.save_user(&user).await.map_err(|e| match e {
            StoreError::Duplicate(constraint) if constraint == EMAIL_CONSTRAINT => {
                AuthError::EmailTaken
            }
            StoreError::Duplicate(_) => AuthError::UsernameTaken,
            other => AuthError::internal("save user", other),
        })?;

        info!(user_id = %user.id, "user registered");

        Ok(user.id)
    }

    /// Authenticate with username or email plus password and open a session
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, AuthError> {
        let Some(user) = self.identity.resolve_login(&request.login).await? else {
            warn!("login rejected: invalid credentials");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.hasher.compare(&request.password, &user.password_hash) {
            warn!("login rejected: invalid credentials");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.can_authenticate() {
            warn!(user_id = %user.id, "login rejected: user blocked");
            return Err(AuthError::UserBlocked);
        }

        let refresh_token = self.generate_refresh_secret()?;
        let token_hash = self.hash_refresh_secret(&refresh_token)?;

        let session = Session::new(
            user.id,
            token_hash,
            request.user_agent,
            request.client_addr,
            Utc::now() + self.refresh_ttl,
        )
        .map_err(|e| AuthError::internal("create session", e))?;

        self.sessions
            .save_session(&session)
            .await
            .map_err(|e| AuthError::internal("save session", e))?;

        let access = self.jwt.generate(&AccessClaims::from(&user))?;

        info!(user_id = %user.id, session_id = %session.id, "user logged in");

        Ok(LoginResponse {
            user_id: user.id,
            tokens: TokenPair {
                access_token: access.token,
                refresh_token,
                access_expires_at: access.expires_at,
                refresh_expires_at: session.expires_at,
                token_type: "Bearer",
            },
        })
    }

    /// Exchange a refresh secret for a new token pair, rotating the session
    pub async fn refresh(&self, request: RefreshRequest) -> Result<TokenPair, AuthError> {
        if request.refresh_token.is_empty() {
            return Err(AuthError::TokenRequired);
        }

        let mut session = self.find_session(&request.refresh_token).await?;

        if !session.is_active() {
            warn!(session_id = %session.id, "refresh rejected: session is not active");
            return Err(AuthError::InvalidToken);
        }

        let refresh_token = self.generate_refresh_secret()?;
        let token_hash = self.hash_refresh_secret(&refresh_token)?;

        let replacement = session
            .rotate(
                token_hash,
                Utc::now() + self.refresh_ttl,
                request.user_agent,
                request.client_addr,
            )
            .map_err(|e| AuthError::internal("rotate session", e))?;

        self.sessions
            .rotate_session(&session, &replacement)
            .await
            .map_err(|e| match e {
                RotationError::Revoke(StoreError::Conflict) => {
                    warn!(session_id = %session.id, "refresh rejected: session rotated concurrently");
                    AuthError::InvalidToken
                }
                RotationError::Revoke(e) => AuthError::internal("update session", e),
                RotationError::Insert(e) => AuthError::internal("save new session", e),
            })?;

        let user = self
            .users
            .get_user_by_id(replacement.user_id)
            .await
            .map_err(|e| AuthError::internal("get user", e))?
            .ok_or(AuthError::UserNotFound)?;

        if !user.can_authenticate() {
            warn!(user_id = %user.id, "refresh rejected: user blocked");
            return Err(AuthError::UserBlocked);
        }

        let access = self.jwt.generate(&AccessClaims::from(&user))?;

        info!(
            user_id = %user.id,
            session_id = %replacement.id,
            previous_session_id = %session.id,
            "session refreshed"
        );

        Ok(TokenPair {
            access_token: access.token,
            refresh_token,
            access_expires_at: access.expires_at,
            refresh_expires_at: replacement.expires_at,
            token_type: "Bearer",
        })
    }

    /// Revoke the session behind a refresh secret. Logging out twice fails.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::TokenRequired);
        }

        let mut session = self.find_session(refresh_token).await?;

        if session.is_expired() || session.is_revoked() {
            return Err(AuthError::InvalidToken);
        }

        session
            .revoke()
            .map_err(|e| AuthError::internal("revoke session", e))?;

        self.sessions
            .update_session(&session)
            .await
            .map_err(|e| match e {
                StoreError::Conflict => AuthError::InvalidToken,
                other => AuthError::internal("update session", other),
            })?;

        info!(user_id = %session.user_id, session_id = %session.id, "user logged out");

        Ok(())
    }

    /// Revoke every active session of a user, returning how many were revoked
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        if user_id.is_nil() {
            return Err(AuthError::UserIdRequired);
        }

        let sessions = self
            .sessions
            .sessions_for_user(user_id)
            .await
            .map_err(|e| AuthError::internal("list sessions", e))?;

        let mut revoked = 0;
        for mut session in sessions.into_iter().filter(Session::is_active) {
            session
                .revoke()
                .map_err(|e| AuthError::internal("revoke session", e))?;

            match self.sessions.update_session(&session).await {
                Ok(()) => revoked += 1,
                // Already revoked by someone else
                Err(StoreError::Conflict) => {}
                Err(e) => return Err(AuthError::internal("update session", e)),
            }
        }

        info!(user_id = %user_id, revoked, "user logged out everywhere");

        Ok(revoked)
    }

    /// Validate a bearer access token
    pub fn authenticate(&self, access_token: &str) -> Result<AccessClaims, AuthError> {
        if access_token.is_empty() {
            return Err(AuthError::TokenRequired);
        }

        Ok(self.jwt.validate(access_token)?)
    }

    async fn find_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let token_hash = self.hash_refresh_secret(refresh_token)?;

        self.sessions
            .get_session_by_token_hash(&token_hash)
            .await
            .map_err(|e| AuthError::internal("get session", e))?
            .ok_or(AuthError::SessionNotFound)
    }

    fn generate_refresh_secret(&self) -> Result<String, AuthError> {
        self.opaque
            .generate()
            .map_err(|e| AuthError::internal("generate refresh token", e))
    }

    fn hash_refresh_secret(&self, refresh_token: &str) -> Result<String, AuthError> {
        self.opaque
            .hash(refresh_token)
            .map_err(|e| AuthError::internal("hash refresh token", e))
    }
}
