//! Caller-facing error taxonomy
//!
//! Every failure leaving the auth core is an [`AuthError`]. Each variant
//! carries a stable machine code and an HTTP status hint. Internal failures
//! keep their cause for operators but never show it to callers.

use axum::http::StatusCode;

use crate::core::auth::jwt::JwtError;
use crate::core::ratelimit::limiter::RateLimitExceeded;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User is blocked")]
    UserBlocked,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token is required")]
    TokenRequired,

    #[error("User id is required")]
    UserIdRequired,

    #[error("{0}")]
    InvalidParameter(String),

    #[error("Username already taken")]
    UsernameTaken,

    #[error("Email already registered")]
    EmailTaken,

    #[error("User not found")]
    UserNotFound,

    #[error("Too many requests")]
    TooManyRequests { retry_after_secs: u64 },

    #[error("Operation failed")]
    Internal {
        operation: &'static str,
        #[source]
        source: BoxError,
    },
}

impl AuthError {
    /// Wrap an unexpected failure, recording which operation failed.
    pub fn internal(operation: &'static str, source: impl Into<BoxError>) -> Self {
        let source = source.into();
        tracing::warn!(operation, error = %source, "internal failure");
        AuthError::Internal { operation, source }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::UserBlocked => "USER_BLOCKED",
            AuthError::SessionNotFound => "SESSION_NOT_FOUND",
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::TokenRequired => "TOKEN_REQUIRED",
            AuthError::UserIdRequired => "USER_ID_REQUIRED",
            AuthError::InvalidParameter(_) => "INVALID_PARAMETER",
            AuthError::UsernameTaken => "USERNAME_TAKEN",
            AuthError::EmailTaken => "EMAIL_TAKEN",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::TooManyRequests { .. } => "TOO_MANY_REQUESTS",
            AuthError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials | AuthError::InvalidToken | AuthError::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::UserBlocked => StatusCode::FORBIDDEN,
            AuthError::SessionNotFound | AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::TokenRequired
            | AuthError::UserIdRequired
            | AuthError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            AuthError::UsernameTaken | AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Operation name for internal failures
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            AuthError::Internal { operation, .. } => Some(*operation),
            _ => None,
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::TokenExpired,
            JwtError::InvalidToken => AuthError::InvalidToken,
            _ => AuthError::internal("generate access token", err),
        }
    }
}

impl From<RateLimitExceeded> for AuthError {
    fn from(err: RateLimitExceeded) -> Self {
        AuthError::TooManyRequests {
            retry_after_secs: err.retry_after.as_secs().max(1),
        }
    }
}
