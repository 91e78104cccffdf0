//! Authentication
//!
//! - credential verification against bcrypt hashes
//! - short-lived JWT access tokens
//! - opaque, rotating refresh sessions stored by digest
//! - REST endpoints for the session lifecycle

pub mod api;
pub mod error;
pub mod identity;
pub mod jwt;
pub mod opaque;
pub mod password;
pub mod service;
pub mod session;

pub use api::{AuthApiState, auth_api_router};
pub use error::AuthError;
pub use identity::{Email, IdentifierError, IdentityResolver, Username};
pub use jwt::{AccessClaims, JwtConfig, JwtError, JwtService, SignedToken};
pub use opaque::{OpaqueTokenError, OpaqueTokenManager};
pub use password::{PasswordError, PasswordHash, PasswordHasher};
pub use service::{
    AuthService, LoginRequest, LoginResponse, RefreshRequest, RegisterRequest, TokenPair,
};
pub use session::{Session, SessionError};
