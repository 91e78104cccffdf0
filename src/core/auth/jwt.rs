//! JWT utilities for access token generation and validation
//!
//! Access tokens are short-lived HMAC-signed JWTs carrying the user id and
//! role. They are self-contained and never persisted. Validation accepts the
//! HMAC family only and applies no clock leeway.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::db::models::{Role, User};

/// Default access token lifetime (15 minutes)
pub const ACCESS_TOKEN_EXPIRATION_MINUTES: i64 = 15;

/// Default token issuer
pub const DEFAULT_ISSUER: &str = "gatekeeper";

const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret key for signing tokens
    pub secret: String,
    /// Access token expiration in minutes
    pub access_token_expiration_minutes: i64,
    /// Token issuer
    pub issuer: String,
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_token_expiration_minutes: ACCESS_TOKEN_EXPIRATION_MINUTES,
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }

    /// Set access token expiration
    pub fn access_token_expiration(mut self, minutes: i64) -> Self {
        self.access_token_expiration_minutes = minutes;
        self
    }

    /// Set issuer
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"*****")
            .field(
                "access_token_expiration_minutes",
                &self.access_token_expiration_minutes,
            )
            .field("issuer", &self.issuer)
            .finish()
    }
}

/// JWT errors
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT secret is required")]
    SecretRequired,

    #[error("access token TTL must be positive")]
    AccessTtlRequired,

    #[error("Token encoding failed: {0}")]
    EncodingError(String),

    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    InvalidToken,
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            _ => JwtError::InvalidToken,
        }
    }
}

/// Identity and role proven by a valid access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessClaims {
    pub user_id: Uuid,
    pub role: Role,
}

impl From<&User> for AccessClaims {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            role: user.role,
        }
    }
}

/// Wire form of the JWT payload
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Subject (user ID)
    sub: String,
    role: String,
    iss: String,
    iat: i64,
    nbf: i64,
    exp: i64,
    /// JWT ID (unique identifier for this token)
    jti: String,
}

/// A freshly signed access token
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// JWT service for token operations
#[derive(Clone)]
pub struct JwtService {
    issuer: String,
    access_ttl: Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Result<Self, JwtError> {
        if config.secret.is_empty() {
            return Err(JwtError::SecretRequired);
        }

        if config.access_token_expiration_minutes <= 0 {
            return Err(JwtError::AccessTtlRequired);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = HMAC_ALGORITHMS.to_vec();
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "nbf", "iat", "iss", "sub"]);
        validation.validate_nbf = true;
        // Set leeway to 0 for strict expiration checking
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_ttl: Duration::minutes(config.access_token_expiration_minutes),
            issuer: config.issuer,
            validation,
        })
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Sign an access token valid from now until now + access TTL
    pub fn generate(&self, claims: &AccessClaims) -> Result<SignedToken, JwtError> {
        let now = Utc::now();
        // `exp` has whole-second resolution; report exactly what was signed
        let expires_at = DateTime::from_timestamp((now + self.access_ttl).timestamp(), 0)
            .ok_or_else(|| JwtError::EncodingError("expiry out of range".to_string()))?;

        let claims = Claims {
            sub: claims.user_id.to_string(),
            role: claims.role.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingError(e.to_string()))?;

        Ok(SignedToken { token, expires_at })
    }

    /// Verify signature, algorithm, issuer and time claims. Pure, no I/O.
    pub fn validate(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;

        let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| JwtError::InvalidToken)?;
        let role = data
            .claims
            .role
            .parse::<Role>()
            .map_err(|_| JwtError::InvalidToken)?;

        Ok(AccessClaims { user_id, role })
    }
}
