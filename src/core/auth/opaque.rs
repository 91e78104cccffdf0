//! Opaque refresh secrets
//!
//! Refresh secrets are random bytes from the OS generator, encoded as
//! unpadded URL-safe base64. Only their SHA-256 digest is ever persisted.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

/// Minimum (and default) entropy of a generated secret, in bytes
pub const DEFAULT_TOKEN_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum OpaqueTokenError {
    #[error("token is required")]
    TokenRequired,

    #[error("entropy source failed: {0}")]
    Entropy(String),
}

/// Generates and digests refresh secrets
#[derive(Debug, Clone, Copy)]
pub struct OpaqueTokenManager {
    length: usize,
}

impl OpaqueTokenManager {
    /// Lengths below [`DEFAULT_TOKEN_BYTES`] are raised to it
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(DEFAULT_TOKEN_BYTES),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn generate(&self) -> Result<String, OpaqueTokenError> {
        let mut bytes = vec![0u8; self.length];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| OpaqueTokenError::Entropy(e.to_string()))?;

        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Hex SHA-256 digest used as the lookup key in storage
    pub fn hash(&self, token: &str) -> Result<String, OpaqueTokenError> {
        if token.is_empty() {
            return Err(OpaqueTokenError::TokenRequired);
        }

        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}

impl Default for OpaqueTokenManager {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_BYTES)
    }
}
