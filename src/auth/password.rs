use bcrypt::{hash, verify, BcryptError};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

use crate::error::AppError;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to hash password: {0}")]
    Hashing(String),
    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),
    #[error("entropy source unavailable: {0}")]
    Entropy(String),
}

impl From<CredentialError> for AppError {
    fn from(error: CredentialError) -> AppError {
        AppError::InternalServerError(error.to_string())
    }
}

/// Hashes and checks passwords, and mints the opaque tokens mailed to users.
///
/// The bcrypt cost is injected so tests can run at the minimum cost while
/// production uses `bcrypt::DEFAULT_COST`.
#[derive(Debug, Clone, Copy)]
pub struct CredentialManager {
    cost: u32,
}

impl Default for CredentialManager {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl CredentialManager {
    pub fn with_cost(cost: u32) -> Self {
        Self { cost }
    }

    /// Salted one-way digest. Two calls with the same input give different outputs.
    pub fn hash(&self, plaintext: &str) -> Result<String, CredentialError> {
        hash(plaintext, self.cost).map_err(|e| CredentialError::Hashing(e.to_string()))
    }

    /// `Ok(false)` for a wrong password; an error only when `hashed` is not a bcrypt hash.
    pub fn matches(&self, plaintext: &str, hashed: &str) -> Result<bool, CredentialError> {
        match verify(plaintext, hashed) {
            Ok(matched) => Ok(matched),
            Err(e @ (BcryptError::InvalidHash(_)
            | BcryptError::InvalidPrefix(_)
            | BcryptError::InvalidCost(_))) => Err(CredentialError::MalformedHash(e.to_string())),
            Err(e) => Err(CredentialError::Hashing(e.to_string())),
        }
    }

    /// `length` random bytes from the OS generator, hex encoded (`2 * length` chars).
    pub fn generate_secure_token(length: usize) -> Result<String, CredentialError> {
        let mut bytes = vec![0u8; length];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CredentialError::Entropy(e.to_string()))?;
        Ok(hex::encode(bytes))
    }
}
