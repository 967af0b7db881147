use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::TokenSettings;
use crate::error::AppError;

/// Represents the claims encoded within a JWT (JSON Web Token).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject of the token, the user's identifier.
    pub sub: i64,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: i64,
    /// Expiration timestamp (seconds since epoch) for the token.
    pub exp: i64,
}

/// A freshly signed token and the instant it stops being valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token is malformed: {0}")]
    Malformed(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
    #[error("refresh tokens are not enabled")]
    RefreshDisabled,
}

impl From<TokenError> for AppError {
    fn from(error: TokenError) -> AppError {
        match error {
            TokenError::Signing(_) => AppError::InternalServerError(error.to_string()),
            TokenError::RefreshDisabled => AppError::NotFound(error.to_string()),
            _ => AppError::Unauthorized(error.to_string()),
        }
    }
}

/// Keys and lifetime for one kind of token (access or refresh).
struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    duration: Duration,
}

impl TokenKeys {
    fn new(settings: &TokenSettings) -> Self {
        Self {
            encoding: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding: DecodingKey::from_secret(settings.secret.as_bytes()),
            duration: settings.duration,
        }
    }

    fn sign(&self, user_id: i64) -> Result<SignedToken, TokenError> {
        let now = Utc::now();
        let expires_at = now + self.duration;
        let claims = Claims {
            sub: user_id,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(SignedToken { token, expires_at })
    }

    fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::InvalidSignature
                }
                _ => TokenError::Malformed(e.to_string()),
            })
    }
}

/// Signs and verifies bearer tokens.
///
/// Built once at startup from configuration and shared behind an `Arc`. There is no
/// revocation list: a token stays valid until its `exp` claim passes.
pub struct TokenService {
    access: TokenKeys,
    refresh: Option<TokenKeys>,
}

impl TokenService {
    pub fn new(access: &TokenSettings, refresh: Option<&TokenSettings>) -> Self {
        Self {
            access: TokenKeys::new(access),
            refresh: refresh.map(TokenKeys::new),
        }
    }

    pub fn sign_access_token(&self, user_id: i64) -> Result<SignedToken, TokenError> {
        self.access.sign(user_id)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.access.verify(token)
    }

    pub fn refresh_enabled(&self) -> bool {
        self.refresh.is_some()
    }

    pub fn sign_refresh_token(&self, user_id: i64) -> Result<SignedToken, TokenError> {
        self.refresh
            .as_ref()
            .ok_or(TokenError::RefreshDisabled)?
            .sign(user_id)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.refresh
            .as_ref()
            .ok_or(TokenError::RefreshDisabled)?
            .verify(token)
    }
}
