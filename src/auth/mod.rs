pub mod extractors;
pub mod guard;
pub mod middleware;
pub mod password;
pub mod reset;
pub mod token;
pub mod verification;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::error::AppError;
use crate::models::User;

// Re-export necessary items
pub use extractors::{AuthenticatedUser, VerifiedUser};
pub use guard::AuthGuard;
pub use middleware::{AuthMiddleware, AUTH_COOKIE};
pub use password::{CredentialError, CredentialManager};
pub use reset::PasswordResetWorkflow;
pub use token::{Claims, SignedToken, TokenError, TokenService};
pub use verification::VerificationWorkflow;

/// Length in bytes of the tokens mailed for verification and password reset.
pub const MAIL_TOKEN_BYTES: usize = 32;

lazy_static! {
    // Regex for username validation: alphanumeric, underscores, hyphens
    static ref USERNAME_REGEX: regex::Regex = regex::Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

/// Failures of the verification and password-reset state machines.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("account is already verified")]
    AlreadyVerified,
    #[error("account is not active")]
    InvalidStatus,
    #[error("invalid or expired token")]
    TokenMismatch,
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<WorkflowError> for AppError {
    fn from(error: WorkflowError) -> AppError {
        match error {
            WorkflowError::AlreadyVerified => AppError::Conflict(error.to_string()),
            WorkflowError::InvalidStatus => AppError::Forbidden(error.to_string()),
            WorkflowError::TokenMismatch => AppError::Validation(error.to_string()),
            WorkflowError::Credential(e) => e.into(),
            WorkflowError::Store(e) => e,
        }
    }
}

/// Payload for `POST /auth/sign-in`.
#[derive(Debug, Deserialize, Validate)]
pub struct SignInRequest {
    #[validate(length(min = 1, max = 32))]
    pub username: String,
    /// Only checked for presence; the strength rules apply at sign-up.
    #[validate(length(min = 1, max = 72))]
    pub password: String,
}

/// Payload for `POST /auth/sign-up`.
#[derive(Debug, Deserialize, Validate)]
pub struct SignUpRequest {
    /// Desired username for the new account.
    /// Must be between 3 and 32 characters, alphanumeric, and can include underscores or hyphens.
    #[validate(
        length(min = 3, max = 32),
        regex(
            path = "USERNAME_REGEX",
            message = "Username must be alphanumeric, underscores, or hyphens"
        )
    )]
    pub username: String,
    #[validate(email)]
    pub email: String,
    /// Between 8 and 72 characters (bcrypt ignores anything past 72 bytes).
    #[validate(length(min = 8, max = 72))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailRequest {
    #[validate(range(min = 1))]
    pub user_id: i64,
    #[validate(length(min = 1, max = 128))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgetPasswordRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(range(min = 1))]
    pub user_id: i64,
    #[validate(length(min = 1, max = 128))]
    pub token: String,
    #[validate(length(min = 8, max = 72))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

/// Response structure after successful authentication (sign-in, sign-up or refresh).
/// The access token is also set as the `novelism_auth` cookie.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<SignedToken>,
    pub user: User,
}

/// Plain acknowledgement body for endpoints with nothing else to return.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
