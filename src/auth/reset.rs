//! Password reset.
//!
//! `request` stores a single-use reset token on the account behind an email
//! address and mails it; `complete` trades the token for a new password. The
//! responses never reveal whether an email or user id belongs to an account.

use std::sync::Arc;

use super::{CredentialManager, WorkflowError, MAIL_TOKEN_BYTES};
use crate::error::AppError;
use crate::mailer::{Mail, Mailer};
use crate::models::User;
use crate::store::UserStore;

pub struct PasswordResetWorkflow {
    users: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    credentials: CredentialManager,
    base_url: String,
}

impl PasswordResetWorkflow {
    pub fn new(
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        credentials: CredentialManager,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            users,
            mailer,
            credentials,
            base_url: base_url.into(),
        }
    }

    /// Succeeds whether or not `email` belongs to an active account.
    pub async fn request(&self, email: &str) -> Result<(), WorkflowError> {
        let user = match self.users.get_by_email(email).await {
            Ok(user) => user,
            Err(AppError::NotFound(_)) => {
                log::info!("password reset requested for an unknown email");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let token = CredentialManager::generate_secure_token(MAIL_TOKEN_BYTES)?;
        self.users.set_password_reset_token(user.id, &token).await?;
        log::info!("password reset token issued for user {}", user.id);

        let mail = Mail::password_reset(&user.email, &self.base_url, user.id, &token);
        if let Err(e) = self.mailer.send(mail).await {
            log::error!("could not send password reset mail to user {}: {}", user.id, e);
        }
        Ok(())
    }

    /// Replaces the password if `token` is the outstanding reset token of an
    /// active account. Every other case is a `TokenMismatch`.
    pub async fn complete(
        &self,
        user_id: i64,
        token: &str,
        new_password: &str,
    ) -> Result<User, WorkflowError> {
        let user = match self.users.get(user_id).await {
            Ok(user) => user,
            Err(AppError::NotFound(_)) => return Err(WorkflowError::TokenMismatch),
            Err(e) => return Err(e.into()),
        };
        if !user.is_active() || user.password_reset_token.as_deref() != Some(token) {
            log::warn!("rejected password reset for user {}", user_id);
            return Err(WorkflowError::TokenMismatch);
        }

        let password_hash = self.credentials.hash(new_password)?;
        match self
            .users
            .consume_password_reset_token(user_id, token, &password_hash)
            .await?
        {
            Some(user) => {
                log::info!("user {} reset their password", user_id);
                Ok(user)
            }
            None => Err(WorkflowError::TokenMismatch),
        }
    }
}
