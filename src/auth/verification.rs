//! Email verification.
//!
//! An account starts unverified. `issue` moves it to pending by storing a fresh
//! single-use token and mailing it; `confirm` consumes that token and marks the
//! account verified. Issuing again replaces any outstanding token.

use std::sync::Arc;

use super::{CredentialManager, WorkflowError, MAIL_TOKEN_BYTES};
use crate::error::AppError;
use crate::mailer::{Mail, Mailer};
use crate::models::User;
use crate::store::UserStore;

pub struct VerificationWorkflow {
    users: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    base_url: String,
}

impl VerificationWorkflow {
    pub fn new(
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            users,
            mailer,
            base_url: base_url.into(),
        }
    }

    /// Stores a new verification token for `user` and mails it.
    ///
    /// Delivery failures are logged and do not fail the call; the user can ask
    /// for the mail again.
    pub async fn issue(&self, user: &User) -> Result<(), WorkflowError> {
        if user.verified {
            return Err(WorkflowError::AlreadyVerified);
        }
        if !user.is_active() {
            return Err(WorkflowError::InvalidStatus);
        }

        let token = CredentialManager::generate_secure_token(MAIL_TOKEN_BYTES)?;
        self.users.set_verification_token(user.id, &token).await?;
        log::info!("verification token issued for user {}", user.id);

        let mail = Mail::verification(&user.email, &self.base_url, user.id, &token);
        if let Err(e) = self.mailer.send(mail).await {
            log::error!("could not send verification mail to user {}: {}", user.id, e);
        }
        Ok(())
    }

    /// Consumes `submitted` and marks the account verified.
    pub async fn confirm(&self, user: &User, submitted: &str) -> Result<User, WorkflowError> {
        if !user.is_active() {
            return Err(WorkflowError::InvalidStatus);
        }
        if user.verification_token.as_deref() != Some(submitted) {
            log::warn!("verification token mismatch for user {}", user.id);
            return Err(WorkflowError::TokenMismatch);
        }

        // The conditional update is the source of truth: a concurrent confirm
        // may already have consumed the token.
        match self.users.consume_verification_token(user.id, submitted).await? {
            Some(verified) => {
                log::info!("user {} verified their email", user.id);
                Ok(verified)
            }
            None => {
                log::warn!("verification token for user {} was already consumed", user.id);
                Err(WorkflowError::TokenMismatch)
            }
        }
    }

    /// Looks the user up by id before confirming. An unknown id is reported the
    /// same way as a wrong token.
    pub async fn confirm_by_id(&self, user_id: i64, submitted: &str) -> Result<User, WorkflowError> {
        let user = match self.users.get(user_id).await {
            Ok(user) => user,
            Err(AppError::NotFound(_)) => return Err(WorkflowError::TokenMismatch),
            Err(e) => return Err(e.into()),
        };
        self.confirm(&user, submitted).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::MemoryMailer;
    use crate::models::NewUser;
    use crate::store::memory::MemoryUserStore;
    use pretty_assertions::assert_eq;

    struct Fixture {
        users: Arc<MemoryUserStore>,
        mailer: Arc<MemoryMailer>,
        workflow: VerificationWorkflow,
    }

    fn fixture() -> Fixture {
        let users = Arc::new(MemoryUserStore::default());
        let mailer = Arc::new(MemoryMailer::default());
        let workflow = VerificationWorkflow::new(users.clone(), mailer.clone(), "http://localhost");
        Fixture {
            users,
            mailer,
            workflow,
        }
    }

    async fn sign_up(users: &MemoryUserStore, name: &str) -> User {
        users
            .insert(NewUser {
                username: name.into(),
                email: format!("{}@example.com", name),
                password_hash: "hash".into(),
            })
            .await
            .unwrap()
    }

    #[actix_rt::test]
    async fn test_issue_and_confirm() {
        let f = fixture();
        let user = sign_up(&f.users, "reader").await;

        f.workflow.issue(&user).await.unwrap();

        let pending = f.users.get(user.id).await.unwrap();
        let token = pending.verification_token.clone().unwrap();
        assert_eq!(token.len(), MAIL_TOKEN_BYTES * 2);
        assert!(f.mailer.last_to("reader@example.com").unwrap().body.contains(&token));

        let verified = f.workflow.confirm(&pending, &token).await.unwrap();
        assert!(verified.verified);
        assert!(verified.verification_token.is_none());
    }

    #[actix_rt::test]
    async fn test_issue_rejects_verified_users() {
        let f = fixture();
        let mut user = sign_up(&f.users, "reader").await;
        user.verified = true;

        assert!(matches!(
            f.workflow.issue(&user).await,
            Err(WorkflowError::AlreadyVerified)
        ));
        assert!(f.mailer.sent().is_empty());
    }

    #[actix_rt::test]
    async fn test_wrong_token_is_a_mismatch() {
        let f = fixture();
        let user = sign_up(&f.users, "reader").await;
        f.workflow.issue(&user).await.unwrap();
        let pending = f.users.get(user.id).await.unwrap();

        assert!(matches!(
            f.workflow.confirm(&pending, "not-the-token").await,
            Err(WorkflowError::TokenMismatch)
        ));
        assert!(!f.users.get(user.id).await.unwrap().verified);
    }

    #[actix_rt::test]
    async fn test_token_is_single_use() {
        let f = fixture();
        let user = sign_up(&f.users, "reader").await;
        f.workflow.issue(&user).await.unwrap();
        let stale = f.users.get(user.id).await.unwrap();
        let token = stale.verification_token.clone().unwrap();

        f.workflow.confirm(&stale, &token).await.unwrap();

        // `stale` still carries the token, so only the conditional update can refuse it.
        assert!(matches!(
            f.workflow.confirm(&stale, &token).await,
            Err(WorkflowError::TokenMismatch)
        ));
    }

    #[actix_rt::test]
    async fn test_reissue_replaces_token() {
        let f = fixture();
        let user = sign_up(&f.users, "reader").await;
        f.workflow.issue(&user).await.unwrap();
        let first = f.users.get(user.id).await.unwrap().verification_token.unwrap();
        f.workflow.issue(&user).await.unwrap();
        let current = f.users.get(user.id).await.unwrap();

        assert!(matches!(
            f.workflow.confirm(&current, &first).await,
            Err(WorkflowError::TokenMismatch)
        ));
    }

    #[actix_rt::test]
    async fn test_inactive_and_unknown_users() {
        let f = fixture();
        let user = sign_up(&f.users, "reader").await;
        f.workflow.issue(&user).await.unwrap();
        let token = f.users.get(user.id).await.unwrap().verification_token.unwrap();
        f.users.delete(user.id).await.unwrap();

        assert!(matches!(
            f.workflow.confirm_by_id(user.id, &token).await,
            Err(WorkflowError::InvalidStatus)
        ));
        assert!(matches!(
            f.workflow.confirm_by_id(999, &token).await,
            Err(WorkflowError::TokenMismatch)
        ));
    }

    #[actix_rt::test]
    async fn test_mail_failure_does_not_fail_issue() {
        let f = fixture();
        let user = sign_up(&f.users, "reader").await;
        f.mailer.set_failing(true);

        f.workflow.issue(&user).await.unwrap();
        assert!(f.users.get(user.id).await.unwrap().verification_token.is_some());
    }
}
