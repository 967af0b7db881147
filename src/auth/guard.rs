use std::sync::Arc;

use super::{Claims, TokenService};
use crate::error::AppError;
use crate::models::User;
use crate::store::UserStore;

/// Turns bearer tokens into users and applies the per-route gates.
#[derive(Clone)]
pub struct AuthGuard {
    tokens: Arc<TokenService>,
    users: Arc<dyn UserStore>,
}

impl AuthGuard {
    pub fn new(tokens: Arc<TokenService>, users: Arc<dyn UserStore>) -> Self {
        Self { tokens, users }
    }

    pub async fn authenticate(&self, token: &str) -> Result<User, AppError> {
        let claims = self.tokens.verify_access_token(token)?;
        self.resolve(&claims).await
    }

    /// Loads the account named by already-verified claims. Missing and deleted
    /// accounts are `Unauthorized`.
    pub async fn resolve(&self, claims: &Claims) -> Result<User, AppError> {
        match self.users.get(claims.sub).await {
            Ok(user) if user.is_active() => Ok(user),
            Ok(_) | Err(AppError::NotFound(_)) => {
                log::warn!("token presented for missing or deleted user {}", claims.sub);
                Err(AppError::Unauthorized("account no longer exists".into()))
            }
            Err(e) => Err(e),
        }
    }

    pub fn require_verified(user: &User) -> Result<(), AppError> {
        if user.verified {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "verify your email address before doing this".into(),
            ))
        }
    }

    pub fn ensure_owner(owner_id: i64, caller: &User) -> Result<(), AppError> {
        if owner_id == caller.id {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "you do not have permission to modify this resource".into(),
            ))
        }
    }
}
