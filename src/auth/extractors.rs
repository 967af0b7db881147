use std::ops::Deref;

use actix_web::dev::Payload;
use actix_web::{web, Error as ActixError, FromRequest, HttpMessage, HttpRequest};
use futures::future::LocalBoxFuture;

use super::{AuthGuard, Claims, TokenError};
use crate::error::AppError;
use crate::models::User;
use crate::state::AppState;

/// The active account behind the request's token.
///
/// Relies on `AuthMiddleware` having verified the token; a request without
/// claims (no token, or a token that failed verification) is `Unauthorized`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// An authenticated account that has also confirmed its email address.
/// Unverified accounts are `Forbidden`.
#[derive(Debug, Clone)]
pub struct VerifiedUser(pub User);

impl Deref for AuthenticatedUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

impl Deref for VerifiedUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

fn claims_from(req: &HttpRequest) -> Result<Claims, AppError> {
    let extensions = req.extensions();
    if let Some(claims) = extensions.get::<Claims>() {
        return Ok(claims.clone());
    }
    match extensions.get::<TokenError>() {
        Some(error) => Err(error.clone().into()),
        None => Err(AppError::Unauthorized("missing authentication token".into())),
    }
}

fn guard_from(req: &HttpRequest) -> Result<AuthGuard, AppError> {
    req.app_data::<web::Data<AppState>>()
        .map(|state| state.guard.clone())
        .ok_or_else(|| AppError::InternalServerError("application state is not configured".into()))
}

impl FromRequest for AuthenticatedUser {
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let lookup = claims_from(req).and_then(|claims| Ok((claims, guard_from(req)?)));
        Box::pin(async move {
            let (claims, guard) = lookup?;
            let user = guard.resolve(&claims).await?;
            Ok(AuthenticatedUser(user))
        })
    }
}

impl FromRequest for VerifiedUser {
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let authenticated = AuthenticatedUser::from_request(req, payload);
        Box::pin(async move {
            let AuthenticatedUser(user) = authenticated.await?;
            AuthGuard::require_verified(&user)?;
            Ok(VerifiedUser(user))
        })
    }
}
