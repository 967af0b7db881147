use std::rc::Rc;
use std::sync::Arc;

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};

use super::TokenService;

/// Name of the same-site cookie that carries the access token for browser clients.
pub const AUTH_COOKIE: &str = "novelism_auth";

/// Verifies the bearer token (header first, then the auth cookie) and records the
/// outcome in request extensions: `Claims` on success, `TokenError` on failure.
///
/// Requests are never rejected here. Routes opt into authentication through the
/// `AuthenticatedUser` and `VerifiedUser` extractors, so public routes stay public.
pub struct AuthMiddleware {
    tokens: Arc<TokenService>,
}

impl AuthMiddleware {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
            tokens: Arc::clone(&self.tokens),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    tokens: Arc<TokenService>,
}

fn bearer_token(req: &ServiceRequest) -> Option<String> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());

    header.or_else(|| req.cookie(AUTH_COOKIE).map(|c| c.value().to_string()))
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(token) = bearer_token(&req) {
            match self.tokens.verify_access_token(&token) {
                Ok(claims) => {
                    req.extensions_mut().insert(claims);
                }
                Err(e) => {
                    log::debug!("rejected token on {}: {}", req.path(), e);
                    req.extensions_mut().insert(e);
                }
            }
        }

        let service = Rc::clone(&self.service);
        Box::pin(async move { service.call(req).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Claims, TokenError};
    use crate::config::TokenSettings;
    use actix_web::{cookie::Cookie, test, web, App, HttpRequest, HttpResponse};

    fn tokens() -> Arc<TokenService> {
        Arc::new(TokenService::new(
            &TokenSettings {
                secret: "middleware-secret".into(),
                duration: chrono::Duration::minutes(5),
            },
            None,
        ))
    }

    async fn describe(req: HttpRequest) -> HttpResponse {
        let extensions = req.extensions();
        let body = match (extensions.get::<Claims>(), extensions.get::<TokenError>()) {
            (Some(claims), _) => format!("user {}", claims.sub),
            (None, Some(error)) => format!("error {}", error),
            (None, None) => "anonymous".to_string(),
        };
        HttpResponse::Ok().body(body)
    }

    #[actix_rt::test]
    async fn test_token_sources() {
        let tokens = tokens();
        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(tokens.clone()))
                .route("/", web::get().to(describe)),
        )
        .await;
        let signed = tokens.sign_access_token(12).unwrap();

        let anonymous = test::call_and_read_body(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(anonymous, "anonymous");

        let header = test::TestRequest::get()
            .uri("/")
            .insert_header((AUTHORIZATION, format!("Bearer {}", signed.token)))
            .to_request();
        assert_eq!(test::call_and_read_body(&app, header).await, "user 12");

        let cookie = test::TestRequest::get()
            .uri("/")
            .cookie(Cookie::new(AUTH_COOKIE, signed.token.clone()))
            .to_request();
        assert_eq!(test::call_and_read_body(&app, cookie).await, "user 12");

        let garbage = test::TestRequest::get()
            .uri("/")
            .insert_header((AUTHORIZATION, "Bearer garbage"))
            .to_request();
        let body = test::call_and_read_body(&app, garbage).await;
        assert!(body.starts_with(b"error"));
    }
}
