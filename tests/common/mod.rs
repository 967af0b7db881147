//! Shared helpers for the HTTP-level tests.
//!
//! Every test builds its own app over fresh in-memory stores, so tests never
//! share accounts and need no database.

#![allow(dead_code)]

use std::sync::Arc;

use actix_http::Request;
use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::{header, StatusCode};
use actix_web::middleware::Logger;
use actix_web::{test, web, App};
use serde_json::{json, Value};

use novelism::auth::{AuthMiddleware, CredentialManager, TokenService};
use novelism::config::TokenSettings;
use novelism::mailer::MemoryMailer;
use novelism::routes::{self, health};
use novelism::state::{AppState, Stores};
use novelism::store::UserStore;

pub struct TestContext {
    pub state: web::Data<AppState>,
    pub mailer: Arc<MemoryMailer>,
}

fn token_settings(secret: &str) -> TokenSettings {
    TokenSettings {
        secret: secret.to_string(),
        duration: chrono::Duration::minutes(15),
    }
}

fn context_with(refresh: bool) -> TestContext {
    let refresh_settings = token_settings("integration-refresh-secret");
    let tokens = TokenService::new(
        &token_settings("integration-access-secret"),
        refresh.then_some(&refresh_settings),
    );
    let mailer = Arc::new(MemoryMailer::default());
    let state = AppState::new(
        Stores::in_memory(),
        Arc::new(tokens),
        mailer.clone(),
        CredentialManager::with_cost(4),
        "http://localhost:3000",
        false,
    );
    TestContext {
        state: web::Data::new(state),
        mailer,
    }
}

pub fn context() -> TestContext {
    context_with(false)
}

pub fn context_with_refresh() -> TestContext {
    context_with(true)
}

pub async fn init_app(
    state: web::Data<AppState>,
) -> impl Service<Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error> {
    let tokens = state.tokens.clone();
    test::init_service(
        App::new()
            .app_data(state)
            .wrap(Logger::default())
            .service(health::health)
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware::new(tokens))
                    .configure(routes::config),
            ),
    )
    .await
}

pub fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {}", token))
}

pub struct TestUser {
    pub id: i64,
    pub token: String,
}

pub async fn sign_up(
    app: &impl Service<Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error>,
    username: &str,
    password: &str,
) -> TestUser {
    let req = test::TestRequest::post()
        .uri("/api/auth/sign-up")
        .set_json(json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": password
        }))
        .to_request();
    let resp = test::call_service(app, req).await;
    let status = resp.status();
    let body = test::read_body(resp).await;
    assert_eq!(
        status,
        StatusCode::CREATED,
        "Sign-up failed. Body: {:?}",
        String::from_utf8_lossy(&body)
    );

    let json: Value = serde_json::from_slice(&body).unwrap();
    TestUser {
        id: json["user"]["id"].as_i64().unwrap(),
        token: json["accessToken"].as_str().unwrap().to_string(),
    }
}

/// The verification token currently stored for `user_id`.
pub async fn verification_token(state: &AppState, user_id: i64) -> String {
    state
        .users
        .get(user_id)
        .await
        .unwrap()
        .verification_token
        .expect("no verification token pending")
}

pub async fn password_reset_token(state: &AppState, user_id: i64) -> String {
    state
        .users
        .get(user_id)
        .await
        .unwrap()
        .password_reset_token
        .expect("no password reset pending")
}

pub async fn verify(
    app: &impl Service<Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error>,
    state: &AppState,
    user_id: i64,
) {
    let token = verification_token(state, user_id).await;
    let req = test::TestRequest::post()
        .uri("/api/auth/verify-email")
        .set_json(json!({ "userId": user_id, "token": token }))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

/// Signs up and verifies a user in one go.
pub async fn verified_user(
    app: &impl Service<Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error>,
    state: &AppState,
    username: &str,
) -> TestUser {
    let user = sign_up(app, username, "Password123!").await;
    verify(app, state, user.id).await;
    user
}
