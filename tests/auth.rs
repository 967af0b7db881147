mod common;

use actix_cors::Cors;
use actix_web::cookie::Cookie;
use actix_web::http::StatusCode;
use actix_web::middleware::Logger;
use actix_web::{rt, test, web, App, HttpServer};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::net::TcpListener;

use common::*;
use novelism::auth::{AuthMiddleware, AUTH_COOKIE};
use novelism::routes::{self, health};

#[actix_rt::test]
async fn test_sign_up_verify_and_sign_in_flow() {
    let ctx = context();
    let app = init_app(ctx.state.clone()).await;

    let user = sign_up(&app, "integration_user", "Password123!").await;

    // Same username again
    let req = test::TestRequest::post()
        .uri("/api/auth/sign-up")
        .set_json(json!({
            "username": "integration_user",
            "email": "other@example.com",
            "password": "Password123!"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // The sign-up mail carries the stored token
    let token = verification_token(&ctx.state, user.id).await;
    let mail = ctx.mailer.last_to("integration_user@example.com").unwrap();
    assert!(mail.body.contains(&token));

    let req = test::TestRequest::get()
        .uri("/api/auth/me")
        .insert_header(bearer(&user.token))
        .to_request();
    let me: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(me["username"], "integration_user");
    assert_eq!(me["verified"], false);
    assert!(me.get("passwordHash").is_none());

    let req = test::TestRequest::post()
        .uri("/api/auth/verify-email")
        .set_json(json!({ "userId": user.id, "token": "wrong" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/auth/verify-email")
        .set_json(json!({ "userId": user.id, "token": token }))
        .to_request();
    let verified: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(verified["verified"], true);

    // Tokens are single-use
    let req = test::TestRequest::post()
        .uri("/api/auth/verify-email")
        .set_json(json!({ "userId": user.id, "token": token }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/auth/sign-in")
        .set_json(json!({ "username": "integration_user", "password": "WrongPassword" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/api/auth/sign-in")
        .set_json(json!({ "username": "integration_user", "password": "Password123!" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = resp
        .response()
        .cookies()
        .find(|c| c.name() == AUTH_COOKIE)
        .unwrap()
        .into_owned();

    // The cookie alone authenticates
    let req = test::TestRequest::get()
        .uri("/api/auth/me")
        .cookie(Cookie::new(AUTH_COOKIE, cookie.value().to_string()))
        .to_request();
    let me: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(me["verified"], true);
}

#[actix_rt::test]
async fn test_unknown_user_ids_look_like_bad_tokens() {
    let ctx = context();
    let app = init_app(ctx.state.clone()).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/verify-email")
        .set_json(json!({ "userId": 4242, "token": "whatever" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_resend_verification_mail() {
    let ctx = context();
    let app = init_app(ctx.state.clone()).await;
    let user = sign_up(&app, "resender", "Password123!").await;
    let first = verification_token(&ctx.state, user.id).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/resend-verification-mail")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/api/auth/resend-verification-mail")
        .insert_header(bearer(&user.token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let second = verification_token(&ctx.state, user.id).await;
    assert_ne!(first, second);
    assert_eq!(ctx.mailer.sent().len(), 2);

    verify(&app, &ctx.state, user.id).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/resend-verification-mail")
        .insert_header(bearer(&user.token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[actix_rt::test]
async fn test_password_reset_flow() {
    let ctx = context();
    let app = init_app(ctx.state.clone()).await;
    let user = sign_up(&app, "forgetful", "Password123!").await;

    // Known and unknown emails get the same answer
    let req = test::TestRequest::post()
        .uri("/api/auth/forget-password")
        .set_json(json!({ "email": "nobody@example.com" }))
        .to_request();
    let unknown = test::call_service(&app, req).await;
    assert_eq!(unknown.status(), StatusCode::OK);
    let unknown_body = test::read_body(unknown).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/forget-password")
        .set_json(json!({ "email": "forgetful@example.com" }))
        .to_request();
    let known = test::call_service(&app, req).await;
    assert_eq!(known.status(), StatusCode::OK);
    assert_eq!(test::read_body(known).await, unknown_body);

    let token = password_reset_token(&ctx.state, user.id).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/reset-password")
        .set_json(json!({ "userId": user.id, "token": "wrong", "newPassword": "NewPassword456!" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/auth/reset-password")
        .set_json(json!({ "userId": user.id, "token": token, "newPassword": "NewPassword456!" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::post()
        .uri("/api/auth/reset-password")
        .set_json(json!({ "userId": user.id, "token": token, "newPassword": "ThirdPassword789!" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    for (password, expected) in [
        ("Password123!", StatusCode::UNAUTHORIZED),
        ("NewPassword456!", StatusCode::OK),
    ] {
        let req = test::TestRequest::post()
            .uri("/api/auth/sign-in")
            .set_json(json!({ "username": "forgetful", "password": password }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), expected, "signing in with {}", password);
    }
}

#[actix_rt::test]
async fn test_profile_update_and_account_deletion() {
    let ctx = context();
    let app = init_app(ctx.state.clone()).await;
    let user = sign_up(&app, "profiled", "Password123!").await;

    let req = test::TestRequest::patch()
        .uri("/api/auth/me")
        .insert_header(bearer(&user.token))
        .set_json(json!({ "firstName": "Ada", "dateOfBirth": "1990-12-10" }))
        .to_request();
    let updated: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated["firstName"], "Ada");
    assert_eq!(updated["dateOfBirth"], "1990-12-10");

    let req = test::TestRequest::patch()
        .uri("/api/auth/me")
        .insert_header(bearer(&user.token))
        .set_json(json!({ "profilePicture": "not a url" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::delete()
        .uri("/api/auth/me")
        .insert_header(bearer(&user.token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    // The token is still well-formed, but the account behind it is gone
    let req = test::TestRequest::get()
        .uri("/api/auth/me")
        .insert_header(bearer(&user.token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/api/auth/sign-in")
        .set_json(json!({ "username": "profiled", "password": "Password123!" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_refresh_token() {
    let ctx = context_with_refresh();
    let app = init_app(ctx.state.clone()).await;
    sign_up(&app, "refresher", "Password123!").await;

    let req = test::TestRequest::post()
        .uri("/api/auth/sign-in")
        .set_json(json!({ "username": "refresher", "password": "Password123!" }))
        .to_request();
    let signed_in: Value = test::call_and_read_body_json(&app, req).await;
    let refresh = signed_in["refreshToken"]["token"].as_str().unwrap().to_string();
    let access = signed_in["accessToken"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/api/auth/refresh-token")
        .set_json(json!({ "refreshToken": refresh }))
        .to_request();
    let refreshed: Value = test::call_and_read_body_json(&app, req).await;
    assert!(refreshed["accessToken"].is_string());
    assert_eq!(refreshed["user"]["username"], "refresher");

    // Access tokens are signed with a different secret
    let req = test::TestRequest::post()
        .uri("/api/auth/refresh-token")
        .set_json(json!({ "refreshToken": access }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_refresh_disabled() {
    let ctx = context();
    let app = init_app(ctx.state.clone()).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/refresh-token")
        .set_json(json!({ "refreshToken": "anything" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_sign_out_clears_cookie() {
    let ctx = context();
    let app = init_app(ctx.state.clone()).await;

    let req = test::TestRequest::post().uri("/api/auth/sign-out").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let cookie = resp
        .response()
        .cookies()
        .find(|c| c.name() == AUTH_COOKIE)
        .unwrap()
        .into_owned();
    assert_eq!(cookie.value(), "");
    assert_eq!(
        cookie.max_age(),
        Some(actix_web::cookie::time::Duration::ZERO)
    );
}

#[actix_rt::test]
async fn test_malformed_payload_is_a_json_validation_error() {
    let ctx = context();
    let app = init_app(ctx.state.clone()).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/sign-in")
        .set_json(json!({ "password": "Password123!" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());
}

#[actix_rt::test]
async fn test_me_unauthorized_over_http() {
    let ctx = context();
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let state = ctx.state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .service(health::health)
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware::new(state.tokens.clone()))
                    .configure(routes::config),
            )
    })
    .workers(1)
    .listen(listener)
    .expect("Failed to listen")
    .run();
    let handle = server.handle();
    rt::spawn(server);

    let client = reqwest::Client::new();
    let base = format!("http://127.0.0.1:{}", port);

    let health = client
        .get(format!("{}/health", base))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(health.status(), reqwest::StatusCode::OK);

    let resp = client
        .get(format!("{}/api/auth/me", base))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);

    let resp = client
        .get(format!("{}/api/auth/me", base))
        .bearer_auth("not-a-token")
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("malformed"));

    handle.stop(true).await;
}
