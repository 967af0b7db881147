use crate::{
    auth::{
        AuthResponse, AuthenticatedUser, ForgetPasswordRequest, MessageResponse, RefreshRequest,
        ResetPasswordRequest, SignInRequest, SignUpRequest, VerifyEmailRequest, AUTH_COOKIE,
    },
    error::AppError,
    models::{NewUser, ProfileUpdate, User},
    state::AppState,
};
use actix_web::{
    cookie::{time::Duration as CookieDuration, Cookie, SameSite},
    delete, get,
    http::StatusCode,
    patch, post, web, HttpResponse, Responder,
};
use chrono::Utc;
use validator::Validate;

fn auth_cookie(state: &AppState, token: &str, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build(AUTH_COOKIE, token.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(state.cookie_secure)
        .max_age(CookieDuration::seconds(max_age_secs.max(0)))
        .finish()
}

/// Signs fresh tokens for `user` and sets the access token cookie.
fn auth_response(state: &AppState, user: User, status: StatusCode) -> Result<HttpResponse, AppError> {
    let access = state.tokens.sign_access_token(user.id)?;
    let refresh = if state.tokens.refresh_enabled() {
        Some(state.tokens.sign_refresh_token(user.id)?)
    } else {
        None
    };
    let cookie = auth_cookie(
        state,
        &access.token,
        (access.expires_at - Utc::now()).num_seconds(),
    );

    Ok(HttpResponse::build(status).cookie(cookie).json(AuthResponse {
        access_token: access.token,
        expires_at: access.expires_at,
        refresh_token: refresh,
        user,
    }))
}

/// Register a new user
///
/// Creates an unverified account, mails a verification token and returns an
/// access token for the new account.
///
/// ## Responses:
/// - `201 Created`: `AuthResponse` with the new user.
/// - `400 Bad Request`: invalid username, email or password.
/// - `409 Conflict`: username or email already registered.
#[post("/sign-up")]
pub async fn sign_up(
    state: web::Data<AppState>,
    payload: web::Json<SignUpRequest>,
) -> Result<impl Responder, AppError> {
    payload.validate()?;
    let payload = payload.into_inner();

    let password_hash = state.credentials.hash(&payload.password)?;
    let user = state
        .users
        .insert(NewUser {
            username: payload.username,
            email: payload.email,
            password_hash,
        })
        .await?;
    log::info!("user {} signed up", user.id);

    state.verification.issue(&user).await?;

    auth_response(&state, user, StatusCode::CREATED)
}

/// Authenticate with username and password.
///
/// Unknown usernames, deleted accounts and wrong passwords all answer the same
/// `401 Unauthorized`.
#[post("/sign-in")]
pub async fn sign_in(
    state: web::Data<AppState>,
    payload: web::Json<SignInRequest>,
) -> Result<impl Responder, AppError> {
    payload.validate()?;

    let user = match state.users.get_by_username(&payload.username).await {
        Ok(user) => user,
        Err(AppError::NotFound(_)) => return Err(AppError::InvalidCredentials),
        Err(e) => return Err(e),
    };
    if !state.credentials.matches(&payload.password, &user.password_hash)? {
        log::warn!("failed sign-in for user {}", user.id);
        return Err(AppError::InvalidCredentials);
    }

    auth_response(&state, user, StatusCode::OK)
}

/// Exchange a refresh token for a new access token.
///
/// ## Responses:
/// - `200 OK`: `AuthResponse`.
/// - `401 Unauthorized`: refresh token invalid or expired, or the account is gone.
/// - `404 Not Found`: refresh tokens are not enabled on this server.
#[post("/refresh-token")]
pub async fn refresh_token(
    state: web::Data<AppState>,
    payload: web::Json<RefreshRequest>,
) -> Result<impl Responder, AppError> {
    payload.validate()?;

    let claims = state.tokens.verify_refresh_token(&payload.refresh_token)?;
    let user = state.guard.resolve(&claims).await?;

    auth_response(&state, user, StatusCode::OK)
}

/// Clears the auth cookie. Tokens stay valid until they expire.
#[post("/sign-out")]
pub async fn sign_out(state: web::Data<AppState>) -> impl Responder {
    let mut cookie = auth_cookie(&state, "", 0);
    cookie.make_removal();
    HttpResponse::Ok()
        .cookie(cookie)
        .json(MessageResponse::new("signed out"))
}

/// Confirm an email address with the mailed token.
///
/// ## Responses:
/// - `200 OK`: the now verified user.
/// - `400 Bad Request`: unknown user, wrong or already used token.
/// - `403 Forbidden`: the account is not active.
#[post("/verify-email")]
pub async fn verify_email(
    state: web::Data<AppState>,
    payload: web::Json<VerifyEmailRequest>,
) -> Result<impl Responder, AppError> {
    payload.validate()?;

    let user = state
        .verification
        .confirm_by_id(payload.user_id, &payload.token)
        .await?;
    Ok(HttpResponse::Ok().json(user))
}

/// Issue a new verification token to the signed-in user, replacing any
/// outstanding one.
///
/// ## Responses:
/// - `200 OK`: mail queued.
/// - `401 Unauthorized`: not signed in.
/// - `409 Conflict`: already verified.
#[post("/resend-verification-mail")]
pub async fn resend_verification_mail(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    state.verification.issue(&user).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("verification mail sent")))
}

/// Start a password reset. The response is identical whether or not the email
/// belongs to an account.
#[post("/forget-password")]
pub async fn forget_password(
    state: web::Data<AppState>,
    payload: web::Json<ForgetPasswordRequest>,
) -> Result<impl Responder, AppError> {
    payload.validate()?;

    state.password_reset.request(&payload.email).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new(
        "if an account uses this email, a reset link has been sent",
    )))
}

/// Finish a password reset.
///
/// ## Responses:
/// - `200 OK`: password changed.
/// - `400 Bad Request`: invalid payload, or the user/token pair is not valid.
#[post("/reset-password")]
pub async fn reset_password(
    state: web::Data<AppState>,
    payload: web::Json<ResetPasswordRequest>,
) -> Result<impl Responder, AppError> {
    payload.validate()?;

    state
        .password_reset
        .complete(payload.user_id, &payload.token, &payload.new_password)
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("password updated")))
}

#[get("/me")]
pub async fn me(user: AuthenticatedUser) -> impl Responder {
    HttpResponse::Ok().json(user.0)
}

/// Update the signed-in user's profile fields.
#[patch("/me")]
pub async fn update_me(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    payload: web::Json<ProfileUpdate>,
) -> Result<impl Responder, AppError> {
    payload.validate()?;

    let AuthenticatedUser(mut user) = user;
    payload.into_inner().apply(&mut user);
    let updated = state.users.update_profile(&user).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// Soft-delete the signed-in account and clear the auth cookie.
#[delete("/me")]
pub async fn delete_me(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    state.users.delete(user.id).await?;
    log::info!("user {} deleted their account", user.id);

    let mut cookie = auth_cookie(&state, "", 0);
    cookie.make_removal();
    Ok(HttpResponse::NoContent().cookie(cookie).finish())
}
