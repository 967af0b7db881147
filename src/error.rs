//!
//! # Custom Error Handling
//!
//! This module defines the custom error type `AppError` used at the HTTP boundary.
//! Components deeper in the crate (credential hashing, token signing, the filter
//! engine, the account workflows) return their own typed errors, and each of them
//! converts into `AppError` through a `From` implementation so handlers can simply
//! use the `?` operator.
//!
//! `AppError` implements `actix_web::error::ResponseError` to turn every variant into
//! an HTTP status code and a stable JSON body of the form `{"error": "..."}`.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

/// Represents all errors that can reach an HTTP handler.
///
/// Transport concerns (status codes, message formatting) live only in
/// the `ResponseError` implementation below; the rest of the crate deals in variants.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or out-of-range input (HTTP 400).
    #[error("Validation Error: {0}")]
    Validation(String),
    /// Username/password pair did not match an active account (HTTP 401).
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// No token, or a token that failed verification (HTTP 401).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// Authenticated, but not allowed to perform the operation (HTTP 403).
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// The requested resource does not exist or was soft-deleted (HTTP 404).
    #[error("Not Found: {0}")]
    NotFound(String),
    /// The request collides with existing state, e.g. a duplicate chapter number
    /// or a sort field outside the safe-list (HTTP 409).
    #[error("Conflict: {0}")]
    Conflict(String),
    /// A persistence operation exceeded its deadline (HTTP 500).
    #[error("Timeout: {0}")]
    Timeout(String),
    /// An unexpected server-side error (HTTP 500).
    #[error("Internal Server Error: {0}")]
    InternalServerError(String),
    /// An error originating from database operations (HTTP 500).
    /// Wraps errors from the `sqlx` crate.
    #[error("Database Error: {0}")]
    DatabaseError(String),
}

impl AppError {
    /// Message sent to clients. Server-side details are logged, not returned.
    fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::InvalidCredentials => "invalid credentials".into(),
            AppError::Timeout(_) => "the request took too long to complete".into(),
            AppError::InternalServerError(_) | AppError::DatabaseError(_) => {
                "the server encountered a problem and could not process your request".into()
            }
        }
    }
}

/// Converts `AppError` variants into `HttpResponse` objects.
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Timeout(_)
            | AppError::InternalServerError(_)
            | AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            log::error!("{}", self);
        }
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.public_message()
        }))
    }
}

/// Converts `sqlx::Error` into `AppError`.
///
/// `RowNotFound` becomes `NotFound` and unique-constraint violations become
/// `Conflict`; everything else is a `DatabaseError`.
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> AppError {
        match error {
            sqlx::Error::RowNotFound => AppError::NotFound("record not found".into()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(format!(
                    "duplicate value violates {}",
                    db_err.constraint().unwrap_or("a unique constraint")
                ))
            }
            _ => AppError::DatabaseError(error.to_string()),
        }
    }
}

/// Converts `validator::ValidationErrors` into `AppError::Validation`.
///
/// The detailed validation messages are preserved.
impl From<ValidationErrors> for AppError {
    fn from(error: ValidationErrors) -> AppError {
        AppError::Validation(error.to_string())
    }
}

/// Converts `bcrypt::BcryptError` into `AppError::InternalServerError`.
impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> AppError {
        AppError::InternalServerError(error.to_string())
    }
}
