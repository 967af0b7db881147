pub mod auth;
pub mod books;
pub mod chapters;
pub mod health;

use actix_web::web;

use crate::error::AppError;

/// Registers every endpoint that lives under `/api`.
///
/// Payload and query-string decoding failures are reported as `AppError::Validation`
/// so they share the JSON error body of every other failure.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        AppError::Validation(err.to_string()).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        AppError::Validation(err.to_string()).into()
    }))
    .app_data(web::PathConfig::default().error_handler(|err, _req| {
        AppError::NotFound(err.to_string()).into()
    }))
    .service(
        web::scope("/auth")
            .service(auth::sign_up)
            .service(auth::sign_in)
            .service(auth::refresh_token)
            .service(auth::sign_out)
            .service(auth::verify_email)
            .service(auth::resend_verification_mail)
            .service(auth::forget_password)
            .service(auth::reset_password)
            .service(auth::me)
            .service(auth::update_me)
            .service(auth::delete_me),
    )
    // Scopes do not fall through, so the longer prefix goes first.
    .service(
        web::scope("/book/{book_id}/chapter")
            .service(chapters::get_chapters)
            .service(chapters::create_chapter)
            .service(chapters::get_content)
            .service(chapters::upsert_content)
            .service(chapters::get_chapter)
            .service(chapters::update_chapter)
            .service(chapters::delete_chapter),
    )
    .service(
        web::scope("/book")
            .service(books::get_my_books)
            .service(books::browse_books)
            .service(books::create_book)
            .service(books::get_book)
            .service(books::update_book)
            .service(books::delete_book),
    );
}
