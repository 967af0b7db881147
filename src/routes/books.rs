use crate::{
    auth::{AuthGuard, AuthenticatedUser, VerifiedUser},
    error::AppError,
    filters::{ListQuery, ListResponse},
    models::{BookInput, BookUpdate, NewBook},
    state::AppState,
};
use actix_web::{delete, get, patch, post, web, HttpResponse, Responder};
use validator::Validate;

pub const BOOK_SORT_SAFE_LIST: &[&str] = &[
    "id",
    "title",
    "created_at",
    "updated_at",
    "-id",
    "-title",
    "-created_at",
    "-updated_at",
];

async fn list(
    state: &AppState,
    owner_id: Option<i64>,
    query: &ListQuery,
) -> Result<HttpResponse, AppError> {
    let filter = query.to_filter("id", BOOK_SORT_SAFE_LIST)?;
    let (data, metadata) = state.books.find(owner_id, query.title(), &filter).await?;
    Ok(HttpResponse::Ok().json(ListResponse { data, metadata }))
}

/// Lists the signed-in user's books.
///
/// ## Query Parameters:
/// - `page`, `pageSize` (optional): 1-based page and size (default 1 and 20, size at most 100).
/// - `sort` (optional): one of `id`, `title`, `created_at`, `updated_at`, with a leading
///   `-` for descending order. Anything else is a `409 Conflict`.
/// - `title` (optional): full-text search on the title.
#[get("")]
pub async fn get_my_books(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<ListQuery>,
) -> Result<impl Responder, AppError> {
    list(&state, Some(user.id), &query).await
}

/// Lists every live book. Public; accepts the same query parameters as `GET /book`.
#[get("/browse")]
pub async fn browse_books(
    state: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> Result<impl Responder, AppError> {
    list(&state, None, &query).await
}

#[get("/{id}")]
pub async fn get_book(
    state: web::Data<AppState>,
    book_id: web::Path<i64>,
) -> Result<impl Responder, AppError> {
    let book = state.books.get(book_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(book))
}

/// Creates a book owned by the caller. Requires a verified account.
///
/// ## Responses:
/// - `201 Created`: the new `Book`.
/// - `400 Bad Request`: invalid title or description.
/// - `401 Unauthorized` / `403 Forbidden`: not signed in / not verified.
#[post("")]
pub async fn create_book(
    state: web::Data<AppState>,
    user: VerifiedUser,
    payload: web::Json<BookInput>,
) -> Result<impl Responder, AppError> {
    payload.validate()?;

    let book = state
        .books
        .insert(NewBook::new(payload.into_inner(), user.id))
        .await?;
    log::info!("user {} created book {}", user.id, book.id);

    Ok(HttpResponse::Created().json(book))
}

/// Updates title and/or description. Only the owner may do this.
#[patch("/{id}")]
pub async fn update_book(
    state: web::Data<AppState>,
    user: VerifiedUser,
    book_id: web::Path<i64>,
    payload: web::Json<BookUpdate>,
) -> Result<impl Responder, AppError> {
    payload.validate()?;

    let mut book = state.books.get(book_id.into_inner()).await?;
    AuthGuard::ensure_owner(book.user_id, &user)?;

    payload.into_inner().apply(&mut book);
    let updated = state.books.update(&book).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// Soft-deletes a book. Only the owner may do this.
#[delete("/{id}")]
pub async fn delete_book(
    state: web::Data<AppState>,
    user: VerifiedUser,
    book_id: web::Path<i64>,
) -> Result<impl Responder, AppError> {
    let book = state.books.get(book_id.into_inner()).await?;
    AuthGuard::ensure_owner(book.user_id, &user)?;

    state.books.delete(book.id).await?;
    log::info!("user {} deleted book {}", user.id, book.id);

    Ok(HttpResponse::NoContent().finish())
}
