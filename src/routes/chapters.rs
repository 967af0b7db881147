use crate::{
    auth::{AuthGuard, VerifiedUser},
    error::AppError,
    filters::{ListQuery, ListResponse},
    models::{Book, ChapterInput, ChapterUpdate, ContentInput, NewChapter},
    sequencer,
    state::AppState,
};
use actix_web::{delete, get, patch, post, web, HttpResponse, Responder};
use validator::Validate;

pub const CHAPTER_SORT_SAFE_LIST: &[&str] = &[
    "chapter_no",
    "title",
    "created_at",
    "-chapter_no",
    "-title",
    "-created_at",
];

/// Loads the book and checks that `user` owns it.
async fn owned_book(state: &AppState, book_id: i64, user: &VerifiedUser) -> Result<Book, AppError> {
    let book = state.books.get(book_id).await?;
    AuthGuard::ensure_owner(book.user_id, user)?;
    Ok(book)
}

/// Lists the live chapters of a book. Public.
///
/// ## Query Parameters:
/// - `page`, `pageSize` (optional): 1-based page and size.
/// - `sort` (optional): `chapter_no` (default), `title` or `created_at`, `-` for descending.
/// - `title` (optional): full-text search on the chapter title.
#[get("")]
pub async fn get_chapters(
    state: web::Data<AppState>,
    book_id: web::Path<i64>,
    query: web::Query<ListQuery>,
) -> Result<impl Responder, AppError> {
    let book = state.books.get(book_id.into_inner()).await?;
    let filter = query.to_filter("chapter_no", CHAPTER_SORT_SAFE_LIST)?;

    let (data, metadata) = state.chapters.find(book.id, query.title(), &filter).await?;
    Ok(HttpResponse::Ok().json(ListResponse { data, metadata }))
}

/// Adds a chapter to a book the caller owns.
///
/// Without `chapterNo` the chapter gets the next number in the book's sequence;
/// numbers of deleted chapters are never handed out again.
///
/// ## Responses:
/// - `201 Created`: the new `Chapter`.
/// - `403 Forbidden`: not verified, or not the book's owner.
/// - `404 Not Found`: no such book.
/// - `409 Conflict`: the requested `chapterNo` is taken.
#[post("")]
pub async fn create_chapter(
    state: web::Data<AppState>,
    user: VerifiedUser,
    book_id: web::Path<i64>,
    payload: web::Json<ChapterInput>,
) -> Result<impl Responder, AppError> {
    payload.validate()?;

    let book = owned_book(&state, book_id.into_inner(), &user).await?;
    let input = payload.into_inner();
    let chapter = sequencer::create_chapter(
        state.chapters.as_ref(),
        NewChapter {
            book_id: book.id,
            author_id: user.id,
            title: input.title,
            description: input.description,
        },
        input.chapter_no,
    )
    .await?;
    log::info!("chapter {} added to book {}", chapter.chapter_no, book.id);

    Ok(HttpResponse::Created().json(chapter))
}

#[get("/{chapter_no}")]
pub async fn get_chapter(
    state: web::Data<AppState>,
    path: web::Path<(i64, i64)>,
) -> Result<impl Responder, AppError> {
    let (book_id, chapter_no) = path.into_inner();
    let book = state.books.get(book_id).await?;

    let chapter = state.chapters.get_by_number(book.id, chapter_no).await?;
    Ok(HttpResponse::Ok().json(chapter))
}

#[patch("/{chapter_no}")]
pub async fn update_chapter(
    state: web::Data<AppState>,
    user: VerifiedUser,
    path: web::Path<(i64, i64)>,
    payload: web::Json<ChapterUpdate>,
) -> Result<impl Responder, AppError> {
    payload.validate()?;

    let (book_id, chapter_no) = path.into_inner();
    let book = owned_book(&state, book_id, &user).await?;
    let mut chapter = state.chapters.get_by_number(book.id, chapter_no).await?;

    payload.into_inner().apply(&mut chapter);
    let updated = state.chapters.update(&chapter).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// Soft-deletes a chapter. Its number stays reserved.
#[delete("/{chapter_no}")]
pub async fn delete_chapter(
    state: web::Data<AppState>,
    user: VerifiedUser,
    path: web::Path<(i64, i64)>,
) -> Result<impl Responder, AppError> {
    let (book_id, chapter_no) = path.into_inner();
    let book = owned_book(&state, book_id, &user).await?;
    let chapter = state.chapters.get_by_number(book.id, chapter_no).await?;

    state.chapters.delete(chapter.id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/{chapter_no}/content")]
pub async fn get_content(
    state: web::Data<AppState>,
    path: web::Path<(i64, i64)>,
) -> Result<impl Responder, AppError> {
    let (book_id, chapter_no) = path.into_inner();
    let book = state.books.get(book_id).await?;
    let chapter = state.chapters.get_by_number(book.id, chapter_no).await?;

    let content = state.contents.get_by_chapter(chapter.id).await?;
    Ok(HttpResponse::Ok().json(content))
}

/// Sets the chapter's text, replacing whatever was there.
#[post("/{chapter_no}/content")]
pub async fn upsert_content(
    state: web::Data<AppState>,
    user: VerifiedUser,
    path: web::Path<(i64, i64)>,
    payload: web::Json<ContentInput>,
) -> Result<impl Responder, AppError> {
    payload.validate()?;

    let (book_id, chapter_no) = path.into_inner();
    let book = owned_book(&state, book_id, &user).await?;
    let chapter = state.chapters.get_by_number(book.id, chapter_no).await?;

    let content = state
        .contents
        .upsert(chapter.id, &payload.text_content)
        .await?;
    Ok(HttpResponse::Ok().json(content))
}
