//! Persistence capabilities, one trait per entity.
//!
//! Handlers and workflows only see these traits. `postgres` backs them with sqlx in
//! production; `memory` backs them with plain collections for tests and local runs.

pub mod memory;
pub mod postgres;

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::error::AppError;
use crate::filters::{Filter, Metadata};
use crate::models::{
    Book, Chapter, Content, NewBook, NewChapter, NewUser, User,
};

pub type StoreResult<T> = Result<T, AppError>;

/// Computes the next chapter number from the current maximum of a book.
pub type NextChapterNo = fn(Option<i64>) -> StoreResult<i64>;

pub trait UserStore: Send + Sync {
    /// `Conflict` when the username or email is already taken.
    fn insert(&self, user: NewUser) -> BoxFuture<'_, StoreResult<User>>;

    /// Any status, including soft-deleted accounts.
    fn get(&self, id: i64) -> BoxFuture<'_, StoreResult<User>>;

    /// Active accounts only.
    fn get_by_username<'a>(&'a self, username: &'a str) -> BoxFuture<'a, StoreResult<User>>;

    /// Active accounts only.
    fn get_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, StoreResult<User>>;

    /// Writes username, email and profile fields; returns the stored row.
    fn update_profile<'a>(&'a self, user: &'a User) -> BoxFuture<'a, StoreResult<User>>;

    fn set_verification_token<'a>(
        &'a self,
        id: i64,
        token: &'a str,
    ) -> BoxFuture<'a, StoreResult<User>>;

    /// Marks the user verified and clears the token, but only while `token` is still
    /// the stored one and the account is active. `None` when nothing was updated.
    fn consume_verification_token<'a>(
        &'a self,
        id: i64,
        token: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<User>>>;

    fn set_password_reset_token<'a>(
        &'a self,
        id: i64,
        token: &'a str,
    ) -> BoxFuture<'a, StoreResult<User>>;

    /// Replaces the password hash and clears the reset token, but only while `token`
    /// is still the stored one and the account is active. `None` when nothing was updated.
    fn consume_password_reset_token<'a>(
        &'a self,
        id: i64,
        token: &'a str,
        password_hash: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<User>>>;

    /// Soft delete: flips the status to `deleted`.
    fn delete(&self, id: i64) -> BoxFuture<'_, StoreResult<()>>;
}

pub trait BookStore: Send + Sync {
    fn insert(&self, book: NewBook) -> BoxFuture<'_, StoreResult<Book>>;

    /// `NotFound` for missing or soft-deleted books.
    fn get(&self, id: i64) -> BoxFuture<'_, StoreResult<Book>>;

    /// Writes title and description.
    fn update<'a>(&'a self, book: &'a Book) -> BoxFuture<'a, StoreResult<Book>>;

    fn delete(&self, id: i64) -> BoxFuture<'_, StoreResult<()>>;

    /// Lists live books, optionally restricted to one owner and a title search.
    fn find<'a>(
        &'a self,
        owner_id: Option<i64>,
        title: &'a str,
        filter: &'a Filter,
    ) -> BoxFuture<'a, StoreResult<(Vec<Book>, Metadata)>>;
}

pub trait ChapterStore: Send + Sync {
    /// Inserts with an explicit number. `Conflict` if the book already used it.
    fn insert(&self, chapter: NewChapter, chapter_no: i64) -> BoxFuture<'_, StoreResult<Chapter>>;

    /// Reads the book's highest chapter number (soft-deleted rows included), asks
    /// `next` for the new number and inserts, all inside one per-book critical section.
    fn insert_sequenced(
        &self,
        chapter: NewChapter,
        next: NextChapterNo,
    ) -> BoxFuture<'_, StoreResult<Chapter>>;

    /// `NotFound` for missing or soft-deleted chapters.
    fn get_by_number(&self, book_id: i64, chapter_no: i64) -> BoxFuture<'_, StoreResult<Chapter>>;

    fn update<'a>(&'a self, chapter: &'a Chapter) -> BoxFuture<'a, StoreResult<Chapter>>;

    fn delete(&self, id: i64) -> BoxFuture<'_, StoreResult<()>>;

    fn find<'a>(
        &'a self,
        book_id: i64,
        title: &'a str,
        filter: &'a Filter,
    ) -> BoxFuture<'a, StoreResult<(Vec<Chapter>, Metadata)>>;
}

pub trait ContentStore: Send + Sync {
    fn get_by_chapter(&self, chapter_id: i64) -> BoxFuture<'_, StoreResult<Content>>;

    /// Inserts the chapter's content, or replaces the text if a row already exists.
    fn upsert<'a>(&'a self, chapter_id: i64, text: &'a str) -> BoxFuture<'a, StoreResult<Content>>;
}

/// Runs a persistence operation under a deadline so a slow database cannot hold a
/// request open indefinitely.
pub async fn with_deadline<T, F>(deadline: Duration, operation: &str, future: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(deadline, future).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!("{} exceeded its {:?} deadline", operation, deadline);
            Err(AppError::Timeout(operation.to_string()))
        }
    }
}
