//! In-memory stores with the same observable behaviour as the Postgres ones.
//!
//! Every store keeps its rows behind a single lock, which also serves as the
//! per-book critical section for chapter numbering.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::Utc;
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;

use super::{BookStore, ChapterStore, ContentStore, NextChapterNo, StoreResult, UserStore};
use crate::error::AppError;
use crate::filters::{Filter, Metadata, SortDirection};
use crate::models::{Book, Chapter, Content, NewBook, NewChapter, NewUser, User, UserStatus};

fn ready<'a, T: Send + 'a>(result: StoreResult<T>) -> BoxFuture<'a, StoreResult<T>> {
    future::ready(result).boxed()
}

fn not_found(what: &str) -> AppError {
    AppError::NotFound(format!("{} not found", what))
}

/// Case-insensitive match of every search word, standing in for Postgres full-text search.
fn title_matches(title: &str, search: &str) -> bool {
    let title = title.to_lowercase();
    search
        .split_whitespace()
        .all(|word| title.contains(&word.to_lowercase()))
}

fn paginate<T>(mut rows: Vec<T>, filter: &Filter) -> (Vec<T>, Metadata) {
    let total = rows.len() as i64;
    let offset = filter.offset().min(total) as usize;
    let limit = filter.limit().max(0) as usize;
    let page: Vec<T> = rows.drain(offset..).take(limit).collect();
    (page, Metadata::calculate(total, filter.page_size(), filter.page()))
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

#[derive(Default)]
struct UserTable {
    next_id: i64,
    rows: HashMap<i64, User>,
}

#[derive(Default)]
pub struct MemoryUserStore {
    table: Mutex<UserTable>,
}

impl MemoryUserStore {
    fn modify<F>(&self, id: i64, change: F) -> StoreResult<User>
    where
        F: FnOnce(&mut User),
    {
        let mut table = self.table.lock();
        let user = table.rows.get_mut(&id).ok_or_else(|| not_found("user"))?;
        change(user);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    fn find_active<P>(&self, predicate: P) -> StoreResult<User>
    where
        P: Fn(&User) -> bool,
    {
        self.table
            .lock()
            .rows
            .values()
            .find(|u| u.is_active() && predicate(u))
            .cloned()
            .ok_or_else(|| not_found("user"))
    }
}

impl UserStore for MemoryUserStore {
    fn insert(&self, user: NewUser) -> BoxFuture<'_, StoreResult<User>> {
        let mut table = self.table.lock();
        let taken = table
            .rows
            .values()
            .any(|u| u.username == user.username || u.email == user.email);
        if taken {
            return ready(Err(AppError::Conflict(
                "username or email already registered".into(),
            )));
        }

        table.next_id += 1;
        let now = Utc::now();
        let row = User {
            id: table.next_id,
            username: user.username,
            password_hash: user.password_hash,
            email: user.email,
            first_name: None,
            last_name: None,
            date_of_birth: None,
            gender: None,
            profile_picture: None,
            status: UserStatus::Active,
            verified: false,
            verification_token: None,
            password_reset_token: None,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(row.id, row.clone());
        ready(Ok(row))
    }

    fn get(&self, id: i64) -> BoxFuture<'_, StoreResult<User>> {
        let user = self.table.lock().rows.get(&id).cloned();
        ready(user.ok_or_else(|| not_found("user")))
    }

    fn get_by_username<'a>(&'a self, username: &'a str) -> BoxFuture<'a, StoreResult<User>> {
        ready(self.find_active(|u| u.username == username))
    }

    fn get_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, StoreResult<User>> {
        ready(self.find_active(|u| u.email == email))
    }

    fn update_profile<'a>(&'a self, user: &'a User) -> BoxFuture<'a, StoreResult<User>> {
        ready(self.modify(user.id, |row| {
            row.username = user.username.clone();
            row.email = user.email.clone();
            row.first_name = user.first_name.clone();
            row.last_name = user.last_name.clone();
            row.date_of_birth = user.date_of_birth;
            row.gender = user.gender.clone();
            row.profile_picture = user.profile_picture.clone();
        }))
    }

    fn set_verification_token<'a>(
        &'a self,
        id: i64,
        token: &'a str,
    ) -> BoxFuture<'a, StoreResult<User>> {
        ready(self.modify(id, |row| row.verification_token = Some(token.to_string())))
    }

    fn consume_verification_token<'a>(
        &'a self,
        id: i64,
        token: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<User>>> {
        let mut table = self.table.lock();
        let updated = table
            .rows
            .get_mut(&id)
            .filter(|u| u.is_active() && u.verification_token.as_deref() == Some(token))
            .map(|u| {
                u.verified = true;
                u.verification_token = None;
                u.updated_at = Utc::now();
                u.clone()
            });
        ready(Ok(updated))
    }

    fn set_password_reset_token<'a>(
        &'a self,
        id: i64,
        token: &'a str,
    ) -> BoxFuture<'a, StoreResult<User>> {
        ready(self.modify(id, |row| row.password_reset_token = Some(token.to_string())))
    }

    fn consume_password_reset_token<'a>(
        &'a self,
        id: i64,
        token: &'a str,
        password_hash: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<User>>> {
        let mut table = self.table.lock();
        let updated = table
            .rows
            .get_mut(&id)
            .filter(|u| u.is_active() && u.password_reset_token.as_deref() == Some(token))
            .map(|u| {
                u.password_hash = password_hash.to_string();
                u.password_reset_token = None;
                u.updated_at = Utc::now();
                u.clone()
            });
        ready(Ok(updated))
    }

    fn delete(&self, id: i64) -> BoxFuture<'_, StoreResult<()>> {
        ready(self.modify(id, |row| row.status = UserStatus::Deleted).map(|_| ()))
    }
}

#[derive(Default)]
struct BookTable {
    next_id: i64,
    rows: HashMap<i64, Book>,
}

#[derive(Default)]
pub struct MemoryBookStore {
    table: Mutex<BookTable>,
}

fn compare_books(a: &Book, b: &Book, column: &str) -> Ordering {
    match column {
        "title" => a.title.cmp(&b.title),
        "created_at" => a.created_at.cmp(&b.created_at),
        "updated_at" => a.updated_at.cmp(&b.updated_at),
        _ => a.id.cmp(&b.id),
    }
}

impl BookStore for MemoryBookStore {
    fn insert(&self, book: NewBook) -> BoxFuture<'_, StoreResult<Book>> {
        let mut table = self.table.lock();
        table.next_id += 1;
        let now = Utc::now();
        let row = Book {
            id: table.next_id,
            user_id: book.user_id,
            title: book.title,
            description: book.description,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        table.rows.insert(row.id, row.clone());
        ready(Ok(row))
    }

    fn get(&self, id: i64) -> BoxFuture<'_, StoreResult<Book>> {
        let book = self
            .table
            .lock()
            .rows
            .get(&id)
            .filter(|b| b.deleted_at.is_none())
            .cloned();
        ready(book.ok_or_else(|| not_found("book")))
    }

    fn update<'a>(&'a self, book: &'a Book) -> BoxFuture<'a, StoreResult<Book>> {
        let mut table = self.table.lock();
        let result = match table.rows.get_mut(&book.id).filter(|b| b.deleted_at.is_none()) {
            Some(row) => {
                row.title = book.title.clone();
                row.description = book.description.clone();
                row.updated_at = Utc::now();
                Ok(row.clone())
            }
            None => Err(not_found("book")),
        };
        ready(result)
    }

    fn delete(&self, id: i64) -> BoxFuture<'_, StoreResult<()>> {
        let mut table = self.table.lock();
        let result = match table.rows.get_mut(&id).filter(|b| b.deleted_at.is_none()) {
            Some(row) => {
                row.deleted_at = Some(Utc::now());
                Ok(())
            }
            None => Err(not_found("book")),
        };
        ready(result)
    }

    fn find<'a>(
        &'a self,
        owner_id: Option<i64>,
        title: &'a str,
        filter: &'a Filter,
    ) -> BoxFuture<'a, StoreResult<(Vec<Book>, Metadata)>> {
        let column = match filter.sort_column() {
            Ok(column) => column,
            Err(e) => return ready(Err(e.into())),
        };
        let direction = filter.sort_direction();

        let mut rows: Vec<Book> = self
            .table
            .lock()
            .rows
            .values()
            .filter(|b| b.deleted_at.is_none())
            .filter(|b| owner_id.map_or(true, |owner| b.user_id == owner))
            .filter(|b| title_matches(&b.title, title))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            directed(compare_books(a, b, column), direction).then(a.id.cmp(&b.id))
        });

        ready(Ok(paginate(rows, filter)))
    }
}

#[derive(Default)]
struct ChapterTable {
    next_id: i64,
    rows: HashMap<i64, Chapter>,
}

impl ChapterTable {
    fn max_chapter_no(&self, book_id: i64) -> Option<i64> {
        self.rows
            .values()
            .filter(|c| c.book_id == book_id)
            .map(|c| c.chapter_no)
            .max()
    }

    fn insert(&mut self, chapter: NewChapter, chapter_no: i64) -> StoreResult<Chapter> {
        let taken = self
            .rows
            .values()
            .any(|c| c.book_id == chapter.book_id && c.chapter_no == chapter_no);
        if taken {
            return Err(AppError::Conflict(format!(
                "chapter {} already exists in book {}",
                chapter_no, chapter.book_id
            )));
        }

        self.next_id += 1;
        let now = Utc::now();
        let row = Chapter {
            id: self.next_id,
            book_id: chapter.book_id,
            author_id: chapter.author_id,
            chapter_no,
            title: chapter.title,
            description: chapter.description,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.rows.insert(row.id, row.clone());
        Ok(row)
    }
}

#[derive(Default)]
pub struct MemoryChapterStore {
    table: Mutex<ChapterTable>,
}

fn compare_chapters(a: &Chapter, b: &Chapter, column: &str) -> Ordering {
    match column {
        "title" => a.title.cmp(&b.title),
        "created_at" => a.created_at.cmp(&b.created_at),
        "updated_at" => a.updated_at.cmp(&b.updated_at),
        _ => a.chapter_no.cmp(&b.chapter_no),
    }
}

impl ChapterStore for MemoryChapterStore {
    fn insert(&self, chapter: NewChapter, chapter_no: i64) -> BoxFuture<'_, StoreResult<Chapter>> {
        ready(self.table.lock().insert(chapter, chapter_no))
    }

    fn insert_sequenced(
        &self,
        chapter: NewChapter,
        next: NextChapterNo,
    ) -> BoxFuture<'_, StoreResult<Chapter>> {
        let mut table = self.table.lock();
        let result = next(table.max_chapter_no(chapter.book_id))
            .and_then(|chapter_no| table.insert(chapter, chapter_no));
        ready(result)
    }

    fn get_by_number(&self, book_id: i64, chapter_no: i64) -> BoxFuture<'_, StoreResult<Chapter>> {
        let chapter = self
            .table
            .lock()
            .rows
            .values()
            .find(|c| c.book_id == book_id && c.chapter_no == chapter_no && c.deleted_at.is_none())
            .cloned();
        ready(chapter.ok_or_else(|| not_found("chapter")))
    }

    fn update<'a>(&'a self, chapter: &'a Chapter) -> BoxFuture<'a, StoreResult<Chapter>> {
        let mut table = self.table.lock();
        let result = match table
            .rows
            .get_mut(&chapter.id)
            .filter(|c| c.deleted_at.is_none())
        {
            Some(row) => {
                row.title = chapter.title.clone();
                row.description = chapter.description.clone();
                row.updated_at = Utc::now();
                Ok(row.clone())
            }
            None => Err(not_found("chapter")),
        };
        ready(result)
    }

    fn delete(&self, id: i64) -> BoxFuture<'_, StoreResult<()>> {
        let mut table = self.table.lock();
        let result = match table.rows.get_mut(&id).filter(|c| c.deleted_at.is_none()) {
            Some(row) => {
                row.deleted_at = Some(Utc::now());
                Ok(())
            }
            None => Err(not_found("chapter")),
        };
        ready(result)
    }

    fn find<'a>(
        &'a self,
        book_id: i64,
        title: &'a str,
        filter: &'a Filter,
    ) -> BoxFuture<'a, StoreResult<(Vec<Chapter>, Metadata)>> {
        let column = match filter.sort_column() {
            Ok(column) => column,
            Err(e) => return ready(Err(e.into())),
        };
        let direction = filter.sort_direction();

        let mut rows: Vec<Chapter> = self
            .table
            .lock()
            .rows
            .values()
            .filter(|c| c.book_id == book_id && c.deleted_at.is_none())
            .filter(|c| title_matches(&c.title, title))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            directed(compare_chapters(a, b, column), direction)
                .then(a.chapter_no.cmp(&b.chapter_no))
        });

        ready(Ok(paginate(rows, filter)))
    }
}

#[derive(Default)]
struct ContentTable {
    next_id: i64,
    rows: HashMap<i64, Content>,
}

/// Keyed by chapter id, so a chapter can never have two content rows.
#[derive(Default)]
pub struct MemoryContentStore {
    table: Mutex<ContentTable>,
}

impl ContentStore for MemoryContentStore {
    fn get_by_chapter(&self, chapter_id: i64) -> BoxFuture<'_, StoreResult<Content>> {
        let content = self.table.lock().rows.get(&chapter_id).cloned();
        ready(content.ok_or_else(|| not_found("content")))
    }

    fn upsert<'a>(&'a self, chapter_id: i64, text: &'a str) -> BoxFuture<'a, StoreResult<Content>> {
        let mut table = self.table.lock();
        let now = Utc::now();
        if let Some(row) = table.rows.get_mut(&chapter_id) {
            row.text_content = text.to_string();
            row.updated_at = now;
            return ready(Ok(row.clone()));
        }

        table.next_id += 1;
        let row = Content {
            id: table.next_id,
            chapter_id,
            text_content: text.to_string(),
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(chapter_id, row.clone());
        ready(Ok(row))
    }
}
