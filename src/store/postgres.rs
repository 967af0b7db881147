//! sqlx-backed stores.
//!
//! Every query runs under the configured deadline. Sort columns only reach the SQL
//! text through `Filter::order_by`, which rejects anything off the safe-list.

use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};

use super::{
    with_deadline, BookStore, ChapterStore, ContentStore, NextChapterNo, StoreResult, UserStore,
};
use crate::error::AppError;
use crate::filters::{Filter, Metadata};
use crate::models::{Book, Chapter, Content, NewBook, NewChapter, NewUser, User};

fn not_found(what: &str) -> AppError {
    AppError::NotFound(format!("{} not found", what))
}

/// Splits `count(*) OVER() AS total` off a page of rows.
fn counted<T>(rows: Vec<PgRow>, filter: &Filter) -> StoreResult<(Vec<T>, Metadata)>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    let mut total = 0;
    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        total = row.try_get::<i64, _>("total")?;
        items.push(T::from_row(&row)?);
    }
    Ok((items, Metadata::calculate(total, filter.page_size(), filter.page())))
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
    deadline: Duration,
}

impl PgUserStore {
    pub fn new(pool: PgPool, deadline: Duration) -> Self {
        Self { pool, deadline }
    }
}

impl UserStore for PgUserStore {
    fn insert(&self, user: NewUser) -> BoxFuture<'_, StoreResult<User>> {
        with_deadline(self.deadline, "insert user", async move {
            let user = sqlx::query_as::<_, User>(
                r#"
                INSERT INTO users (username, email, password_hash)
                VALUES ($1, $2, $3)
                RETURNING *
                "#,
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .await?;
            Ok(user)
        })
        .boxed()
    }

    fn get(&self, id: i64) -> BoxFuture<'_, StoreResult<User>> {
        with_deadline(self.deadline, "get user", async move {
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| not_found("user"))
        })
        .boxed()
    }

    fn get_by_username<'a>(&'a self, username: &'a str) -> BoxFuture<'a, StoreResult<User>> {
        with_deadline(self.deadline, "get user by username", async move {
            sqlx::query_as::<_, User>(
                "SELECT * FROM users WHERE username = $1 AND status = 'active'",
            )
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("user"))
        })
        .boxed()
    }

    fn get_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, StoreResult<User>> {
        with_deadline(self.deadline, "get user by email", async move {
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1 AND status = 'active'")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| not_found("user"))
        })
        .boxed()
    }

    fn update_profile<'a>(&'a self, user: &'a User) -> BoxFuture<'a, StoreResult<User>> {
        with_deadline(self.deadline, "update user", async move {
            sqlx::query_as::<_, User>(
                r#"
                UPDATE users
                SET username = $2, email = $3, first_name = $4, last_name = $5,
                    date_of_birth = $6, gender = $7, profile_picture = $8, updated_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.date_of_birth)
            .bind(&user.gender)
            .bind(&user.profile_picture)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("user"))
        })
        .boxed()
    }

    fn set_verification_token<'a>(
        &'a self,
        id: i64,
        token: &'a str,
    ) -> BoxFuture<'a, StoreResult<User>> {
        with_deadline(self.deadline, "set verification token", async move {
            sqlx::query_as::<_, User>(
                "UPDATE users SET verification_token = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
            )
            .bind(id)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("user"))
        })
        .boxed()
    }

    fn consume_verification_token<'a>(
        &'a self,
        id: i64,
        token: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<User>>> {
        with_deadline(self.deadline, "consume verification token", async move {
            let user = sqlx::query_as::<_, User>(
                r#"
                UPDATE users
                SET verified = TRUE, verification_token = NULL, updated_at = NOW()
                WHERE id = $1 AND verification_token = $2 AND status = 'active'
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
            Ok(user)
        })
        .boxed()
    }

    fn set_password_reset_token<'a>(
        &'a self,
        id: i64,
        token: &'a str,
    ) -> BoxFuture<'a, StoreResult<User>> {
        with_deadline(self.deadline, "set password reset token", async move {
            sqlx::query_as::<_, User>(
                "UPDATE users SET password_reset_token = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
            )
            .bind(id)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("user"))
        })
        .boxed()
    }

    fn consume_password_reset_token<'a>(
        &'a self,
        id: i64,
        token: &'a str,
        password_hash: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<User>>> {
        with_deadline(self.deadline, "consume password reset token", async move {
            let user = sqlx::query_as::<_, User>(
                r#"
                UPDATE users
                SET password_hash = $3, password_reset_token = NULL, updated_at = NOW()
                WHERE id = $1 AND password_reset_token = $2 AND status = 'active'
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(token)
            .bind(password_hash)
            .fetch_optional(&self.pool)
            .await?;
            Ok(user)
        })
        .boxed()
    }

    fn delete(&self, id: i64) -> BoxFuture<'_, StoreResult<()>> {
        with_deadline(self.deadline, "delete user", async move {
            let result = sqlx::query(
                "UPDATE users SET status = 'deleted', updated_at = NOW() WHERE id = $1",
            )
            .bind(id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(not_found("user"));
            }
            Ok(())
        })
        .boxed()
    }
}

#[derive(Clone)]
pub struct PgBookStore {
    pool: PgPool,
    deadline: Duration,
}

impl PgBookStore {
    pub fn new(pool: PgPool, deadline: Duration) -> Self {
        Self { pool, deadline }
    }
}

impl BookStore for PgBookStore {
    fn insert(&self, book: NewBook) -> BoxFuture<'_, StoreResult<Book>> {
        with_deadline(self.deadline, "insert book", async move {
            let book = sqlx::query_as::<_, Book>(
                r#"
                INSERT INTO books (user_id, title, description)
                VALUES ($1, $2, $3)
                RETURNING *
                "#,
            )
            .bind(book.user_id)
            .bind(&book.title)
            .bind(&book.description)
            .fetch_one(&self.pool)
            .await?;
            Ok(book)
        })
        .boxed()
    }

    fn get(&self, id: i64) -> BoxFuture<'_, StoreResult<Book>> {
        with_deadline(self.deadline, "get book", async move {
            sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 AND deleted_at IS NULL")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| not_found("book"))
        })
        .boxed()
    }

    fn update<'a>(&'a self, book: &'a Book) -> BoxFuture<'a, StoreResult<Book>> {
        with_deadline(self.deadline, "update book", async move {
            sqlx::query_as::<_, Book>(
                r#"
                UPDATE books
                SET title = $2, description = $3, updated_at = NOW()
                WHERE id = $1 AND deleted_at IS NULL
                RETURNING *
                "#,
            )
            .bind(book.id)
            .bind(&book.title)
            .bind(&book.description)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("book"))
        })
        .boxed()
    }

    fn delete(&self, id: i64) -> BoxFuture<'_, StoreResult<()>> {
        with_deadline(self.deadline, "delete book", async move {
            let result = sqlx::query(
                "UPDATE books SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(not_found("book"));
            }
            Ok(())
        })
        .boxed()
    }

    fn find<'a>(
        &'a self,
        owner_id: Option<i64>,
        title: &'a str,
        filter: &'a Filter,
    ) -> BoxFuture<'a, StoreResult<(Vec<Book>, Metadata)>> {
        with_deadline(self.deadline, "find books", async move {
            let statement = format!(
                r#"
                SELECT count(*) OVER() AS total, *
                FROM books
                WHERE deleted_at IS NULL
                AND ($1::BIGINT IS NULL OR user_id = $1)
                AND (to_tsvector('simple', title) @@ plainto_tsquery('simple', $2) OR $2 = '')
                ORDER BY {}
                LIMIT $3 OFFSET $4
                "#,
                filter.order_by("id")?
            );
            let rows = sqlx::query(&statement)
                .bind(owner_id)
                .bind(title)
                .bind(filter.limit())
                .bind(filter.offset())
                .fetch_all(&self.pool)
                .await?;
            counted(rows, filter)
        })
        .boxed()
    }
}

#[derive(Clone)]
pub struct PgChapterStore {
    pool: PgPool,
    deadline: Duration,
}

impl PgChapterStore {
    pub fn new(pool: PgPool, deadline: Duration) -> Self {
        Self { pool, deadline }
    }
}

const INSERT_CHAPTER: &str = r#"
    INSERT INTO chapters (book_id, author_id, chapter_no, title, description)
    VALUES ($1, $2, $3, $4, $5)
    RETURNING *
"#;

impl ChapterStore for PgChapterStore {
    fn insert(&self, chapter: NewChapter, chapter_no: i64) -> BoxFuture<'_, StoreResult<Chapter>> {
        with_deadline(self.deadline, "insert chapter", async move {
            let chapter = sqlx::query_as::<_, Chapter>(INSERT_CHAPTER)
                .bind(chapter.book_id)
                .bind(chapter.author_id)
                .bind(chapter_no)
                .bind(&chapter.title)
                .bind(&chapter.description)
                .fetch_one(&self.pool)
                .await?;
            Ok(chapter)
        })
        .boxed()
    }

    fn insert_sequenced(
        &self,
        chapter: NewChapter,
        next: NextChapterNo,
    ) -> BoxFuture<'_, StoreResult<Chapter>> {
        with_deadline(self.deadline, "insert sequenced chapter", async move {
            let mut tx = self.pool.begin().await?;

            // Released on commit or rollback.
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(chapter.book_id)
                .execute(&mut *tx)
                .await?;

            let current = sqlx::query_scalar::<_, Option<i64>>(
                "SELECT MAX(chapter_no) FROM chapters WHERE book_id = $1",
            )
            .bind(chapter.book_id)
            .fetch_one(&mut *tx)
            .await?;

            let inserted = sqlx::query_as::<_, Chapter>(INSERT_CHAPTER)
                .bind(chapter.book_id)
                .bind(chapter.author_id)
                .bind(next(current)?)
                .bind(&chapter.title)
                .bind(&chapter.description)
                .fetch_one(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(inserted)
        })
        .boxed()
    }

    fn get_by_number(&self, book_id: i64, chapter_no: i64) -> BoxFuture<'_, StoreResult<Chapter>> {
        with_deadline(self.deadline, "get chapter", async move {
            sqlx::query_as::<_, Chapter>(
                r#"
                SELECT * FROM chapters
                WHERE book_id = $1 AND chapter_no = $2 AND deleted_at IS NULL
                "#,
            )
            .bind(book_id)
            .bind(chapter_no)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("chapter"))
        })
        .boxed()
    }

    fn update<'a>(&'a self, chapter: &'a Chapter) -> BoxFuture<'a, StoreResult<Chapter>> {
        with_deadline(self.deadline, "update chapter", async move {
            sqlx::query_as::<_, Chapter>(
                r#"
                UPDATE chapters
                SET title = $2, description = $3, updated_at = NOW()
                WHERE id = $1 AND deleted_at IS NULL
                RETURNING *
                "#,
            )
            .bind(chapter.id)
            .bind(&chapter.title)
            .bind(&chapter.description)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("chapter"))
        })
        .boxed()
    }

    fn delete(&self, id: i64) -> BoxFuture<'_, StoreResult<()>> {
        with_deadline(self.deadline, "delete chapter", async move {
            let result = sqlx::query(
                "UPDATE chapters SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(not_found("chapter"));
            }
            Ok(())
        })
        .boxed()
    }

    fn find<'a>(
        &'a self,
        book_id: i64,
        title: &'a str,
        filter: &'a Filter,
    ) -> BoxFuture<'a, StoreResult<(Vec<Chapter>, Metadata)>> {
        with_deadline(self.deadline, "find chapters", async move {
            let statement = format!(
                r#"
                SELECT count(*) OVER() AS total, *
                FROM chapters
                WHERE book_id = $1 AND deleted_at IS NULL
                AND (to_tsvector('simple', title) @@ plainto_tsquery('simple', $2) OR $2 = '')
                ORDER BY {}
                LIMIT $3 OFFSET $4
                "#,
                filter.order_by("chapter_no")?
            );
            let rows = sqlx::query(&statement)
                .bind(book_id)
                .bind(title)
                .bind(filter.limit())
                .bind(filter.offset())
                .fetch_all(&self.pool)
                .await?;
            counted(rows, filter)
        })
        .boxed()
    }
}

#[derive(Clone)]
pub struct PgContentStore {
    pool: PgPool,
    deadline: Duration,
}

impl PgContentStore {
    pub fn new(pool: PgPool, deadline: Duration) -> Self {
        Self { pool, deadline }
    }
}

impl ContentStore for PgContentStore {
    fn get_by_chapter(&self, chapter_id: i64) -> BoxFuture<'_, StoreResult<Content>> {
        with_deadline(self.deadline, "get content", async move {
            sqlx::query_as::<_, Content>("SELECT * FROM contents WHERE chapter_id = $1")
                .bind(chapter_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| not_found("content"))
        })
        .boxed()
    }

    fn upsert<'a>(&'a self, chapter_id: i64, text: &'a str) -> BoxFuture<'a, StoreResult<Content>> {
        with_deadline(self.deadline, "upsert content", async move {
            let content = sqlx::query_as::<_, Content>(
                r#"
                INSERT INTO contents (chapter_id, text_content)
                VALUES ($1, $2)
                ON CONFLICT (chapter_id)
                DO UPDATE SET text_content = EXCLUDED.text_content, updated_at = NOW()
                RETURNING *
                "#,
            )
            .bind(chapter_id)
            .bind(text)
            .fetch_one(&self.pool)
            .await?;
            Ok(content)
        })
        .boxed()
    }
}
