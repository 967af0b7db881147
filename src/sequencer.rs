//! Chapter numbering.
//!
//! Numbers within a book are assigned once and never reused: the next number is
//! one past the highest number the book has ever had, soft-deleted chapters
//! included. Gaps left by deletions stay gaps.

use crate::error::AppError;
use crate::models::{Chapter, NewChapter};
use crate::store::{ChapterStore, StoreResult};

const MAX_ATTEMPTS: usize = 3;

/// One past `current_max`, or 1 for a book without chapters. `Conflict` once the
/// book has used the highest representable number.
pub fn next_chapter_no(current_max: Option<i64>) -> StoreResult<i64> {
    match current_max {
        None => Ok(1),
        Some(max) => max
            .checked_add(1)
            .ok_or_else(|| AppError::Conflict("no chapter numbers left in this book".into())),
    }
}

/// Inserts `chapter` under `requested`, or under the book's next number when no
/// number was requested.
///
/// An explicit number that is already taken is a `Conflict`. Automatic numbering
/// runs inside the store's per-book critical section, and a uniqueness conflict
/// from a racing writer is retried a bounded number of times.
pub async fn create_chapter(
    store: &dyn ChapterStore,
    chapter: NewChapter,
    requested: Option<i64>,
) -> StoreResult<Chapter> {
    if let Some(chapter_no) = requested {
        return store.insert(chapter, chapter_no).await;
    }

    let mut attempt = 1;
    loop {
        match store.insert_sequenced(chapter.clone(), next_chapter_no).await {
            Err(AppError::Conflict(message)) if attempt < MAX_ATTEMPTS => {
                log::warn!(
                    "chapter number race in book {} (attempt {}): {}",
                    chapter.book_id,
                    attempt,
                    message
                );
                attempt += 1;
            }
            result => return result,
        }
    }
}
