use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// A chapter of a book, addressed publicly by `(book_id, chapter_no)`.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: i64,
    pub book_id: i64,
    pub author_id: i64,
    /// Position in the book's sequence. Assigned once, never renumbered.
    pub chapter_no: i64,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Input structure for creating a chapter.
/// When `chapter_no` is absent the next number in the book's sequence is used.
#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChapterInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,

    #[validate(length(max = 2000))]
    pub description: Option<String>,

    #[validate(range(min = 1))]
    pub chapter_no: Option<i64>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct ChapterUpdate {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

impl ChapterUpdate {
    pub fn apply(self, chapter: &mut Chapter) {
        if let Some(title) = self.title {
            chapter.title = title;
        }
        if let Some(description) = self.description {
            chapter.description = Some(description);
        }
    }
}

/// Values needed to insert a chapter; the number is decided by the sequencer.
#[derive(Debug, Clone)]
pub struct NewChapter {
    pub book_id: i64,
    pub author_id: i64,
    pub title: String,
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chapter_input_validation() {
        let valid = ChapterInput {
            title: "Prologue".into(),
            description: None,
            chapter_no: None,
        };
        assert!(valid.validate().is_ok());

        let zero_number = ChapterInput {
            title: "Prologue".into(),
            description: None,
            chapter_no: Some(0),
        };
        assert!(zero_number.validate().is_err());

        let long_title = ChapterInput {
            title: "t".repeat(201),
            description: None,
            chapter_no: Some(3),
        };
        assert!(long_title.validate().is_err());
    }

    #[test]
    fn test_chapter_input_accepts_camel_case() {
        let input: ChapterInput =
            serde_json::from_str(r#"{"title":"One","chapterNo":4}"#).unwrap();
        assert_eq!(input.chapter_no, Some(4));
    }
}
