use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// A book owned by exactly one user.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: i64,
    /// Owner. Set on creation and never changed.
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Input structure for creating a book.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct BookInput {
    /// Must be between 1 and 200 characters.
    #[validate(length(min = 1, max = 200))]
    pub title: String,

    /// Maximum length of 2000 characters if provided.
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

/// Partial update of a book; absent fields are left unchanged.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct BookUpdate {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

impl BookUpdate {
    pub fn apply(self, book: &mut Book) {
        if let Some(title) = self.title {
            book.title = title;
        }
        if let Some(description) = self.description {
            book.description = Some(description);
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewBook {
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
}

impl NewBook {
    pub fn new(input: BookInput, owner_id: i64) -> Self {
        Self {
            user_id: owner_id,
            title: input.title,
            description: input.description,
        }
    }
}
