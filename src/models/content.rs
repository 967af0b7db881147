use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// The current text of a chapter. There is at most one row per chapter.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(skip_serializing)]
    pub id: i64,
    pub chapter_id: i64,
    pub text_content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContentInput {
    #[validate(length(max = 500000))]
    pub text_content: String,
}
