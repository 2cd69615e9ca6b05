use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::image::Image;

/// Fixed emotion vocabulary shared by user tags and AI classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "emotion", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Peaceful,
    Unrest,
}

impl Emotion {
    pub const ALL: [Emotion; 5] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Peaceful,
        Emotion::Unrest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Peaceful => "peaceful",
            Emotion::Unrest => "unrest",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DiaryEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub content: String,
    pub user_emotion: Option<Emotion>,
    pub ai_emotion: Option<Emotion>,
    pub ai_emotion_confidence: Option<f64>,
    pub ai_generated_text: Option<String>,
    /// JSONB array of extracted keyword strings.
    pub keywords: Option<serde_json::Value>,
    pub is_public: bool,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Diary entry with its attached images, used by calendar and detail views.
#[derive(Debug, Serialize)]
pub struct DiaryWithImages {
    #[serde(flatten)]
    pub diary: DiaryEntry,
    pub images: Vec<Image>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDiaryRequest {
    #[validate(length(max = 255, message = "Title must be at most 255 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Content is required"))]
    pub content: String,
    pub user_emotion: Option<Emotion>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateDiaryRequest {
    #[validate(length(max = 255, message = "Title must be at most 255 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Content must not be empty"))]
    pub content: Option<String>,
    pub user_emotion: Option<Emotion>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// GET /api/diaries query parameters.
#[derive(Debug, Deserialize)]
pub struct DiaryListQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    /// Combined title/content substring search.
    pub search: Option<String>,
    pub emotion: Option<Emotion>,
    pub is_public: Option<bool>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub sort_order: Option<SortOrder>,
}

/// GET /api/diaries/calendar query parameters. Both bounds are required.
#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}
