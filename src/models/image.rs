use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Image {
    pub id: Uuid,
    pub diary_id: Uuid,
    pub file_path: String,
    pub thumbnail_path: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<i32>,
    pub exif_removed: bool,
    pub created_at: DateTime<Utc>,
}
