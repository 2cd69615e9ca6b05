use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::diary::Emotion;

/// Per-user monthly emotion counter, maintained incrementally as diary
/// entries are created, retagged, and soft-deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmotionStat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub year: i32,
    pub month: i32,
    pub emotion: Emotion,
    pub count: i32,
}

/// GET /api/stats/emotions query parameters.
#[derive(Debug, Deserialize)]
pub struct EmotionStatsQuery {
    pub year: i32,
    pub month: i32,
}

/// GET /api/stats/emotions/summary query parameters.
#[derive(Debug, Deserialize)]
pub struct EmotionSummaryQuery {
    pub year: i32,
}
