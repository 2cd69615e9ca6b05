use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{Datelike, NaiveDate};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::dto::ApiResponse;
use crate::error::{AppError, AppResult};
use crate::models::diary::Emotion;
use crate::models::emotion_stats::{EmotionStat, EmotionStatsQuery, EmotionSummaryQuery};
use crate::AppState;

pub async fn monthly_emotions(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<EmotionStatsQuery>,
) -> AppResult<Json<ApiResponse<Vec<EmotionStat>>>> {
    validate_period(query.year, Some(query.month))?;

    let stats = sqlx::query_as::<_, EmotionStat>(
        r#"
        SELECT * FROM emotion_stats
        WHERE user_id = $1 AND year = $2 AND month = $3 AND count > 0
        ORDER BY count DESC
        "#,
    )
    .bind(auth_user.id)
    .bind(query.year)
    .bind(query.month)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::ok(stats)))
}

pub async fn yearly_emotion_summary(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<EmotionSummaryQuery>,
) -> AppResult<Json<ApiResponse<Vec<EmotionStat>>>> {
    validate_period(query.year, None)?;

    let stats = sqlx::query_as::<_, EmotionStat>(
        r#"
        SELECT * FROM emotion_stats
        WHERE user_id = $1 AND year = $2 AND count > 0
        ORDER BY month ASC, count DESC
        "#,
    )
    .bind(auth_user.id)
    .bind(query.year)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::ok(stats)))
}

/// Increment the monthly counter for an emotion tag.
pub async fn record_emotion(
    db: &PgPool,
    user_id: Uuid,
    bucket: NaiveDate,
    emotion: Emotion,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO emotion_stats (id, user_id, year, month, emotion, count)
        VALUES ($1, $2, $3, $4, $5, 1)
        ON CONFLICT ON CONSTRAINT uq_emotion_stats_period
            DO UPDATE SET count = emotion_stats.count + 1
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(bucket.year())
    .bind(bucket.month() as i32)
    .bind(emotion)
    .execute(db)
    .await?;
    Ok(())
}

/// Decrement the monthly counter, clamped at zero.
pub async fn erase_emotion(
    db: &PgPool,
    user_id: Uuid,
    bucket: NaiveDate,
    emotion: Emotion,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE emotion_stats
        SET count = GREATEST(count - 1, 0)
        WHERE user_id = $1 AND year = $2 AND month = $3 AND emotion = $4
        "#,
    )
    .bind(user_id)
    .bind(bucket.year())
    .bind(bucket.month() as i32)
    .bind(emotion)
    .execute(db)
    .await?;
    Ok(())
}

fn validate_period(year: i32, month: Option<i32>) -> AppResult<()> {
    if !(2020..=2100).contains(&year) {
        return Err(AppError::Validation("Year must be between 2020 and 2100".into()));
    }
    if let Some(month) = month {
        if !(1..=12).contains(&month) {
            return Err(AppError::Validation("Month must be between 1 and 12".into()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_period_bounds() {
        assert!(validate_period(2025, Some(6)).is_ok());
        assert!(validate_period(2025, None).is_ok());
        assert!(validate_period(2019, Some(6)).is_err());
        assert!(validate_period(2101, None).is_err());
        assert!(validate_period(2025, Some(0)).is_err());
        assert!(validate_period(2025, Some(13)).is_err());
    }
}
