use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::dto::{ApiResponse, DeleteResponse, PageQuery, PagedResponse, PaginationInfo};
use crate::error::{AppError, AppResult};
use crate::handlers::stats::{erase_emotion, record_emotion};
use crate::models::diary::{
    CalendarQuery, CreateDiaryRequest, DiaryEntry, DiaryListQuery, DiaryWithImages, SortOrder,
    UpdateDiaryRequest,
};
use crate::models::image::Image;
use crate::services::notifier;
use crate::AppState;

/// Calendar queries are bounded to roughly a year.
const MAX_CALENDAR_RANGE_DAYS: i64 = 366;

/// Shared filter clause for listing and counting. All filters are optional
/// and collapse to TRUE when their bind is NULL.
const LIST_FILTERS: &str = r#"
    WHERE user_id = $1 AND deleted_at IS NULL
      AND ($2::text IS NULL OR title ILIKE '%' || $2 || '%' OR content ILIKE '%' || $2 || '%')
      AND ($3::emotion IS NULL OR user_emotion = $3)
      AND ($4::boolean IS NULL OR is_public = $4)
      AND ($5::date IS NULL OR created_at::date >= $5)
      AND ($6::date IS NULL OR created_at::date <= $6)
"#;

pub async fn list_diaries(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<DiaryListQuery>,
) -> AppResult<Json<PagedResponse<DiaryEntry>>> {
    let pagination = PageQuery {
        page: query.page,
        page_size: query.page_size,
    };
    let (page, page_size) = pagination.clamp();
    let sort = query.sort_order.unwrap_or(SortOrder::Desc);

    let count_sql = format!("SELECT COUNT(*) FROM diaries {LIST_FILTERS}");
    let total_items = sqlx::query_scalar::<_, i64>(&count_sql)
        .bind(auth_user.id)
        .bind(&query.search)
        .bind(query.emotion)
        .bind(query.is_public)
        .bind(query.start_date)
        .bind(query.end_date)
        .fetch_one(&state.db)
        .await?;

    let list_sql = format!(
        "SELECT * FROM diaries {LIST_FILTERS} ORDER BY created_at {} LIMIT $7 OFFSET $8",
        sort.sql()
    );
    let diaries = sqlx::query_as::<_, DiaryEntry>(&list_sql)
        .bind(auth_user.id)
        .bind(&query.search)
        .bind(query.emotion)
        .bind(query.is_public)
        .bind(query.start_date)
        .bind(query.end_date)
        .bind(page_size)
        .bind(pagination.offset())
        .fetch_all(&state.db)
        .await?;

    Ok(Json(PagedResponse::new(
        diaries,
        PaginationInfo::new(page, page_size, total_items),
    )))
}

pub async fn calendar_diaries(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<CalendarQuery>,
) -> AppResult<Json<ApiResponse<Vec<DiaryWithImages>>>> {
    if query.end_date < query.start_date {
        return Err(AppError::Validation(
            "end_date must not precede start_date".into(),
        ));
    }
    if (query.end_date - query.start_date).num_days() > MAX_CALENDAR_RANGE_DAYS {
        return Err(AppError::Validation(format!(
            "Date range must be at most {MAX_CALENDAR_RANGE_DAYS} days"
        )));
    }

    let diaries = sqlx::query_as::<_, DiaryEntry>(
        r#"
        SELECT * FROM diaries
        WHERE user_id = $1 AND deleted_at IS NULL
          AND created_at::date >= $2 AND created_at::date <= $3
        ORDER BY created_at DESC
        "#,
    )
    .bind(auth_user.id)
    .bind(query.start_date)
    .bind(query.end_date)
    .fetch_all(&state.db)
    .await?;

    let entries = attach_images(&state, diaries).await?;
    let count = entries.len();
    Ok(Json(ApiResponse::with_message(
        entries,
        format!("{count} entries in range"),
    )))
}

pub async fn get_diary(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(diary_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<DiaryWithImages>>> {
    let diary = fetch_owned_diary(&state, diary_id, auth_user.id).await?;

    let images = sqlx::query_as::<_, Image>(
        "SELECT * FROM images WHERE diary_id = $1 ORDER BY created_at ASC",
    )
    .bind(diary.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::ok(DiaryWithImages { diary, images })))
}

pub async fn create_diary(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<CreateDiaryRequest>,
) -> AppResult<Json<ApiResponse<DiaryEntry>>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let diary = sqlx::query_as::<_, DiaryEntry>(
        r#"
        INSERT INTO diaries (id, user_id, title, content, user_emotion, is_public)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth_user.id)
    .bind(&body.title)
    .bind(&body.content)
    .bind(body.user_emotion)
    .bind(body.is_public.unwrap_or(false))
    .fetch_one(&state.db)
    .await?;

    if let Some(emotion) = diary.user_emotion {
        record_emotion(&state.db, auth_user.id, diary.created_at.date_naive(), emotion).await?;
    }

    Ok(Json(ApiResponse::with_message(diary, "Diary created")))
}

pub async fn update_diary(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(diary_id): Path<Uuid>,
    Json(body): Json<UpdateDiaryRequest>,
) -> AppResult<Json<ApiResponse<DiaryEntry>>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let existing = fetch_owned_diary(&state, diary_id, auth_user.id).await?;

    let diary = sqlx::query_as::<_, DiaryEntry>(
        r#"
        UPDATE diaries SET
            title = COALESCE($3, title),
            content = COALESCE($4, content),
            user_emotion = COALESCE($5, user_emotion),
            is_public = COALESCE($6, is_public),
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(diary_id)
    .bind(auth_user.id)
    .bind(&body.title)
    .bind(&body.content)
    .bind(body.user_emotion)
    .bind(body.is_public)
    .fetch_one(&state.db)
    .await?;

    // Keep the monthly counters in step with a retag.
    if let Some(new_emotion) = body.user_emotion {
        if existing.user_emotion != Some(new_emotion) {
            let bucket = existing.created_at.date_naive();
            if let Some(old_emotion) = existing.user_emotion {
                erase_emotion(&state.db, auth_user.id, bucket, old_emotion).await?;
            }
            record_emotion(&state.db, auth_user.id, bucket, new_emotion).await?;
        }
    }

    Ok(Json(ApiResponse::with_message(diary, "Diary updated")))
}

/// Soft delete: flagged, never removed.
pub async fn delete_diary(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(diary_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<DeleteResponse>>> {
    let existing = fetch_owned_diary(&state, diary_id, auth_user.id).await?;

    sqlx::query(
        "UPDATE diaries SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND user_id = $2",
    )
    .bind(diary_id)
    .bind(auth_user.id)
    .execute(&state.db)
    .await?;

    if let Some(emotion) = existing.user_emotion {
        erase_emotion(&state.db, auth_user.id, existing.created_at.date_naive(), emotion).await?;
    }

    Ok(Json(ApiResponse::ok(DeleteResponse {
        deleted: true,
        id: diary_id,
    })))
}

/// Run the AI pipeline over the entry and persist the result.
pub async fn analyze_diary(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(diary_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<DiaryEntry>>> {
    let existing = fetch_owned_diary(&state, diary_id, auth_user.id).await?;

    let analysis = state.ai.analyze(&existing.content).await;

    let diary = sqlx::query_as::<_, DiaryEntry>(
        r#"
        UPDATE diaries SET
            ai_emotion = $3,
            ai_emotion_confidence = $4,
            ai_generated_text = $5,
            keywords = $6,
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(diary_id)
    .bind(auth_user.id)
    .bind(analysis.emotion)
    .bind(analysis.confidence)
    .bind(&analysis.generated_text)
    .bind(serde_json::json!(analysis.keywords))
    .fetch_one(&state.db)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO ai_usage_logs (id, user_id, diary_id, api_type, model, tokens_used)
        VALUES ($1, $2, $3, 'integrated_analysis', $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth_user.id)
    .bind(diary_id)
    .bind(state.ai.model())
    .bind(analysis.tokens_used)
    .execute(&state.db)
    .await?;

    // Notification failures must not fail the analysis itself.
    if let Err(e) = notifier::send_ai_complete(
        &state,
        auth_user.id,
        diary_id,
        diary.title.as_deref(),
    )
    .await
    {
        tracing::warn!(diary_id = %diary_id, error = %e, "AI-complete notification failed");
    }

    Ok(Json(ApiResponse::with_message(diary, "Analysis complete")))
}

async fn fetch_owned_diary(
    state: &AppState,
    diary_id: Uuid,
    user_id: Uuid,
) -> AppResult<DiaryEntry> {
    sqlx::query_as::<_, DiaryEntry>(
        "SELECT * FROM diaries WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
    )
    .bind(diary_id)
    .bind(user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Diary not found".into()))
}

async fn attach_images(
    state: &AppState,
    diaries: Vec<DiaryEntry>,
) -> AppResult<Vec<DiaryWithImages>> {
    if diaries.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = diaries.iter().map(|d| d.id).collect();
    let images = sqlx::query_as::<_, Image>(
        "SELECT * FROM images WHERE diary_id = ANY($1) ORDER BY created_at ASC",
    )
    .bind(&ids)
    .fetch_all(&state.db)
    .await?;

    let mut by_diary: HashMap<Uuid, Vec<Image>> = HashMap::new();
    for image in images {
        by_diary.entry(image.diary_id).or_default().push(image);
    }

    Ok(diaries
        .into_iter()
        .map(|diary| {
            let images = by_diary.remove(&diary.id).unwrap_or_default();
            DiaryWithImages { diary, images }
        })
        .collect())
}
