use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::auth::jwt::hash_token;
use crate::auth::middleware::AuthUser;
use crate::dto::{ApiResponse, DeleteResponse, PageQuery, PagedResponse, PaginationInfo};
use crate::error::{AppError, AppResult};
use crate::models::notification::{
    DeviceToken, DeviceTokenResponse, Notification, NotificationHistory, NotificationListQuery,
    NotificationSettings, RegisterTokenRequest, UpdateSettingsRequest,
};
use crate::services::notifier;
use crate::AppState;

const VALID_REMINDER_DAYS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

// ---------------------------------------------------------------------------
// Device tokens
// ---------------------------------------------------------------------------

/// Register or refresh a device push token. The raw token is stored
/// encrypted; the digest keeps (user, token) upserts idempotent.
pub async fn register_token(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<RegisterTokenRequest>,
) -> AppResult<Json<ApiResponse<DeviceTokenResponse>>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let token_digest = hash_token(&body.token);
    let token_cipher = state.cipher.encrypt(&body.token)?;
    let device_type = body.device_type.unwrap_or_default();

    let token = sqlx::query_as::<_, DeviceToken>(
        r#"
        INSERT INTO device_tokens (id, user_id, token_cipher, token_digest, device_type, device_info, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, true)
        ON CONFLICT ON CONSTRAINT uq_device_tokens_user_digest DO UPDATE SET
            token_cipher = EXCLUDED.token_cipher,
            device_type = EXCLUDED.device_type,
            device_info = EXCLUDED.device_info,
            is_active = true,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth_user.id)
    .bind(&token_cipher)
    .bind(&token_digest)
    .bind(device_type)
    .bind(&body.device_info)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ApiResponse::with_message(
        token.into(),
        "Device token registered",
    )))
}

pub async fn list_tokens(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<ApiResponse<Vec<DeviceTokenResponse>>>> {
    let tokens = sqlx::query_as::<_, DeviceToken>(
        r#"
        SELECT * FROM device_tokens
        WHERE user_id = $1 AND is_active = true
        ORDER BY created_at DESC
        "#,
    )
    .bind(auth_user.id)
    .fetch_all(&state.db)
    .await?;

    let tokens = tokens.into_iter().map(DeviceTokenResponse::from).collect();
    Ok(Json(ApiResponse::ok(tokens)))
}

pub async fn delete_token(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(token_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<DeleteResponse>>> {
    let result = sqlx::query("DELETE FROM device_tokens WHERE id = $1 AND user_id = $2")
        .bind(token_id)
        .bind(auth_user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Device token not found".into()));
    }

    Ok(Json(ApiResponse::ok(DeleteResponse {
        deleted: true,
        id: token_id,
    })))
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

pub async fn get_settings(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<ApiResponse<NotificationSettings>>> {
    let settings = ensure_settings_row(&state, auth_user.id).await?;
    Ok(Json(ApiResponse::ok(settings)))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<UpdateSettingsRequest>,
) -> AppResult<Json<ApiResponse<NotificationSettings>>> {
    if let Some(time) = body.diary_reminder_time.as_deref() {
        validate_reminder_time(time)?;
    }
    if let Some(days) = body.diary_reminder_days.as_deref() {
        validate_reminder_days(days)?;
    }

    ensure_settings_row(&state, auth_user.id).await?;

    let days_json = body
        .diary_reminder_days
        .as_ref()
        .map(|days| serde_json::json!(days));

    let settings = sqlx::query_as::<_, NotificationSettings>(
        r#"
        UPDATE notification_settings SET
            push_enabled = COALESCE($2, push_enabled),
            diary_reminder_enabled = COALESCE($3, diary_reminder_enabled),
            diary_reminder_time = COALESCE($4, diary_reminder_time),
            diary_reminder_days = COALESCE($5, diary_reminder_days),
            report_notification_enabled = COALESCE($6, report_notification_enabled),
            ai_processing_enabled = COALESCE($7, ai_processing_enabled),
            updated_at = NOW()
        WHERE user_id = $1
        RETURNING *
        "#,
    )
    .bind(auth_user.id)
    .bind(body.push_enabled)
    .bind(body.diary_reminder_enabled)
    .bind(&body.diary_reminder_time)
    .bind(days_json)
    .bind(body.report_notification_enabled)
    .bind(body.ai_processing_enabled)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ApiResponse::with_message(settings, "Settings updated")))
}

async fn ensure_settings_row(
    state: &AppState,
    user_id: Uuid,
) -> AppResult<NotificationSettings> {
    if let Some(settings) = sqlx::query_as::<_, NotificationSettings>(
        "SELECT * FROM notification_settings WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await?
    {
        return Ok(settings);
    }

    let settings = sqlx::query_as::<_, NotificationSettings>(
        r#"
        INSERT INTO notification_settings (id, user_id)
        VALUES ($1, $2)
        ON CONFLICT ON CONSTRAINT uq_notification_settings_user
            DO UPDATE SET updated_at = notification_settings.updated_at
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .fetch_one(&state.db)
    .await?;

    Ok(settings)
}

// ---------------------------------------------------------------------------
// In-app notifications
// ---------------------------------------------------------------------------

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<NotificationListQuery>,
) -> AppResult<Json<PagedResponse<Notification>>> {
    let pagination = PageQuery {
        page: query.page,
        page_size: query.page_size,
    };
    let (page, page_size) = pagination.clamp();
    let unread_only = query.unread_only.unwrap_or(false);

    let total_items = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM notifications
        WHERE user_id = $1 AND (NOT $2 OR is_read = false)
        "#,
    )
    .bind(auth_user.id)
    .bind(unread_only)
    .fetch_one(&state.db)
    .await?;

    let notifications = sqlx::query_as::<_, Notification>(
        r#"
        SELECT * FROM notifications
        WHERE user_id = $1 AND (NOT $2 OR is_read = false)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(auth_user.id)
    .bind(unread_only)
    .bind(page_size)
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(PagedResponse::new(
        notifications,
        PaginationInfo::new(page, page_size, total_items),
    )))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(notification_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Notification>>> {
    let notification = sqlx::query_as::<_, Notification>(
        r#"
        UPDATE notifications
        SET is_read = true, read_at = COALESCE(read_at, NOW()), updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(notification_id)
    .bind(auth_user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Notification not found".into()))?;

    Ok(Json(ApiResponse::ok(notification)))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let result = sqlx::query(
        r#"
        UPDATE notifications
        SET is_read = true, read_at = NOW(), updated_at = NOW()
        WHERE user_id = $1 AND is_read = false
        "#,
    )
    .bind(auth_user.id)
    .execute(&state.db)
    .await?;

    Ok(Json(ApiResponse::ok(serde_json::json!({
        "marked_read": result.rows_affected(),
    }))))
}

// ---------------------------------------------------------------------------
// Delivery history & manual send
// ---------------------------------------------------------------------------

pub async fn history(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(pagination): Query<PageQuery>,
) -> AppResult<Json<PagedResponse<NotificationHistory>>> {
    let (page, page_size) = pagination.clamp();

    let total_items = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notification_history WHERE user_id = $1",
    )
    .bind(auth_user.id)
    .fetch_one(&state.db)
    .await?;

    let rows = sqlx::query_as::<_, NotificationHistory>(
        r#"
        SELECT * FROM notification_history
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(auth_user.id)
    .bind(page_size)
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(PagedResponse::new(
        rows,
        PaginationInfo::new(page, page_size, total_items),
    )))
}

/// Fire the reminder template at the caller, bypassing the schedule.
pub async fn send_test(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let report = notifier::send_diary_reminder(&state, auth_user.id).await?;

    Ok(Json(ApiResponse::ok(serde_json::json!({
        "success_count": report.success_count,
        "failure_count": report.failure_count,
        "skipped": report.skipped,
    }))))
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Reminder times are exact `HH:MM` strings, matched verbatim by the
/// scheduler's minute slot.
fn validate_reminder_time(time: &str) -> AppResult<()> {
    let valid = time.len() == 5
        && time.as_bytes()[2] == b':'
        && matches!(time.get(..2).map(str::parse::<u8>), Some(Ok(h)) if h < 24)
        && matches!(time.get(3..).map(str::parse::<u8>), Some(Ok(m)) if m < 60);

    if valid {
        Ok(())
    } else {
        Err(AppError::Validation(
            "diary_reminder_time must be HH:MM (00:00-23:59)".into(),
        ))
    }
}

fn validate_reminder_days(days: &[String]) -> AppResult<()> {
    for day in days {
        if !VALID_REMINDER_DAYS.contains(&day.as_str()) {
            return Err(AppError::Validation(format!(
                "Invalid reminder day '{day}'. Allowed: {}",
                VALID_REMINDER_DAYS.join(", ")
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_reminder_time() {
        assert!(validate_reminder_time("00:00").is_ok());
        assert!(validate_reminder_time("21:00").is_ok());
        assert!(validate_reminder_time("23:59").is_ok());

        assert!(validate_reminder_time("24:00").is_err());
        assert!(validate_reminder_time("12:60").is_err());
        assert!(validate_reminder_time("9:00").is_err());
        assert!(validate_reminder_time("0900").is_err());
        assert!(validate_reminder_time("ab:cd").is_err());
    }

    #[test]
    fn test_validate_reminder_days() {
        let ok = vec!["mon".to_string(), "fri".to_string()];
        assert!(validate_reminder_days(&ok).is_ok());
        assert!(validate_reminder_days(&[]).is_ok());

        let bad = vec!["monday".to_string()];
        assert!(validate_reminder_days(&bad).is_err());
    }
}
