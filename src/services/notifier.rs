//! Push fan-out: creates the in-app notification row, sends to every active
//! device token, and records one delivery history row per attempt.
//! Per-token failures are tallied, never retried.

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::notification::{DeliveryStatus, DeviceToken, NotificationKind};
use crate::AppState;

#[derive(Debug, Default)]
pub struct SendReport {
    pub success_count: usize,
    pub failure_count: usize,
    /// The user's settings disabled this notification kind.
    pub skipped: bool,
}

pub async fn send_to_user(
    state: &AppState,
    user_id: Uuid,
    kind: NotificationKind,
    title: &str,
    body: &str,
    data: serde_json::Value,
) -> AppResult<SendReport> {
    let notification_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO notifications (id, user_id, kind, title, message, data)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(kind)
    .bind(title)
    .bind(body)
    .bind(&data)
    .fetch_one(&state.db)
    .await?;

    let tokens = sqlx::query_as::<_, DeviceToken>(
        "SELECT * FROM device_tokens WHERE user_id = $1 AND is_active = true",
    )
    .bind(user_id)
    .fetch_all(&state.db)
    .await?;

    let mut report = SendReport::default();
    if tokens.is_empty() {
        tracing::debug!(user_id = %user_id, "No active device tokens, push not sent");
        return Ok(report);
    }

    for token in tokens {
        let raw_token = match state.cipher.decrypt(&token.token_cipher) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(token_id = %token.id, error = %e, "Device token decryption failed");
                report.failure_count += 1;
                record_attempt(
                    state,
                    user_id,
                    notification_id,
                    token.id,
                    kind,
                    false,
                    Some("token decryption failed".into()),
                    &data,
                )
                .await?;
                continue;
            }
        };

        let outcome = state.fcm.send(&raw_token, title, body, &data).await;

        if outcome.success {
            report.success_count += 1;
            sqlx::query("UPDATE device_tokens SET last_used_at = NOW() WHERE id = $1")
                .bind(token.id)
                .execute(&state.db)
                .await?;
        } else {
            report.failure_count += 1;
            if outcome.unregistered {
                tracing::warn!(token_id = %token.id, "Device token unregistered, deactivating");
                sqlx::query(
                    "UPDATE device_tokens SET is_active = false, updated_at = NOW() WHERE id = $1",
                )
                .bind(token.id)
                .execute(&state.db)
                .await?;
            }
        }

        record_attempt(
            state,
            user_id,
            notification_id,
            token.id,
            kind,
            outcome.success,
            outcome.error,
            &data,
        )
        .await?;
    }

    Ok(report)
}

#[allow(clippy::too_many_arguments)]
async fn record_attempt(
    state: &AppState,
    user_id: Uuid,
    notification_id: Uuid,
    device_token_id: Uuid,
    kind: NotificationKind,
    success: bool,
    error_message: Option<String>,
    data: &serde_json::Value,
) -> AppResult<()> {
    let status = if success {
        DeliveryStatus::Sent
    } else {
        DeliveryStatus::Failed
    };
    // Keep the error column bounded; full details are in the logs.
    let error_message = error_message.map(|m| m.chars().take(1000).collect::<String>());

    sqlx::query(
        r#"
        INSERT INTO notification_history
            (id, user_id, notification_id, device_token_id, kind, status, error_message, data_payload, sent_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(notification_id)
    .bind(device_token_id)
    .bind(kind)
    .bind(status)
    .bind(error_message)
    .bind(data)
    .bind(if success { Some(Utc::now()) } else { None })
    .execute(&state.db)
    .await?;

    Ok(())
}

/// Templated diary-writing reminder. Skips when the user disabled reminders
/// or push entirely; a missing settings row counts as enabled defaults.
pub async fn send_diary_reminder(state: &AppState, user_id: Uuid) -> AppResult<SendReport> {
    let enabled = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT COALESCE(
            (SELECT push_enabled AND diary_reminder_enabled
             FROM notification_settings WHERE user_id = $1),
            true)
        "#,
    )
    .bind(user_id)
    .fetch_one(&state.db)
    .await?;

    if !enabled {
        return Ok(SendReport {
            skipped: true,
            ..SendReport::default()
        });
    }

    send_to_user(
        state,
        user_id,
        NotificationKind::DiaryReminder,
        "How was your day?",
        "Take a moment to write down today's feelings.",
        serde_json::json!({ "action": "write_diary" }),
    )
    .await
}

/// Templated AI-analysis-complete notification.
pub async fn send_ai_complete(
    state: &AppState,
    user_id: Uuid,
    diary_id: Uuid,
    diary_title: Option<&str>,
) -> AppResult<SendReport> {
    let enabled = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT COALESCE(
            (SELECT push_enabled AND ai_processing_enabled
             FROM notification_settings WHERE user_id = $1),
            true)
        "#,
    )
    .bind(user_id)
    .fetch_one(&state.db)
    .await?;

    if !enabled {
        return Ok(SendReport {
            skipped: true,
            ..SendReport::default()
        });
    }

    let body = match diary_title {
        Some(title) if !title.is_empty() => {
            format!("A companion note for '{}' is ready.", title)
        }
        _ => "A companion note for your latest entry is ready.".to_string(),
    };

    send_to_user(
        state,
        user_id,
        NotificationKind::AiComplete,
        "Your entry has been read",
        &body,
        serde_json::json!({ "diary_id": diary_id, "action": "view_ai_content" }),
    )
    .await
}

/// True when a notification of this kind was successfully delivered to the
/// user within the last `hours`. Used for duplicate-send suppression.
pub async fn recently_sent(
    db: &sqlx::PgPool,
    user_id: Uuid,
    kind: NotificationKind,
    hours: i64,
) -> AppResult<bool> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM notification_history
        WHERE user_id = $1
          AND kind = $2
          AND status = 'sent'
          AND created_at > NOW() - make_interval(hours => $3::int)
        "#,
    )
    .bind(user_id)
    .bind(kind)
    .bind(hours)
    .fetch_one(db)
    .await?;

    Ok(count > 0)
}
