use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq)]
#[sqlx(type_name = "notification_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DiaryReminder,
    ReportReady,
    AiComplete,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq)]
#[sqlx(type_name = "delivery_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq)]
#[sqlx(type_name = "device_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Web,
    Android,
    Ios,
}

impl Default for DeviceType {
    fn default() -> Self {
        Self::Web
    }
}

/// In-app notification row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationSettings {
    pub id: Uuid,
    pub user_id: Uuid,
    pub push_enabled: bool,
    pub diary_reminder_enabled: bool,
    /// Local reminder time in `HH:MM`.
    pub diary_reminder_time: String,
    /// JSONB array of `mon..sun`. NULL or empty means every day.
    pub diary_reminder_days: Option<serde_json::Value>,
    pub report_notification_enabled: bool,
    pub ai_processing_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored device push token. The raw token is kept AES-GCM encrypted;
/// only the digest participates in lookups.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_cipher: String,
    pub token_digest: String,
    pub device_type: DeviceType,
    pub device_info: Option<serde_json::Value>,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Client-facing view of a registered device token.
#[derive(Debug, Serialize)]
pub struct DeviceTokenResponse {
    pub id: Uuid,
    pub device_type: DeviceType,
    pub device_info: Option<serde_json::Value>,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<DeviceToken> for DeviceTokenResponse {
    fn from(t: DeviceToken) -> Self {
        Self {
            id: t.id,
            device_type: t.device_type,
            device_info: t.device_info,
            is_active: t.is_active,
            last_used_at: t.last_used_at,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationHistory {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_id: Option<Uuid>,
    pub device_token_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub status: DeliveryStatus,
    pub error_message: Option<String>,
    pub data_payload: Option<serde_json::Value>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// POST /api/notifications/tokens
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterTokenRequest {
    #[validate(length(min = 1, max = 4096, message = "Token is required"))]
    pub token: String,
    pub device_type: Option<DeviceType>,
    pub device_info: Option<serde_json::Value>,
}

/// PATCH /api/notifications/settings. All fields optional.
#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub push_enabled: Option<bool>,
    pub diary_reminder_enabled: Option<bool>,
    pub diary_reminder_time: Option<String>,
    pub diary_reminder_days: Option<Vec<String>>,
    pub report_notification_enabled: Option<bool>,
    pub ai_processing_enabled: Option<bool>,
}

/// GET /api/notifications query parameters.
#[derive(Debug, Deserialize)]
pub struct NotificationListQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub unread_only: Option<bool>,
}
