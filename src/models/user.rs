use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub name: String,
    pub provider: AuthProvider,
    pub profile_image_url: Option<String>,
    pub timezone: String,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq)]
#[sqlx(type_name = "auth_provider", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Local,
    Google,
    Kakao,
    Naver,
}

impl Default for AuthProvider {
    fn default() -> Self {
        Self::Local
    }
}

/// Public view of a user account. Never exposes the password hash.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub provider: AuthProvider,
    pub profile_image_url: Option<String>,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            provider: u.provider,
            profile_image_url: u.profile_image_url,
            timezone: u.timezone,
            created_at: u.created_at,
        }
    }
}

/// PUT /api/me
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 500, message = "Profile image URL too long"))]
    pub profile_image_url: Option<String>,
    #[validate(length(max = 64, message = "Timezone too long"))]
    pub timezone: Option<String>,
}
