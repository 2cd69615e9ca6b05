use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub frontend_url: String,

    pub jwt_secret: String,
    pub jwt_access_ttl_secs: i64,
    pub jwt_refresh_ttl_secs: i64,

    /// Key material for AES-256-GCM field encryption (device push tokens).
    pub field_encryption_key: String,

    // FCM HTTP v1 service account. Push is disabled when any of these are empty.
    pub fcm_project_id: String,
    pub fcm_client_email: String,
    pub fcm_private_key: String,

    pub ai_api_url: String,
    pub ai_api_key: String,
    pub ai_model: String,

    // S3-compatible object storage (MinIO in development)
    pub storage_endpoint: String,
    pub storage_access_key: String,
    pub storage_secret_key: String,
    pub storage_bucket: String,
    pub storage_region: String,

    pub reminder_tick_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()
                .expect("PORT must be a number"),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),

            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            jwt_access_ttl_secs: env::var("JWT_ACCESS_TTL_SECS")
                .unwrap_or_else(|_| "1800".into())
                .parse()
                .expect("JWT_ACCESS_TTL_SECS must be a number"),
            jwt_refresh_ttl_secs: env::var("JWT_REFRESH_TTL_SECS")
                .unwrap_or_else(|_| "2592000".into())
                .parse()
                .expect("JWT_REFRESH_TTL_SECS must be a number"),

            field_encryption_key: env::var("FIELD_ENCRYPTION_KEY")
                .expect("FIELD_ENCRYPTION_KEY must be set"),

            fcm_project_id: env::var("FCM_PROJECT_ID").unwrap_or_else(|_| String::new()),
            fcm_client_email: env::var("FCM_CLIENT_EMAIL").unwrap_or_else(|_| String::new()),
            // Private keys pasted into env files usually carry escaped newlines.
            fcm_private_key: env::var("FCM_PRIVATE_KEY")
                .unwrap_or_else(|_| String::new())
                .replace("\\n", "\n"),

            ai_api_url: env::var("AI_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".into()),
            ai_api_key: env::var("AI_API_KEY").unwrap_or_else(|_| String::new()),
            ai_model: env::var("AI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),

            storage_endpoint: env::var("STORAGE_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:9000".into()),
            storage_access_key: env::var("STORAGE_ACCESS_KEY").unwrap_or_else(|_| String::new()),
            storage_secret_key: env::var("STORAGE_SECRET_KEY").unwrap_or_else(|_| String::new()),
            storage_bucket: env::var("STORAGE_BUCKET").unwrap_or_else(|_| "saegim-images".into()),
            storage_region: env::var("STORAGE_REGION").unwrap_or_else(|_| "us-east-1".into()),

            reminder_tick_secs: env::var("REMINDER_TICK_SECS")
                .unwrap_or_else(|_| "60".into())
                .parse()
                .unwrap_or(60),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
