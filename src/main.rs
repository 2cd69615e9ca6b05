use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod auth;
mod config;
mod crypto;
mod db;
mod dto;
mod error;
mod handlers;
mod models;
mod services;

use auth::rate_limit::RateLimitState;
use config::Config;
use crypto::FieldCipher;
use services::ai::AiClient;
use services::fcm::FcmClient;
use services::storage::StorageClient;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub rate_limiter: RateLimitState,
    pub cipher: Arc<FieldCipher>,
    pub fcm: Arc<FcmClient>,
    pub storage: Arc<StorageClient>,
    pub ai: Arc<AiClient>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "saegim_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Config::from_env();
    let config = Arc::new(config);

    // Database
    let db = db::create_pool(&config.database_url).await;

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations applied");

    let storage = Arc::new(StorageClient::new(&config));
    if let Err(e) = storage.ensure_bucket().await {
        // Uploads will fail until storage comes back; everything else works.
        tracing::warn!(error = %e, "Object storage unavailable at startup");
    }

    let fcm = Arc::new(FcmClient::new(&config));
    if !fcm.enabled() {
        tracing::warn!("FCM credentials not configured, push notifications disabled");
    }

    let state = AppState {
        db,
        config: config.clone(),
        rate_limiter: RateLimitState::new(),
        cipher: Arc::new(FieldCipher::new(&config.field_encryption_key)),
        fcm,
        storage,
        ai: Arc::new(AiClient::new(&config)),
    };

    // Personalized diary reminders. Single-instance only: the loop has no
    // distributed lock, so exactly one process may run it.
    services::reminder::spawn_reminder_scheduler(state.clone());

    // Auth routes with per-IP rate limiting
    let auth_routes = Router::new()
        .route("/api/auth/signup", post(handlers::auth::signup))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route("/api/auth/restore", post(handlers::auth::restore))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::rate_limit::rate_limit_auth,
        ));

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .merge(auth_routes);

    // Image uploads need a body limit above the 15MB file cap plus
    // multipart framing overhead.
    let image_routes = Router::new()
        .route(
            "/api/diaries/:id/images",
            post(handlers::images::upload_image).get(handlers::images::list_images),
        )
        .route(
            "/api/diaries/:id/images/:image_id",
            delete(handlers::images::delete_image),
        )
        .layer(DefaultBodyLimit::max(16 * 1024 * 1024));

    let protected_routes = Router::new()
        .route("/api/me", get(handlers::auth::me))
        .route("/api/me", put(handlers::auth::update_me))
        .route("/api/me", delete(handlers::auth::withdraw))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/password", post(handlers::auth::change_password))
        // Diaries
        .route("/api/diaries", get(handlers::diaries::list_diaries))
        .route("/api/diaries", post(handlers::diaries::create_diary))
        .route(
            "/api/diaries/calendar",
            get(handlers::diaries::calendar_diaries),
        )
        .route("/api/diaries/:id", get(handlers::diaries::get_diary))
        .route("/api/diaries/:id", put(handlers::diaries::update_diary))
        .route("/api/diaries/:id", delete(handlers::diaries::delete_diary))
        .route(
            "/api/diaries/:id/analyze",
            post(handlers::diaries::analyze_diary),
        )
        .merge(image_routes)
        // Emotion statistics
        .route("/api/stats/emotions", get(handlers::stats::monthly_emotions))
        .route(
            "/api/stats/emotions/summary",
            get(handlers::stats::yearly_emotion_summary),
        )
        // Notifications
        .route(
            "/api/notifications/tokens",
            post(handlers::notifications::register_token)
                .get(handlers::notifications::list_tokens),
        )
        .route(
            "/api/notifications/tokens/:id",
            delete(handlers::notifications::delete_token),
        )
        .route(
            "/api/notifications/settings",
            get(handlers::notifications::get_settings)
                .patch(handlers::notifications::update_settings),
        )
        .route(
            "/api/notifications",
            get(handlers::notifications::list_notifications),
        )
        .route(
            "/api/notifications/:id/read",
            patch(handlers::notifications::mark_read),
        )
        .route(
            "/api/notifications/read-all",
            patch(handlers::notifications::mark_all_read),
        )
        .route(
            "/api/notifications/history",
            get(handlers::notifications::history),
        )
        .route(
            "/api/notifications/test",
            post(handlers::notifications::send_test),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    let allowed_origins: Vec<axum::http::HeaderValue> = {
        let mut origins = vec![config
            .frontend_url
            .parse::<axum::http::HeaderValue>()
            .expect("FRONTEND_URL must be a valid origin")];
        // In dev, also allow LAN access (e.g. testing from another device)
        if let Ok(extra) = std::env::var("CORS_EXTRA_ORIGINS") {
            for o in extra.split(',') {
                if let Ok(hv) = o.trim().parse::<axum::http::HeaderValue>() {
                    origins.push(hv);
                }
            }
        }
        origins
    };
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ])
        .allow_credentials(true);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listen address");
    // Use into_make_service_with_connect_info to provide client IP for rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .expect("Server error");
}
