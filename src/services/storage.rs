//! S3-compatible object storage adapter (MinIO in development).
//!
//! Objects are keyed by upload date and a generated identifier:
//! `images/YYYY/MM/DD/<uuid><ext>`.

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{Datelike, NaiveDate, Utc};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

pub const MAX_UPLOAD_BYTES: usize = 15 * 1024 * 1024;

pub const ALLOWED_IMAGE_TYPES: [&str; 6] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
];

pub struct StorageClient {
    client: Client,
    bucket: String,
    /// `<endpoint>/<bucket>`, used to build and parse public object URLs.
    public_base: String,
}

impl StorageClient {
    pub fn new(config: &Config) -> Self {
        let credentials = Credentials::new(
            config.storage_access_key.clone(),
            config.storage_secret_key.clone(),
            None,
            None,
            "saegim-static",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.storage_region.clone()))
            .endpoint_url(&config.storage_endpoint)
            .credentials_provider(credentials)
            // MinIO serves buckets by path, not virtual host.
            .force_path_style(true)
            .build();

        let public_base = format!(
            "{}/{}",
            config.storage_endpoint.trim_end_matches('/'),
            config.storage_bucket
        );

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.storage_bucket.clone(),
            public_base,
        }
    }

    /// Create the bucket when it does not exist yet. Called once at startup.
    pub async fn ensure_bucket(&self) -> AppResult<()> {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            return Ok(());
        }

        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to create bucket {}: {}", self.bucket, e))
            })?;

        tracing::info!(bucket = %self.bucket, "Created object storage bucket");
        Ok(())
    }

    /// Upload an object and return its public URL.
    pub async fn upload(
        &self,
        object_key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> AppResult<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Object upload failed: {}", e)))?;

        Ok(self.object_url(object_key))
    }

    pub async fn delete(&self, object_key: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(object_key)
            .send()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Object delete failed: {}", e)))?;
        Ok(())
    }

    pub fn object_url(&self, object_key: &str) -> String {
        format!("{}/{}", self.public_base, object_key)
    }

    /// Recover the object key from a stored public URL. Returns None for
    /// URLs that do not point into this bucket.
    pub fn object_key_from_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(&format!("{}/", self.public_base))
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }

    /// Generate a date-partitioned object key for a new upload.
    pub fn object_key(&self, filename: &str) -> String {
        key_for_date(Utc::now().date_naive(), Uuid::new_v4(), filename)
    }
}

pub fn key_for_date(date: NaiveDate, file_id: Uuid, filename: &str) -> String {
    format!(
        "images/{:04}/{:02}/{:02}/{}{}",
        date.year(),
        date.month(),
        date.day(),
        file_id,
        file_extension(filename)
    )
}

/// Lowercased extension including the dot, or empty when absent.
fn file_extension(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!(".{}", ext.to_lowercase())
        }
        _ => String::new(),
    }
}

/// Enforce the upload constraints: image MIME allowlist and 15MB cap.
pub fn validate_image_upload(content_type: Option<&str>, size: usize) -> AppResult<()> {
    let content_type = content_type
        .ok_or_else(|| AppError::Validation("Only image files can be uploaded".into()))?;

    if !ALLOWED_IMAGE_TYPES.contains(&content_type) {
        return Err(AppError::Validation(format!(
            "Unsupported file type '{}'. Allowed: {}",
            content_type,
            ALLOWED_IMAGE_TYPES.join(", ")
        )));
    }

    if size > MAX_UPLOAD_BYTES {
        return Err(AppError::PayloadTooLarge(
            "File exceeds the 15MB upload limit".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout_is_date_partitioned() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        let id = Uuid::nil();
        let key = key_for_date(date, id, "selfie.JPG");
        assert_eq!(
            key,
            "images/2025/03/07/00000000-0000-0000-0000-000000000000.jpg"
        );
    }

    #[test]
    fn test_key_without_extension() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        let key = key_for_date(date, Uuid::nil(), "noext");
        assert!(key.ends_with("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_file_extension_edge_cases() {
        assert_eq!(file_extension("a.PNG"), ".png");
        assert_eq!(file_extension("archive.tar.gz"), ".gz");
        assert_eq!(file_extension(".hidden"), "");
        assert_eq!(file_extension("plain"), "");
    }

    #[test]
    fn test_validate_rejects_non_image() {
        assert!(validate_image_upload(Some("application/pdf"), 100).is_err());
        assert!(validate_image_upload(None, 100).is_err());
    }

    #[test]
    fn test_validate_enforces_size_cap() {
        assert!(validate_image_upload(Some("image/png"), MAX_UPLOAD_BYTES).is_ok());
        assert!(validate_image_upload(Some("image/png"), MAX_UPLOAD_BYTES + 1).is_err());
    }

    #[test]
    fn test_object_key_from_url_round_trip() {
        let config = crate::config::Config {
            database_url: String::new(),
            host: String::new(),
            port: 0,
            frontend_url: String::new(),
            jwt_secret: String::new(),
            jwt_access_ttl_secs: 0,
            jwt_refresh_ttl_secs: 0,
            field_encryption_key: String::new(),
            fcm_project_id: String::new(),
            fcm_client_email: String::new(),
            fcm_private_key: String::new(),
            ai_api_url: String::new(),
            ai_api_key: String::new(),
            ai_model: String::new(),
            storage_endpoint: "http://localhost:9000".into(),
            storage_access_key: "minio".into(),
            storage_secret_key: "minio123".into(),
            storage_bucket: "saegim-images".into(),
            storage_region: "us-east-1".into(),
            reminder_tick_secs: 60,
        };
        let storage = StorageClient::new(&config);

        let url = storage.object_url("images/2025/03/07/abc.png");
        assert_eq!(url, "http://localhost:9000/saegim-images/images/2025/03/07/abc.png");
        assert_eq!(
            storage.object_key_from_url(&url).as_deref(),
            Some("images/2025/03/07/abc.png")
        );
        assert_eq!(storage.object_key_from_url("http://elsewhere/x"), None);
    }
}
