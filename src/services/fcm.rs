//! FCM HTTP v1 push adapter.
//!
//! Authenticates with a Google service account: a short-lived RS256 JWT
//! assertion is exchanged for an OAuth2 access token, which is cached until
//! shortly before expiry. When credentials are not configured every send
//! reports a failure outcome instead of erroring, so callers can tally it.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::Config;

const OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

pub struct FcmClient {
    http: reqwest::Client,
    project_id: String,
    client_email: String,
    private_key: String,
    cached_token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct OauthTokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Result of a single push attempt to one device token.
#[derive(Debug)]
pub struct SendOutcome {
    pub success: bool,
    /// FCM reported the device token as no longer registered.
    pub unregistered: bool,
    pub error: Option<String>,
}

impl SendOutcome {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            unregistered: false,
            error: Some(error.into()),
        }
    }
}

impl FcmClient {
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            http,
            project_id: config.fcm_project_id.clone(),
            client_email: config.fcm_client_email.clone(),
            private_key: config.fcm_private_key.clone(),
            cached_token: Mutex::new(None),
        }
    }

    pub fn enabled(&self) -> bool {
        !self.project_id.is_empty() && !self.client_email.is_empty() && !self.private_key.is_empty()
    }

    async fn access_token(&self) -> Result<String, anyhow::Error> {
        let mut cache = self.cached_token.lock().await;

        if let Some(cached) = cache.as_ref() {
            // Refresh a minute early so in-flight sends never race expiry.
            if cached.expires_at - Duration::seconds(60) > Utc::now() {
                return Ok(cached.token.clone());
            }
        }

        let now = Utc::now();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: FCM_SCOPE,
            aud: OAUTH_TOKEN_URL,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(3600)).timestamp(),
        };

        let assertion = encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &EncodingKey::from_rsa_pem(self.private_key.as_bytes())?,
        )?;

        let response = self
            .http
            .post(OAUTH_TOKEN_URL)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OAuth2 token exchange failed ({}): {}", status, body);
        }

        let token: OauthTokenResponse = response.json().await?;
        let access_token = token.access_token.clone();
        *cache = Some(CachedToken {
            token: token.access_token,
            expires_at: now + Duration::seconds(token.expires_in),
        });

        Ok(access_token)
    }

    /// Send one notification to one device token. Network and provider
    /// failures are folded into the outcome, never propagated.
    pub async fn send(
        &self,
        device_token: &str,
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> SendOutcome {
        if !self.enabled() {
            return SendOutcome::failure("FCM credentials not configured");
        }

        let access_token = match self.access_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(error = %e, "FCM access token acquisition failed");
                return SendOutcome::failure(e.to_string());
            }
        };

        let url = format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            self.project_id
        );

        let message = serde_json::json!({
            "message": {
                "token": device_token,
                "notification": { "title": title, "body": body },
                "data": stringify_data(data),
            }
        });

        let response = match self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&message)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return SendOutcome::failure(e.to_string()),
        };

        if response.status().is_success() {
            return SendOutcome {
                success: true,
                unregistered: false,
                error: None,
            };
        }

        let status = response.status();
        let body_text = response.text().await.unwrap_or_default();
        let unregistered = body_text.contains("UNREGISTERED");

        SendOutcome {
            success: false,
            unregistered,
            error: Some(format!("FCM error {}: {}", status, body_text)),
        }
    }
}

/// FCM v1 requires the data payload to be a string-to-string map.
fn stringify_data(data: &serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    let mut out = serde_json::Map::new();
    if let Some(object) = data.as_object() {
        for (key, value) in object {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.insert(key.clone(), serde_json::Value::String(text));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stringify_data_flattens_values() {
        let data = serde_json::json!({
            "action": "write_diary",
            "count": 3,
            "nested": { "a": 1 },
        });
        let out = stringify_data(&data);
        assert_eq!(out["action"], "write_diary");
        assert_eq!(out["count"], "3");
        assert_eq!(out["nested"], "{\"a\":1}");
    }

    #[test]
    fn test_stringify_data_non_object_is_empty() {
        let out = stringify_data(&serde_json::json!(null));
        assert!(out.is_empty());
    }

    #[test]
    fn test_disabled_without_credentials() {
        let config = test_config();
        let client = FcmClient::new(&config);
        assert!(!client.enabled());
    }

    fn test_config() -> crate::config::Config {
        crate::config::Config {
            database_url: String::new(),
            host: "127.0.0.1".into(),
            port: 0,
            frontend_url: String::new(),
            jwt_secret: "secret".into(),
            jwt_access_ttl_secs: 1800,
            jwt_refresh_ttl_secs: 2_592_000,
            field_encryption_key: "key".into(),
            fcm_project_id: String::new(),
            fcm_client_email: String::new(),
            fcm_private_key: String::new(),
            ai_api_url: String::new(),
            ai_api_key: String::new(),
            ai_model: String::new(),
            storage_endpoint: "http://localhost:9000".into(),
            storage_access_key: String::new(),
            storage_secret_key: String::new(),
            storage_bucket: "test".into(),
            storage_region: "us-east-1".into(),
            reminder_tick_secs: 60,
        }
    }
}
