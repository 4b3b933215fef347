//! HeyGen HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{HeyGenError, HeyGenResult};

/// Configuration for the HeyGen client.
#[derive(Debug, Clone)]
pub struct HeyGenConfig {
    /// Base URL of the HeyGen API
    pub base_url: String,
    /// API key sent in the X-Api-Key header
    pub api_key: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries for transient failures
    pub max_retries: u32,
    /// Base delay between retries
    pub retry_delay: Duration,
}

impl Default for HeyGenConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.heygen.com".to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(20),
            max_retries: 2,
            retry_delay: Duration::from_millis(250),
        }
    }
}

impl HeyGenConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("HEYGEN_BASE_URL")
                .unwrap_or_else(|_| "https://api.heygen.com".to_string()),
            api_key: std::env::var("HEYGEN_API_KEY").unwrap_or_default(),
            timeout: Duration::from_secs(
                std::env::var("HEYGEN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(20),
            ),
            max_retries: std::env::var("HEYGEN_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            retry_delay: Duration::from_millis(
                std::env::var("HEYGEN_RETRY_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(250),
            ),
        }
    }
}

/// Provider API surface used by the engine.
#[automock]
#[async_trait]
pub trait HeyGenApi: Send + Sync {
    /// Submit an avatar render. Returns the provider response payload.
    async fn submit_render(
        &self,
        avatar_id: &str,
        voice_id: &str,
        script: &str,
    ) -> HeyGenResult<Value>;

    /// Query the status of a previously submitted render.
    async fn query_status(&self, provider_video_id: &str) -> HeyGenResult<Value>;

    /// List available avatars.
    async fn list_avatars(&self) -> HeyGenResult<Value>;

    /// List available voices.
    async fn list_voices(&self) -> HeyGenResult<Value>;

    /// Create a short-lived streaming access token.
    async fn create_streaming_token(&self) -> HeyGenResult<Value>;

    /// Open a new interactive streaming session.
    async fn create_live_session(&self, params: Value) -> HeyGenResult<Value>;

    /// Close a streaming session.
    async fn end_live_session(&self, provider_session_id: &str) -> HeyGenResult<Value>;
}

/// Client for the HeyGen REST API.
pub struct HeyGenClient {
    http: Client,
    config: HeyGenConfig,
}

impl HeyGenClient {
    /// Create a new HeyGen client.
    pub fn new(config: HeyGenConfig) -> HeyGenResult<Self> {
        if config.api_key.is_empty() {
            return Err(HeyGenError::MissingApiKey);
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(HeyGenError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> HeyGenResult<Self> {
        Self::new(HeyGenConfig::from_env())
    }

    async fn get(&self, path: &str) -> HeyGenResult<Value> {
        let url = format!("{}{}", self.config.base_url, path);

        let response = self
            .with_retry(|| async {
                let response = self
                    .http
                    .get(&url)
                    .header("X-Api-Key", &self.config.api_key)
                    .send()
                    .await
                    .map_err(HeyGenError::Network)?;
                Self::reject_server_error(response).await
            })
            .await?;

        Self::parse_response(response).await
    }

    async fn post(&self, path: &str, body: &Value) -> HeyGenResult<Value> {
        let url = format!("{}{}", self.config.base_url, path);

        debug!("POST {}", url);

        let response = self
            .with_retry(|| async {
                let response = self
                    .http
                    .post(&url)
                    .header("X-Api-Key", &self.config.api_key)
                    .json(body)
                    .send()
                    .await
                    .map_err(HeyGenError::Network)?;
                Self::reject_server_error(response).await
            })
            .await?;

        Self::parse_response(response).await
    }

    /// Turn a 5xx into `Unavailable` inside the retry loop, so transient
    /// server errors are retried like network failures.
    async fn reject_server_error(response: reqwest::Response) -> HeyGenResult<reqwest::Response> {
        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(HeyGenError::Unavailable(format!("{}: {}", status, body)));
        }
        Ok(response)
    }

    async fn parse_response(response: reqwest::Response) -> HeyGenResult<Value> {
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HeyGenError::RequestFailed {
                status: status.as_u16(),
                message: body,
            });
        }

        let payload: Value = response.json().await?;

        // Error envelope: a non-100 `code` field signals a business failure
        // even on HTTP 200.
        if let Some(code) = payload.get("code").and_then(Value::as_i64) {
            if code != 100 {
                let message = payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown provider error")
                    .to_string();
                return Err(HeyGenError::Business { code, message });
            }
        }

        Ok(payload)
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> HeyGenResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = HeyGenResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_delay * 2u32.pow(attempt);
                    warn!(
                        "HeyGen request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| HeyGenError::Unavailable("retries exhausted".to_string())))
    }
}

#[async_trait]
impl HeyGenApi for HeyGenClient {
    async fn submit_render(
        &self,
        avatar_id: &str,
        voice_id: &str,
        script: &str,
    ) -> HeyGenResult<Value> {
        let body = json!({
            "video_inputs": [{
                "character": {
                    "type": "avatar",
                    "avatar_id": avatar_id,
                    "avatar_style": "normal",
                },
                "voice": {
                    "type": "text",
                    "voice_id": voice_id,
                    "input_text": script,
                },
            }],
        });

        self.post("/v2/video/generate", &body).await
    }

    async fn query_status(&self, provider_video_id: &str) -> HeyGenResult<Value> {
        let path = format!(
            "/v1/video_status.get?video_id={}",
            urlencode(provider_video_id)
        );
        self.get(&path).await
    }

    async fn list_avatars(&self) -> HeyGenResult<Value> {
        self.get("/v2/avatars").await
    }

    async fn list_voices(&self) -> HeyGenResult<Value> {
        self.get("/v2/voices").await
    }

    async fn create_streaming_token(&self) -> HeyGenResult<Value> {
        self.post("/v1/streaming.create_token", &json!({})).await
    }

    async fn create_live_session(&self, params: Value) -> HeyGenResult<Value> {
        self.post("/v1/streaming.new", &params).await
    }

    async fn end_live_session(&self, provider_session_id: &str) -> HeyGenResult<Value> {
        let body = json!({ "session_id": provider_session_id });
        self.post("/v1/streaming.stop", &body).await
    }
}

/// Minimal percent-encoding for query string values.
fn urlencode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> HeyGenConfig {
        HeyGenConfig {
            base_url,
            api_key: "test-key".to_string(),
            timeout: Duration::from_secs(5),
            max_retries: 1,
            retry_delay: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = HeyGenConfig::default();
        assert_eq!(config.base_url, "https://api.heygen.com");
        assert_eq!(config.timeout, Duration::from_secs(20));
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let result = HeyGenClient::new(HeyGenConfig::default());
        assert!(matches!(result, Err(HeyGenError::MissingApiKey)));
    }

    #[tokio::test]
    async fn test_submit_render_sends_video_inputs() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/video/generate"))
            .and(header("X-Api-Key", "test-key"))
            .and(body_partial_json(json!({
                "video_inputs": [{
                    "character": { "avatar_id": "a1" },
                    "voice": { "voice_id": "v1", "input_text": "hello" },
                }],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "video_id": "p-123" },
            })))
            .mount(&server)
            .await;

        let client = HeyGenClient::new(test_config(server.uri())).unwrap();
        let response = client.submit_render("a1", "v1", "hello").await.unwrap();
        assert_eq!(response["data"]["video_id"], "p-123");
    }

    #[tokio::test]
    async fn test_query_status_encodes_video_id() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/video_status.get"))
            .and(query_param("video_id", "p 123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "status": "processing" },
            })))
            .mount(&server)
            .await;

        let client = HeyGenClient::new(test_config(server.uri())).unwrap();
        let response = client.query_status("p 123").await.unwrap();
        assert_eq!(response["data"]["status"], "processing");
    }

    #[tokio::test]
    async fn test_business_error_code() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/avatars"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 40012,
                "message": "quota exceeded",
            })))
            .mount(&server)
            .await;

        let client = HeyGenClient::new(test_config(server.uri())).unwrap();
        let err = client.list_avatars().await.unwrap_err();
        match err {
            HeyGenError::Business { code, message } => {
                assert_eq!(code, 40012);
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("expected business error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_retried_then_succeeds() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/voices"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2/voices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "voices": [] },
            })))
            .mount(&server)
            .await;

        let client = HeyGenClient::new(test_config(server.uri())).unwrap();
        let response = client.list_voices().await.unwrap();
        assert!(response["data"]["voices"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_error_exhausts_retries() {
        let server = MockServer::start().await;

        // max_retries = 1, so exactly two attempts before giving up.
        Mock::given(method("GET"))
            .and(path("/v2/voices"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(2)
            .mount(&server)
            .await;

        let client = HeyGenClient::new(test_config(server.uri())).unwrap();
        let err = client.list_voices().await.unwrap_err();
        assert!(matches!(err, HeyGenError::Unavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/video/generate"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad avatar"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HeyGenClient::new(test_config(server.uri())).unwrap();
        let err = client.submit_render("bad", "v1", "hi").await.unwrap_err();
        assert!(matches!(err, HeyGenError::RequestFailed { status: 400, .. }));
    }
}
