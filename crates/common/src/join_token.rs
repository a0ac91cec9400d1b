//! Room join token acquisition.
//!
//! Before a client can initialize a media session it needs a short-lived
//! client token minted by the rooms API. The request is authenticated with
//! the account API key and asks for a token plus a refresh token with
//! caller-chosen lifetimes:
//!
//! ```text
//! POST {api_base_url}/v2/rooms/{room_id}/actions/generate_join_client_token
//! Authorization: Bearer <api key>
//! {"refresh_token_ttl_secs": 3600, "token_ttl_secs": 600}
//!
//! 200 {"data": {"token": "...", "refresh_token": "...", ...}}
//! ```
//!
//! A failed acquisition is fatal to session start, so [`fetch_join_token`]
//! makes exactly one attempt and returns the error to the caller instead of
//! retrying in the background.
//!
//! # Security
//!
//! - The API key and both returned tokens are `SecretString`s (never logged)
//! - Response bodies of rejected requests are only logged at trace level

use crate::secret::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, trace, warn};

// =============================================================================
// Constants
// =============================================================================

/// Default rooms API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.telnyx.com";

/// Default client token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(600);

/// Default refresh token lifetime.
pub const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while acquiring a join token.
#[derive(Error, Debug, Clone)]
pub enum JoinTokenError {
    /// HTTP transport error or unexpected status.
    #[error("HTTP client error: {0}")]
    HttpError(String),

    /// API key rejected by the rooms API (401, 403).
    #[error("Authentication rejected: {0}")]
    AuthenticationRejected(String),

    /// Response body missing or malformed.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a join token request.
#[derive(Clone)]
pub struct JoinTokenConfig {
    /// Rooms API base URL (e.g., `https://api.telnyx.com`).
    pub api_base_url: String,

    /// Room to mint the token for.
    pub room_id: String,

    /// Account API key, sent as a bearer credential.
    pub api_key: SecretString,

    /// Requested client token lifetime.
    pub token_ttl: Duration,

    /// Requested refresh token lifetime.
    pub refresh_token_ttl: Duration,

    /// HTTP request timeout.
    pub http_timeout: Duration,
}

impl std::fmt::Debug for JoinTokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinTokenConfig")
            .field("api_base_url", &self.api_base_url)
            .field("room_id", &self.room_id)
            .field("api_key", &"[REDACTED]")
            .field("token_ttl", &self.token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl JoinTokenConfig {
    /// Create a configuration with default lifetimes against the default API.
    #[must_use]
    pub fn new(room_id: String, api_key: SecretString) -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            room_id,
            api_key,
            token_ttl: DEFAULT_TOKEN_TTL,
            refresh_token_ttl: DEFAULT_REFRESH_TOKEN_TTL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Point the request at a different API base URL.
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Set the requested token lifetimes.
    #[must_use]
    pub fn with_ttls(mut self, token_ttl: Duration, refresh_token_ttl: Duration) -> Self {
        self.token_ttl = token_ttl;
        self.refresh_token_ttl = refresh_token_ttl;
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Full URL of the token endpoint for this room.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!(
            "{}/v2/rooms/{}/actions/generate_join_client_token",
            self.api_base_url.trim_end_matches('/'),
            self.room_id
        )
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Serialize)]
struct TokenRequestBody {
    refresh_token_ttl_secs: u64,
    token_ttl_secs: u64,
}

#[derive(Deserialize)]
struct TokenResponseEnvelope {
    data: TokenResponseData,
}

#[derive(Deserialize)]
struct TokenResponseData {
    token: SecretString,
    #[serde(default)]
    refresh_token: Option<SecretString>,
    #[serde(default)]
    token_expires_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    refresh_token_expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// A minted join token.
#[derive(Debug, Clone)]
pub struct JoinToken {
    /// Client token passed to session initialization.
    pub token: SecretString,
    /// Refresh token, when the API returned one.
    pub refresh_token: Option<SecretString>,
    /// Client token expiry, when the API returned one.
    pub token_expires_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Refresh token expiry, when the API returned one.
    pub refresh_token_expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

// =============================================================================
// Acquisition
// =============================================================================

/// Request a join client token for the configured room.
///
/// # Errors
///
/// - `JoinTokenError::Configuration` - If the HTTP client cannot be built
/// - `JoinTokenError::HttpError` - Transport failure or unexpected status
/// - `JoinTokenError::AuthenticationRejected` - API key rejected (401/403)
/// - `JoinTokenError::InvalidResponse` - Body missing `data.token` or token empty
#[instrument(skip_all, fields(room_id = %config.room_id))]
pub async fn fetch_join_token(config: &JoinTokenConfig) -> Result<JoinToken, JoinTokenError> {
    let http_client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .build()
        .map_err(|e| JoinTokenError::Configuration(format!("Failed to build HTTP client: {e}")))?;

    let url = config.endpoint();

    debug!(
        target: "common.join_token",
        url = %url,
        token_ttl_secs = config.token_ttl.as_secs(),
        "Requesting join token"
    );

    let body = TokenRequestBody {
        refresh_token_ttl_secs: config.refresh_token_ttl.as_secs(),
        token_ttl_secs: config.token_ttl.as_secs(),
    };

    let response = http_client
        .post(&url)
        .bearer_auth(config.api_key.expose_secret())
        .header(reqwest::header::ACCEPT, "application/json")
        .header(reqwest::header::CACHE_CONTROL, "no-cache")
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            debug!(target: "common.join_token", error = %e, "HTTP request failed");
            JoinTokenError::HttpError(e.to_string())
        })?;

    let status = response.status();

    if status.is_success() {
        let envelope: TokenResponseEnvelope = response.json().await.map_err(|e| {
            warn!(target: "common.join_token", error = %e, "Failed to parse token response");
            JoinTokenError::InvalidResponse(e.to_string())
        })?;

        let data = envelope.data;
        if data.token.expose_secret().is_empty() {
            warn!(target: "common.join_token", "Token response carried an empty token");
            return Err(JoinTokenError::InvalidResponse("empty token".into()));
        }

        info!(
            target: "common.join_token",
            expires_at = ?data.token_expires_at,
            has_refresh_token = data.refresh_token.is_some(),
            "Join token acquired"
        );

        Ok(JoinToken {
            token: data.token,
            refresh_token: data.refresh_token,
            token_expires_at: data.token_expires_at,
            refresh_token_expires_at: data.refresh_token_expires_at,
        })
    } else if status.as_u16() == 401 || status.as_u16() == 403 {
        let body = response.text().await.unwrap_or_else(|e| {
            trace!(target: "common.join_token", error = %e, "Failed to read error response body");
            "<failed to read body>".to_string()
        });
        warn!(
            target: "common.join_token",
            status = %status,
            "API key rejected by rooms API"
        );
        trace!(
            target: "common.join_token",
            body = %body,
            "Rejection response body"
        );
        Err(JoinTokenError::AuthenticationRejected(format!(
            "Status {status}"
        )))
    } else {
        warn!(
            target: "common.join_token",
            status = %status,
            "Unexpected response from rooms API"
        );
        Err(JoinTokenError::HttpError(format!(
            "Unexpected status: {status}"
        )))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN_PATH: &str = "/v2/rooms/room-123/actions/generate_join_client_token";

    fn test_config(base_url: &str) -> JoinTokenConfig {
        JoinTokenConfig::new("room-123".to_string(), SecretString::from("test-api-key"))
            .with_api_base_url(base_url)
            .with_http_timeout(Duration::from_secs(2))
    }

    // =========================================================================
    // Configuration Tests
    // =========================================================================

    #[test]
    fn test_config_defaults() {
        let config = JoinTokenConfig::new("room".to_string(), SecretString::from("key"));

        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.token_ttl, DEFAULT_TOKEN_TTL);
        assert_eq!(config.refresh_token_ttl, DEFAULT_REFRESH_TOKEN_TTL);
        assert_eq!(config.http_timeout, DEFAULT_HTTP_TIMEOUT);
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = test_config("http://localhost:9000/");
        assert_eq!(
            config.endpoint(),
            "http://localhost:9000/v2/rooms/room-123/actions/generate_join_client_token"
        );
    }

    #[test]
    fn test_config_debug_redacts_api_key() {
        let config = JoinTokenConfig::new("room".to_string(), SecretString::from("super-secret-key"));

        let debug_str = format!("{config:?}");
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("super-secret-key"));
    }

    // =========================================================================
    // Acquisition Tests
    // =========================================================================

    #[tokio::test]
    async fn test_fetch_join_token_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(header("authorization", "Bearer test-api-key"))
            .and(header("cache-control", "no-cache"))
            .and(body_json(serde_json::json!({
                "refresh_token_ttl_secs": 3600,
                "token_ttl_secs": 600
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "token": "client-token",
                    "refresh_token": "refresh-token",
                    "token_expires_at": "2026-10-18T12:10:00Z",
                    "refresh_token_expires_at": "2026-10-18T13:00:00Z"
                }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let token = fetch_join_token(&test_config(&mock_server.uri()))
            .await
            .unwrap();

        assert_eq!(token.token.expose_secret(), "client-token");
        assert_eq!(
            token.refresh_token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("refresh-token".to_string())
        );
        assert!(token.token_expires_at.is_some());
    }

    #[tokio::test]
    async fn test_fetch_join_token_custom_ttls() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_json(serde_json::json!({
                "refresh_token_ttl_secs": 120,
                "token_ttl_secs": 60
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "token": "short-lived" }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = test_config(&mock_server.uri())
            .with_ttls(Duration::from_secs(60), Duration::from_secs(120));
        let token = fetch_join_token(&config).await.unwrap();

        assert_eq!(token.token.expose_secret(), "short-lived");
        assert!(token.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_401_authentication_rejected() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(401).set_body_string(r#"{"errors": [{"code": "10009"}]}"#),
            )
            .mount(&mock_server)
            .await;

        let result = fetch_join_token(&test_config(&mock_server.uri())).await;
        assert!(matches!(result, Err(JoinTokenError::AuthenticationRejected(_))));
    }

    #[tokio::test]
    async fn test_server_error_is_http_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let result = fetch_join_token(&test_config(&mock_server.uri())).await;
        assert!(matches!(result, Err(JoinTokenError::HttpError(msg)) if msg.contains("503")));
    }

    #[tokio::test]
    async fn test_missing_data_is_invalid_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errors": []
            })))
            .mount(&mock_server)
            .await;

        let result = fetch_join_token(&test_config(&mock_server.uri())).await;
        assert!(matches!(result, Err(JoinTokenError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_empty_token_is_invalid_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "token": "" }
            })))
            .mount(&mock_server)
            .await;

        let result = fetch_join_token(&test_config(&mock_server.uri())).await;
        assert!(matches!(result, Err(JoinTokenError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_http_error() {
        // Port 9 (discard) is not expected to be listening locally.
        let config = test_config("http://127.0.0.1:9").with_http_timeout(Duration::from_millis(500));

        let result = fetch_join_token(&config).await;
        assert!(matches!(result, Err(JoinTokenError::HttpError(_))));
    }

    #[test]
    fn test_join_token_debug_redacts() {
        let token = JoinToken {
            token: SecretString::from("very-secret-client-token"),
            refresh_token: None,
            token_expires_at: None,
            refresh_token_expires_at: None,
        };

        let debug_str = format!("{token:?}");
        assert!(!debug_str.contains("very-secret-client-token"));
    }

    #[test]
    fn test_error_display() {
        let err = JoinTokenError::AuthenticationRejected("Status 401".to_string());
        assert!(err.to_string().contains("401"));

        let err = JoinTokenError::InvalidResponse("empty token".to_string());
        assert!(err.to_string().contains("empty token"));
    }
}
