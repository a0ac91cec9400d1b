//! Room sync configuration.
//!
//! Configuration is loaded from environment variables into an explicit
//! object that is passed to session initialization. The API key is
//! redacted in Debug output.

use crate::media::MediaKinds;
use common::join_token::{JoinTokenConfig, DEFAULT_API_BASE_URL};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default opaque caller context sent with session initialization.
pub const DEFAULT_CLIENT_CONTEXT: &str = r#"{"id":99999,"username":"Rust Client"}"#;

/// Default session log verbosity.
pub const DEFAULT_LOG_LEVEL: &str = "debug";

/// Default client token lifetime in seconds.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 600;

/// Default refresh token lifetime in seconds.
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: u64 = 3600;

/// Default capacity of the session callback channel.
pub const DEFAULT_CALLBACK_BUFFER: usize = 256;

/// Accepted log levels.
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Room sync configuration.
#[derive(Clone)]
pub struct Config {
    /// Room to join.
    pub room_id: String,

    /// Account API key used to mint join tokens.
    /// Protected by `SecretString` to prevent accidental logging.
    pub api_key: SecretString,

    /// Rooms API base URL (default: `https://api.telnyx.com`).
    pub api_base_url: String,

    /// Opaque caller context (free-form metadata string).
    pub client_context: String,

    /// Log verbosity for the session and the local subscriber.
    pub log_level: String,

    /// Requested client token lifetime (default: 600s).
    pub token_ttl_secs: u64,

    /// Requested refresh token lifetime (default: 3600s).
    pub refresh_token_ttl_secs: u64,

    /// Media kinds requested when subscribing (default: audio and video).
    pub subscribe_kinds: MediaKinds,

    /// Capacity of the session callback channel (default: 256).
    pub callback_buffer: usize,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("room_id", &self.room_id)
            .field("api_key", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("client_context", &self.client_context)
            .field("log_level", &self.log_level)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("refresh_token_ttl_secs", &self.refresh_token_ttl_secs)
            .field("subscribe_kinds", &self.subscribe_kinds)
            .field("callback_buffer", &self.callback_buffer)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let room_id = required(vars, "ROOM_ID")?;
        let api_key = SecretString::from(required(vars, "ROOM_API_KEY")?);

        let api_base_url = vars
            .get("ROOM_API_BASE_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let client_context = vars
            .get("ROOM_CLIENT_CONTEXT")
            .cloned()
            .unwrap_or_else(|| DEFAULT_CLIENT_CONTEXT.to_string());

        let log_level = vars
            .get("ROOM_LOG_LEVEL")
            .map(|s| s.trim().to_ascii_lowercase())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        if !LOG_LEVELS.contains(&log_level.as_str()) {
            return Err(ConfigError::InvalidValue(format!(
                "ROOM_LOG_LEVEL must be one of {LOG_LEVELS:?}, got '{log_level}'"
            )));
        }

        let token_ttl_secs = positive(vars, "ROOM_TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?;
        let refresh_token_ttl_secs = positive(
            vars,
            "ROOM_REFRESH_TOKEN_TTL_SECS",
            DEFAULT_REFRESH_TOKEN_TTL_SECS,
        )?;

        let subscribe_kinds = match vars.get("ROOM_SUBSCRIBE_KINDS") {
            Some(raw) => raw
                .parse::<MediaKinds>()
                .map_err(|e| ConfigError::InvalidValue(format!("ROOM_SUBSCRIBE_KINDS: {e}")))?,
            None => MediaKinds::default(),
        };

        let callback_buffer = positive(vars, "ROOM_CALLBACK_BUFFER", DEFAULT_CALLBACK_BUFFER)?;

        Ok(Config {
            room_id,
            api_key,
            api_base_url,
            client_context,
            log_level,
            token_ttl_secs,
            refresh_token_ttl_secs,
            subscribe_kinds,
            callback_buffer,
        })
    }

    /// Join token request derived from this configuration.
    #[must_use]
    pub fn join_token_config(&self) -> JoinTokenConfig {
        JoinTokenConfig::new(self.room_id.clone(), self.api_key.clone())
            .with_api_base_url(self.api_base_url.clone())
            .with_ttls(
                Duration::from_secs(self.token_ttl_secs),
                Duration::from_secs(self.refresh_token_ttl_secs),
            )
    }
}

/// Read a required variable; empty values count as missing.
fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// Read an optional positive integer, falling back to `default` when unset.
fn positive<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
{
    let Some(raw) = vars.get(name) else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value != T::default() => Ok(value),
        _ => Err(ConfigError::InvalidValue(format!(
            "{name} must be a positive integer, got '{raw}'"
        ))),
    }
}
