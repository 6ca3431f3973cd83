//! Client Configuration Settings
//!
//! Configuration types for the streaming client, loaded from environment
//! variables. The credential itself comes from the application's session
//! provider; everything else has sensible defaults.

use std::time::Duration;

/// Handshake credential supplied by the application's session provider.
///
/// The `Debug` implementation redacts the token for safe logging.
#[derive(Clone)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    /// Create new credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty.
    pub fn new(token: impl Into<String>) -> Result<Self, ConfigError> {
        let token = token.into();
        if token.is_empty() {
            return Err(ConfigError::EmptyValue("feed token".to_string()));
        }
        Ok(Self { token })
    }

    /// Get the handshake token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Connection and reconnection settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Timeout for the control-endpoint handshake.
    pub handshake_timeout: Duration,
    /// Timeout for the socket-open await.
    pub connect_timeout: Duration,
    /// Fixed interval between reconnection attempts.
    pub reconnect_interval: Duration,
    /// Jitter factor applied to the reconnect interval (0 = none).
    pub reconnect_jitter: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Capacity of the event broadcast channels.
    pub event_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            reconnect_interval: Duration::from_secs(1),
            reconnect_jitter: 0.0,
            max_reconnect_attempts: 5,
            event_capacity: 1_024,
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Control endpoint used by the handshake to obtain a connection URL.
    pub control_url: String,
    /// Handshake credential.
    pub credentials: Credentials,
    /// Connection settings.
    pub stream: StreamSettings,
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// Loads a `.env` file first when one is present.
    ///
    /// Required: `MARKET_FEED_CONTROL_URL`, `MARKET_FEED_TOKEN`.
    /// Optional: `MARKET_FEED_HANDSHAKE_TIMEOUT_SECS`,
    /// `MARKET_FEED_CONNECT_TIMEOUT_SECS`,
    /// `MARKET_FEED_RECONNECT_INTERVAL_MS`, `MARKET_FEED_RECONNECT_JITTER`,
    /// `MARKET_FEED_MAX_RECONNECT_ATTEMPTS`, `MARKET_FEED_EVENT_CAPACITY`.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let control_url = require_env("MARKET_FEED_CONTROL_URL")?;
        let token = require_env("MARKET_FEED_TOKEN")?;

        let defaults = StreamSettings::default();
        let stream = StreamSettings {
            handshake_timeout: parse_env_duration_secs(
                "MARKET_FEED_HANDSHAKE_TIMEOUT_SECS",
                defaults.handshake_timeout,
            ),
            connect_timeout: parse_env_duration_secs(
                "MARKET_FEED_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout,
            ),
            reconnect_interval: parse_env_duration_millis(
                "MARKET_FEED_RECONNECT_INTERVAL_MS",
                defaults.reconnect_interval,
            ),
            reconnect_jitter: parse_env_f64("MARKET_FEED_RECONNECT_JITTER", defaults.reconnect_jitter),
            max_reconnect_attempts: parse_env_u32(
                "MARKET_FEED_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
            event_capacity: parse_env_usize("MARKET_FEED_EVENT_CAPACITY", defaults.event_capacity),
        };

        Ok(Self {
            control_url,
            credentials: Credentials::new(token)?,
            stream,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Value cannot be empty.
    #[error("{0} cannot be empty")]
    EmptyValue(String),
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    let value =
        std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stream_settings() {
        let settings = StreamSettings::default();
        assert_eq!(settings.handshake_timeout, Duration::from_secs(10));
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
        assert_eq!(settings.reconnect_interval, Duration::from_secs(1));
        assert_eq!(settings.max_reconnect_attempts, 5);
        assert!(settings.reconnect_jitter.abs() < f64::EPSILON);
    }

    #[test]
    fn credentials_reject_empty_token() {
        assert!(Credentials::new("").is_err());
    }

    #[test]
    fn credentials_debug_redacts_token() {
        let creds = Credentials::new("super-secret").unwrap();
        let debug = format!("{creds:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret"));
    }
}
