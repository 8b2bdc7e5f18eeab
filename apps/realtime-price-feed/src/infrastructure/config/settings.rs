//! Feed Configuration Settings
//!
//! Configuration types for the feed client, loaded from environment variables.
//! Malformed numeric values fall back to their defaults; durations above
//! [`MAX_DURATION`] are clamped to it; missing required values are errors.

use std::time::Duration;

use crate::application::services::{DEFAULT_QUEUE_CAPACITY, FeedOptions};
use crate::domain::credential::{AccessToken, Credential};
use crate::domain::feed::ReconnectConfig;
use crate::infrastructure::rest::DEFAULT_HTTP_TIMEOUT;
use crate::infrastructure::websocket::HeartbeatConfig;

/// Upper bound for any configured duration (one day).
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// WebSocket connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WebSocketSettings {
    /// Heartbeat ping interval (0 = disabled).
    pub heartbeat_interval: Duration,
    /// Silence before the connection is considered dead.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Outbound queue bound (0 = unbounded).
    pub queue_capacity: usize,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        let reconnect = ReconnectConfig::default();
        let heartbeat = HeartbeatConfig::default();
        Self {
            heartbeat_interval: heartbeat.interval,
            heartbeat_timeout: heartbeat.timeout,
            reconnect_delay_initial: reconnect.initial_delay,
            reconnect_delay_max: reconnect.max_delay,
            reconnect_delay_multiplier: reconnect.multiplier,
            max_reconnect_attempts: reconnect.max_attempts,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Complete feed client configuration.
#[derive(Clone, PartialEq)]
pub struct FeedConfig {
    /// Realtime feed endpoint (`ws://` or `wss://`).
    pub ws_url: String,
    /// REST API base URL, if the REST client is used.
    pub api_base_url: Option<String>,
    /// Static access token, if provided.
    pub access_token: Option<AccessToken>,
    /// WebSocket connection settings.
    pub websocket: WebSocketSettings,
    /// REST request timeout.
    pub http_timeout: Duration,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl std::fmt::Debug for FeedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedConfig")
            .field("ws_url", &self.ws_url)
            .field("api_base_url", &self.api_base_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("websocket", &self.websocket)
            .field("http_timeout", &self.http_timeout)
            .field("metrics_port", &self.metrics_port)
            .finish()
    }
}

impl FeedConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `PRICE_FEED_WS_URL` is missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if `PRICE_FEED_WS_URL` is missing or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let ws_url = env
            .get("PRICE_FEED_WS_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("PRICE_FEED_WS_URL".to_string()))?;
        if ws_url.trim().is_empty() {
            return Err(ConfigError::EmptyValue("PRICE_FEED_WS_URL".to_string()));
        }

        let api_base_url = env
            .get("PRICE_FEED_API_BASE_URL")
            .filter(|url| !url.trim().is_empty());

        let access_token = env
            .get("PRICE_FEED_ACCESS_TOKEN")
            .and_then(|token| AccessToken::new(token).ok());

        let defaults = WebSocketSettings::default();
        let websocket = WebSocketSettings {
            heartbeat_interval: env.duration_secs(
                "PRICE_FEED_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval,
            ),
            heartbeat_timeout: env.duration_secs(
                "PRICE_FEED_HEARTBEAT_TIMEOUT_SECS",
                defaults.heartbeat_timeout,
            ),
            reconnect_delay_initial: env.duration_millis(
                "PRICE_FEED_RECONNECT_DELAY_INITIAL_MS",
                defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: env.duration_millis(
                "PRICE_FEED_RECONNECT_DELAY_MAX_MS",
                defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: env
                .parse::<f64>("PRICE_FEED_RECONNECT_DELAY_MULTIPLIER")
                .filter(|m| m.is_finite() && *m >= 1.0)
                .unwrap_or(defaults.reconnect_delay_multiplier),
            max_reconnect_attempts: env
                .parse("PRICE_FEED_MAX_RECONNECT_ATTEMPTS")
                .unwrap_or(defaults.max_reconnect_attempts),
            queue_capacity: env
                .parse("PRICE_FEED_QUEUE_CAPACITY")
                .unwrap_or(defaults.queue_capacity),
        };

        Ok(Self {
            ws_url,
            api_base_url,
            access_token,
            websocket,
            http_timeout: env.duration_secs("PRICE_FEED_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT),
            metrics_port: env.parse("PRICE_FEED_METRICS_PORT").unwrap_or(0),
        })
    }

    /// Reconnect policy and queue bound for the feed driver.
    #[must_use]
    pub fn feed_options(&self) -> FeedOptions {
        FeedOptions {
            reconnect: ReconnectConfig {
                initial_delay: self.websocket.reconnect_delay_initial,
                max_delay: self.websocket.reconnect_delay_max,
                multiplier: self.websocket.reconnect_delay_multiplier,
                jitter_factor: 0.0,
                max_attempts: self.websocket.max_reconnect_attempts,
            },
            queue_capacity: self.websocket.queue_capacity,
        }
    }

    /// Heartbeat settings for the WebSocket transport.
    #[must_use]
    pub const fn heartbeat(&self) -> HeartbeatConfig {
        HeartbeatConfig::new(
            self.websocket.heartbeat_interval,
            self.websocket.heartbeat_timeout,
        )
    }

    /// Initial credential for hosts that take the token from configuration.
    #[must_use]
    pub fn credential(&self) -> Credential {
        self.access_token
            .clone()
            .map_or_else(Credential::signed_out, Credential::with_token)
    }

    /// REST base URL, required by the stock API client.
    ///
    /// # Errors
    ///
    /// Returns an error if `PRICE_FEED_API_BASE_URL` was not set.
    pub fn require_api_base_url(&self) -> Result<&str, ConfigError> {
        self.api_base_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("PRICE_FEED_API_BASE_URL".to_string()))
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

/// Key lookup with typed parsing helpers.
struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.parse::<u64>(key)
            .map_or(default, |secs| clamp_duration(key, Duration::from_secs(secs)))
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.parse::<u64>(key)
            .map_or(default, |millis| clamp_duration(key, Duration::from_millis(millis)))
    }
}

fn clamp_duration(key: &str, value: Duration) -> Duration {
    if value > MAX_DURATION {
        tracing::warn!(
            key,
            value_secs = value.as_secs(),
            max_secs = MAX_DURATION.as_secs(),
            "Configured duration too large, clamping"
        );
        return MAX_DURATION;
    }
    value
}
