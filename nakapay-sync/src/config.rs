//! Synchronization configuration.
//!
//! This module defines the TOML-deserializable [`SyncConfig`]. Every option has
//! a default, so an empty document yields a polling-only configuration.
//!
//! ```toml
//! base_url = "https://shop.example.com"
//! poll_interval_ms = 2000
//! countdown_budget_secs = 3600
//!
//! use_pubsub = true
//! pubsub_auth_url = "/api/ably-token"
//!
//! [http]
//! timeout_secs = 15
//! ```

use std::{fmt, path::Path, time::Duration};

use serde::Deserialize;
use url::Url;

use crate::{
    error::{Result, SyncError},
    transport::config::{HttpConfig, ReconnectConfig},
};

/// Root configuration for payment creation and status synchronization.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Origin that relative endpoints are resolved against.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Payment creation endpoint.
    #[serde(default = "default_create_endpoint")]
    pub create_endpoint: String,

    /// Prefer the pub/sub transport.
    #[serde(default)]
    pub use_pubsub: bool,

    /// Token endpoint for pub/sub authentication. Receives `?paymentId=`.
    #[serde(default)]
    pub pubsub_auth_url: Option<String>,

    /// Pre-shared pub/sub key. Prefer `pubsub_auth_url`.
    #[serde(default)]
    pub pubsub_key: Option<String>,

    /// Environment variable holding the pre-shared pub/sub key.
    #[serde(default)]
    pub pubsub_key_env: Option<String>,

    /// Realtime WebSocket endpoint of the pub/sub service.
    #[serde(default = "default_pubsub_realtime_url")]
    pub pubsub_realtime_url: String,

    /// Prefer the socket transport.
    #[serde(default)]
    pub use_socket: bool,

    /// Socket server URL (`ws://`, `wss://`, `http://` or `https://`).
    #[serde(default)]
    pub socket_url: Option<String>,

    /// Prefer the server-sent events transport.
    #[serde(default)]
    pub use_server_stream: bool,

    /// Server-sent events endpoint. Receives `?paymentId=`.
    #[serde(default = "default_stream_endpoint")]
    pub stream_endpoint: String,

    /// Polling interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Polling status endpoint; the payment id is appended as a path segment.
    #[serde(default = "default_status_endpoint")]
    pub status_endpoint: String,

    /// Seconds a payment may stay pending before it is expired locally.
    #[serde(default = "default_countdown_budget_secs")]
    pub countdown_budget_secs: u64,

    /// HTTP client settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Reconnect backoff for push transports.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            create_endpoint: default_create_endpoint(),
            use_pubsub: false,
            pubsub_auth_url: None,
            pubsub_key: None,
            pubsub_key_env: None,
            pubsub_realtime_url: default_pubsub_realtime_url(),
            use_socket: false,
            socket_url: None,
            use_server_stream: false,
            stream_endpoint: default_stream_endpoint(),
            poll_interval_ms: default_poll_interval_ms(),
            status_endpoint: default_status_endpoint(),
            countdown_budget_secs: default_countdown_budget_secs(),
            http: HttpConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// How the pub/sub transport authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum PubSubAuth {
    /// Short-lived token fetched from an auth endpoint per payment.
    TokenUrl(String),
    /// Pre-shared key.
    Key(String),
}

impl fmt::Debug for PubSubAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenUrl(url) => f.debug_tuple("TokenUrl").field(url).finish(),
            Self::Key(_) => f.debug_tuple("Key").field(&"<redacted>").finish(),
        }
    }
}

impl SyncConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if parsing or validation fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use nakapay_sync::config::SyncConfig;
    ///
    /// let config = SyncConfig::from_toml("poll_interval_ms = 1500").unwrap();
    /// assert_eq!(config.poll_interval_ms, 1500);
    /// assert_eq!(config.status_endpoint, "/api/payment-status");
    /// ```
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| SyncError::InvalidConfig(format!("invalid TOML config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or the configuration is invalid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SyncError::InvalidConfig(format!("cannot read config file: {e}")))?;
        Self::from_toml(&content)
    }

    /// Validates option ranges and URL syntax.
    ///
    /// Missing transport prerequisites are not errors; the selector falls
    /// through to the next transport instead.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] naming the first offending option.
    pub fn validate(&self) -> Result<()> {
        if !(100..=60_000).contains(&self.poll_interval_ms) {
            return Err(SyncError::InvalidConfig(
                "poll_interval_ms must be between 100 and 60000".to_owned(),
            ));
        }
        if !(1..=86_400).contains(&self.countdown_budget_secs) {
            return Err(SyncError::InvalidConfig(
                "countdown_budget_secs must be between 1 and 86400".to_owned(),
            ));
        }
        if let Some(base_url) = &self.base_url {
            let url = Url::parse(base_url).map_err(|e| {
                SyncError::InvalidConfig(format!("invalid base_url '{base_url}': {e}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(SyncError::InvalidConfig(format!(
                    "base_url must use http or https, got: {}",
                    url.scheme()
                )));
            }
        }
        if let Some(socket_url) = &self.socket_url {
            let url = Url::parse(socket_url).map_err(|e| {
                SyncError::InvalidConfig(format!("invalid socket_url '{socket_url}': {e}"))
            })?;
            if !matches!(url.scheme(), "ws" | "wss" | "http" | "https") {
                return Err(SyncError::InvalidConfig(format!(
                    "socket_url must use ws, wss, http or https, got: {}",
                    url.scheme()
                )));
            }
        }
        Url::parse(&self.pubsub_realtime_url).map_err(|e| {
            SyncError::InvalidConfig(format!(
                "invalid pubsub_realtime_url '{}': {e}",
                self.pubsub_realtime_url
            ))
        })?;
        if let Some(name) = &self.pubsub_key_env {
            validate_env_var_name(name)?;
        }
        self.http.validate()?;
        self.reconnect.validate()?;
        Ok(())
    }

    /// Polling interval as Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Resolves an endpoint to an absolute URL.
    ///
    /// Absolute endpoints are returned unchanged; relative ones are joined onto
    /// `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidUrl`] if the endpoint is relative and no
    /// `base_url` is configured, or if joining fails.
    pub fn resolve(&self, endpoint: &str) -> Result<Url> {
        if let Ok(url) = Url::parse(endpoint) {
            return Ok(url);
        }
        let base = self.base_url.as_deref().ok_or_else(|| {
            SyncError::InvalidUrl(format!("relative endpoint '{endpoint}' requires base_url"))
        })?;
        let base = Url::parse(base)
            .map_err(|e| SyncError::InvalidUrl(format!("invalid base_url '{base}': {e}")))?;
        base.join(endpoint)
            .map_err(|e| SyncError::InvalidUrl(format!("cannot join '{endpoint}': {e}")))
    }

    /// Returns the pub/sub credentials, preferring the token endpoint over a
    /// pre-shared key. The key is read from `pubsub_key`, then from the
    /// environment variable named by `pubsub_key_env`.
    #[must_use]
    pub fn pubsub_auth(&self) -> Option<PubSubAuth> {
        if let Some(auth_url) = self.pubsub_auth_url.as_ref().filter(|u| !u.is_empty()) {
            return Some(PubSubAuth::TokenUrl(auth_url.clone()));
        }
        if let Some(key) = self.pubsub_key.as_ref().filter(|k| !k.is_empty()) {
            return Some(PubSubAuth::Key(key.clone()));
        }
        self.pubsub_key_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.is_empty())
            .map(PubSubAuth::Key)
    }
}

/// Validates an environment variable name.
fn validate_env_var_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(SyncError::InvalidConfig(
            "pubsub_key_env cannot be empty".to_owned(),
        ));
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(SyncError::InvalidConfig(format!(
            "pubsub_key_env must start with letter or underscore: {name}"
        )));
    }
    if let Some(ch) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(SyncError::InvalidConfig(format!(
            "pubsub_key_env contains invalid character '{ch}': {name}"
        )));
    }
    Ok(())
}

fn default_create_endpoint() -> String {
    "/api/create-payment".to_owned()
}

fn default_pubsub_realtime_url() -> String {
    "wss://realtime.ably.io".to_owned()
}

fn default_stream_endpoint() -> String {
    "/api/payments/stream".to_owned()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_status_endpoint() -> String {
    "/api/payment-status".to_owned()
}

fn default_countdown_budget_secs() -> u64 {
    3600
}
