//! Transport tuning tables.
//!
//! These are the `[http]` and `[reconnect]` tables of the TOML configuration.
//! Which transport runs is decided by the selector from the top-level
//! [`SyncConfig`](crate::config::SyncConfig) flags, not here.

use std::time::Duration;

use serde::Deserialize;

use crate::{
    error::{Result, SyncError},
    reliability::ReconnectPolicy,
};

/// HTTP client configuration shared by polling, the server stream, the
/// pub/sub token request and payment creation.
///
/// # Examples
///
/// ```toml
/// [http]
/// timeout_secs = 15
/// connect_timeout_secs = 5
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Maximum idle connections per host.
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,

    /// Request timeout in seconds. Does not apply to the server stream body.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: default_pool_max_idle(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl HttpConfig {
    /// Validates configuration values are within acceptable bounds.
    ///
    /// # Errors
    ///
    /// Returns error if timeout values are outside valid ranges:
    /// - `timeout_secs`: must be 1-300 seconds
    /// - `connect_timeout_secs`: must be 1-60 seconds
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 || self.timeout_secs > 300 {
            return Err(SyncError::InvalidConfig(
                "http.timeout_secs must be between 1 and 300".to_owned(),
            ));
        }
        if self.connect_timeout_secs == 0 || self.connect_timeout_secs > 60 {
            return Err(SyncError::InvalidConfig(
                "http.connect_timeout_secs must be between 1 and 60".to_owned(),
            ));
        }
        Ok(())
    }

    /// Returns timeout as Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns connect timeout as Duration.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Reconnect backoff for the push transports (pub/sub, socket, server stream).
///
/// Polling does not use it; a failed poll is simply retried on the next tick.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for the delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor applied per consecutive failed attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl ReconnectConfig {
    /// Validates the backoff parameters.
    ///
    /// # Errors
    ///
    /// Returns error if `initial_delay_ms` is zero, exceeds `max_delay_ms`, or
    /// `backoff_multiplier` is below 1.0.
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "reconnect.initial_delay_ms must be positive".to_owned(),
            ));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(SyncError::InvalidConfig(
                "reconnect.initial_delay_ms must not exceed reconnect.max_delay_ms".to_owned(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(SyncError::InvalidConfig(
                "reconnect.backoff_multiplier must be at least 1.0".to_owned(),
            ));
        }
        Ok(())
    }

    /// Builds the runtime policy.
    #[must_use]
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

fn default_pool_max_idle() -> usize {
    10
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}
