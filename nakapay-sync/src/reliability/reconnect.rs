//! Exponential backoff for reconnecting push transports.
//!
//! Push adapters never give up while the engine is alive: the countdown is the
//! ultimate fallback, so a transport keeps trying with growing delays and the
//! attempt counter resets once a connection is established.

use std::time::Duration;

use crate::SyncError;

/// Configuration for reconnect behavior.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use nakapay_sync::reliability::ReconnectPolicy;
///
/// // Default policy: 500ms initial delay, 30s max delay, doubling
/// let policy = ReconnectPolicy::default();
///
/// // Tighter policy for a local relay
/// let tight = ReconnectPolicy {
///     initial_delay: Duration::from_millis(50),
///     max_delay: Duration::from_secs(2),
///     backoff_multiplier: 2.0,
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt (default: 500ms)
    pub initial_delay: Duration,
    /// Maximum delay between attempts (default: 30s)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (default: 2.0)
    pub backoff_multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectPolicy {
    /// Calculates delay for a specific attempt.
    ///
    /// Uses exponential backoff: delay = `initial_delay` * (multiplier ^ attempt)
    /// Capped at `max_delay` to prevent excessive waits.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        // Overflow to infinity lands on the cap as well.
        Duration::try_from_secs_f64(secs).map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Starts a fresh backoff sequence.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff { policy: self.clone(), attempt: 0 }
    }
}

/// Stateful position within a reconnect sequence.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    /// Returns the delay to wait before the next attempt and advances.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay_for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Resets after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of consecutive failed attempts so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Sleeps for the next delay, logging it.
    pub async fn wait(&mut self, transport: &'static str) {
        let delay = self.next_delay();
        tracing::debug!(
            transport,
            attempt = self.attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Sleeping before reconnect"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Determines if an error is transient.
///
/// Transient errors are expected to clear on their own (network blips, server
/// restarts). Non-transient errors point at configuration problems; push
/// transports still keep retrying on them, but log at a higher level.
///
/// # Examples
///
/// ```
/// use nakapay_sync::{SyncError, reliability::is_transient};
///
/// let error = SyncError::InvalidUrl("ws//broken".to_string());
/// assert!(!is_transient(&error));
///
/// let error = SyncError::TransportError("server closed connection".to_string());
/// assert!(is_transient(&error));
/// ```
#[must_use]
pub fn is_transient(error: &SyncError) -> bool {
    match error {
        SyncError::HttpError(e) => {
            e.is_timeout()
                || e.is_connect()
                || e.is_body()
                || e.status().is_none_or(|s| s.is_server_error())
        }
        SyncError::WebSocketError(_) | SyncError::TransportError(_) => true,
        SyncError::InvalidConfig(_)
        | SyncError::InvalidUrl(_)
        | SyncError::CreationFailed(_)
        | SyncError::MalformedPayload(_)
        | SyncError::AuthError(_)
        | SyncError::EngineStopped => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_policy_default() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert!((policy.backoff_multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_delay_for_attempt() {
        let policy = ReconnectPolicy::default();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        };

        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_advances_and_resets() {
        let mut backoff = ReconnectPolicy::default().backoff();
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.attempts(), 2);

        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_wait_sleeps_for_delay() {
        let mut backoff = ReconnectPolicy::default().backoff();
        let started = tokio::time::Instant::now();
        backoff.wait("socket").await;
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[test]
    fn test_is_transient_classification() {
        assert!(is_transient(&SyncError::TransportError("closed".into())));
        assert!(!is_transient(&SyncError::AuthError("no token".into())));
        assert!(!is_transient(&SyncError::InvalidConfig("bad".into())));
        assert!(!is_transient(&SyncError::MalformedPayload("{".into())));
        assert!(!is_transient(&SyncError::EngineStopped));
    }
}
