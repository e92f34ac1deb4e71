//! Error types for payment status synchronization.
//!
//! Two error families live here:
//!
//! - [`SyncError`]: plumbing failures returned by fallible library calls
//!   (configuration, HTTP, WebSocket, payload decoding). Transport tasks log
//!   and absorb these; they never reach the consumer as a payment outcome.
//! - [`PaymentError`]: payment-domain outcomes handed to the consumer's error
//!   callback (creation failure, terminal failure, expiry).
//!
//! # Examples
//!
//! ```
//! use nakapay_sync::error::{Result, SyncError};
//!
//! fn require_positive(amount: u64) -> Result<u64> {
//!     if amount == 0 {
//!         return Err(SyncError::CreationFailed("amount must be positive".to_string()));
//!     }
//!     Ok(amount)
//! }
//! ```

use thiserror::Error;

/// Result type alias for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while creating or tracking a payment.
///
/// # Error Recovery
///
/// - **Transient errors** ([`HttpError`](Self::HttpError),
///   [`WebSocketError`](Self::WebSocketError),
///   [`TransportError`](Self::TransportError)): reconnect with backoff
/// - **Configuration errors** ([`InvalidConfig`](Self::InvalidConfig),
///   [`InvalidUrl`](Self::InvalidUrl)): fix configuration and restart
/// - **Payload errors** ([`MalformedPayload`](Self::MalformedPayload)): drop the
///   message and keep listening
#[must_use = "errors should be handled, propagated, or explicitly panicked"]
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP request failed.
    ///
    /// Wraps [`reqwest::Error`]. Raised by polling, the server stream, the
    /// pub/sub token request and payment creation.
    ///
    /// # Recovery
    ///
    /// Transport adapters retry on their own schedule. For payment creation the
    /// caller decides whether to retry.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// WebSocket connection or framing failed.
    ///
    /// Raised by the pub/sub and socket adapters.
    ///
    /// # Recovery
    ///
    /// The adapter reconnects using its reconnect policy.
    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    /// Configuration is invalid.
    ///
    /// # Recovery
    ///
    /// Correct the offending option. The message names it.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A URL could not be parsed or joined.
    ///
    /// # Examples
    ///
    /// ```
    /// use nakapay_sync::error::SyncError;
    ///
    /// let err = SyncError::InvalidUrl("not a url".to_string());
    /// assert!(err.to_string().contains("Invalid URL"));
    /// ```
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The Payment Creation Service rejected the request or could not be reached.
    ///
    /// The message is the server-provided `message` when present.
    #[error("Payment creation failed: {0}")]
    CreationFailed(String),

    /// An inbound event payload could not be decoded.
    ///
    /// # Recovery
    ///
    /// None needed. The payload is logged and dropped.
    #[error("Malformed event payload: {0}")]
    MalformedPayload(String),

    /// Transport-level failure not covered by a more specific variant, such as
    /// an unexpected HTTP status or a server-initiated close.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Pub/sub authentication failed (token endpoint unreachable or response
    /// without a token).
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// The engine was stopped before reaching a terminal status.
    #[error("Synchronization engine stopped")]
    EngineStopped,
}

/// Payment-domain outcome delivered to the consumer's error callback.
///
/// The `Display` output is the human-readable reason, suitable for direct
/// presentation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    /// The payment could not be created; tracking never started.
    #[error("{message}")]
    Creation {
        /// Reason reported by the creation service.
        message: String,
    },

    /// The payment reached the `failed` terminal status.
    #[error("{reason}")]
    Failed {
        /// Reason reported by the transport, or a generic default.
        reason: String,
    },

    /// The payment reached the `expired` terminal status, either reported by a
    /// transport or forced by the local countdown.
    #[error("{reason}")]
    Expired {
        /// Reason reported by the transport, or a generic default.
        reason: String,
    },
}

impl PaymentError {
    /// Returns the human-readable reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Creation { message } => message,
            Self::Failed { reason } | Self::Expired { reason } => reason,
        }
    }

    /// Returns `true` if the payment expired.
    #[must_use]
    pub const fn is_expiry(&self) -> bool {
        matches!(self, Self::Expired { .. })
    }
}
