//! Payment data model.
//!
//! [`Payment`] is the record returned by the Payment Creation Service,
//! [`PaymentStatus`] the four-valued lifecycle status and [`StatusEvent`] the
//! canonical shape every transport is normalized into.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transport::TransportKind;

/// Opaque key/value bag attached to a payment.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A payment request as issued by the Payment Creation Service.
///
/// All fields except `status` are immutable for the lifetime of a
/// synchronization engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Opaque payment identifier.
    pub id: String,
    /// Amount in the smallest currency unit.
    pub amount: u64,
    /// Display text.
    #[serde(default)]
    pub description: String,
    /// Opaque payment instruction (e.g. a Lightning invoice).
    #[serde(default)]
    pub invoice: String,
    /// Current lifecycle status.
    #[serde(default)]
    pub status: PaymentStatus,
    /// Caller-supplied metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Payment lifecycle status.
///
/// `Pending` is the only non-terminal value; the other three are absorbing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Awaiting settlement.
    #[default]
    Pending,
    /// Settled successfully.
    Completed,
    /// Rejected or failed to settle.
    Failed,
    /// Not settled within the allowed time.
    Expired,
}

impl PaymentStatus {
    /// Returns `true` for `Completed`, `Failed` and `Expired`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    /// Parses a lowercase wire name (`"completed"`), ignoring surrounding
    /// whitespace and ASCII case.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Reason used when a terminal event carries none, e.g. `"Payment expired"`.
    #[must_use]
    pub fn default_reason(self) -> String {
        format!("Payment {}", self.as_str())
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a [`StatusEvent`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    /// Reported by the active transport adapter.
    Transport(TransportKind),
    /// Forced by the local countdown reaching zero.
    Countdown,
}

impl fmt::Display for EventOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(kind) => write!(f, "{kind}"),
            Self::Countdown => f.write_str("countdown"),
        }
    }
}

/// Normalized status update.
///
/// Produced by the normalizer for every transport and by the countdown;
/// consumed only by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    /// Identifier of the payment this update refers to.
    pub payment_id: String,
    /// Reported status.
    pub status: PaymentStatus,
    /// Human-readable reason, when the source supplied one.
    pub reason: Option<String>,
    /// Fresh payment snapshot, when the source supplied one (polling).
    pub payment: Option<Payment>,
    /// Producer of the event.
    pub origin: EventOrigin,
}

impl StatusEvent {
    /// Creates an event without reason or snapshot.
    pub fn new(payment_id: impl Into<String>, status: PaymentStatus, origin: EventOrigin) -> Self {
        Self { payment_id: payment_id.into(), status, reason: None, payment: None, origin }
    }

    /// Creates the local expiry event emitted when the countdown reaches zero.
    pub fn countdown_expired(payment_id: impl Into<String>) -> Self {
        Self::new(payment_id, PaymentStatus::Expired, EventOrigin::Countdown)
    }

    /// Attaches a reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a payment snapshot.
    #[must_use]
    pub fn with_payment(mut self, payment: Payment) -> Self {
        self.payment = Some(payment);
        self
    }

    /// Reason to surface: the reported one, or the status default.
    #[must_use]
    pub fn reason_or_default(&self) -> String {
        self.reason.clone().unwrap_or_else(|| self.status.default_reason())
    }
}

/// Request body for the Payment Creation Service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    /// Amount in the smallest currency unit; must be positive.
    pub amount: u64,
    /// Display text.
    pub description: String,
    /// Optional metadata forwarded verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl CreatePaymentRequest {
    /// Creates a request without metadata.
    pub fn new(amount: u64, description: impl Into<String>) -> Self {
        Self { amount, description: description.into(), metadata: None }
    }

    /// Attaches metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
