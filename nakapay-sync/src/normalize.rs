//! Status normalization.
//!
//! Each transport delivers status updates in its own shape. The functions here
//! map them onto [`StatusEvent`]. Rules shared by all of them:
//!
//! - unknown event names and non-status messages are ignored (`None`)
//! - a `paymentId` that differs from the tracked payment is ignored
//! - a missing `reason` is allowed; the engine substitutes a default
//!
//! Only structurally broken payloads (invalid JSON, wrong field types) are
//! reported as [`SyncError::MalformedPayload`]; adapters log and drop those.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    error::{Result, SyncError},
    payment::{EventOrigin, Payment, PaymentStatus, StatusEvent},
    transport::TransportKind,
};

/// Pub/sub message name carrying a status update.
pub const PUBSUB_UPDATE: &str = "payment-update";
/// Pub/sub message name announcing settlement.
pub const PUBSUB_SUCCESS: &str = "payment-success";
/// Socket event for a settled payment.
pub const SOCKET_COMPLETED: &str = "payment-completed";
/// Socket event for a failed payment.
pub const SOCKET_FAILED: &str = "payment-failed";
/// Socket event for an expired payment.
pub const SOCKET_EXPIRED: &str = "payment-expired";
/// Envelope `type` of server-stream status messages.
pub const STREAM_UPDATE_TYPE: &str = "payment-update";

/// Maps a dotted event name (`payment.completed`) to a status.
#[must_use]
pub fn event_status(event: &str) -> Option<PaymentStatus> {
    match event {
        "payment.completed" => Some(PaymentStatus::Completed),
        "payment.failed" => Some(PaymentStatus::Failed),
        "payment.expired" => Some(PaymentStatus::Expired),
        "payment.pending" => Some(PaymentStatus::Pending),
        _ => None,
    }
}

/// Status payload shared by pub/sub messages and server-stream envelopes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePayload {
    #[serde(rename = "type")]
    kind: Option<String>,
    payment_id: Option<String>,
    event: Option<String>,
    reason: Option<String>,
}

fn is_foreign(payment_id: Option<&str>, tracked: &str, origin: TransportKind) -> bool {
    match payment_id {
        Some(id) if id == tracked => false,
        other => {
            debug!(transport = %origin, payment_id = ?other, tracked, "Ignoring event for another payment");
            true
        }
    }
}

fn decode_payload(data: &Value) -> Result<UpdatePayload> {
    // Some publishers send the payload as a JSON-encoded string.
    let decoded = match data {
        Value::String(raw) => serde_json::from_str(raw),
        other => UpdatePayload::deserialize(other),
    };
    decoded.map_err(|e| SyncError::MalformedPayload(format!("invalid status payload: {e}")))
}

/// Normalizes a pub/sub channel message.
///
/// `payment-success` without an `event` field means completed.
///
/// # Errors
///
/// Returns [`SyncError::MalformedPayload`] if `data` is not a status object.
///
/// # Examples
///
/// ```
/// use nakapay_sync::{normalize, payment::PaymentStatus};
/// use serde_json::json;
///
/// let data = json!({"paymentId": "p1", "event": "payment.failed", "reason": "Route not found"});
/// let event = normalize::from_pubsub("payment-update", &data, "p1").unwrap().unwrap();
/// assert_eq!(event.status, PaymentStatus::Failed);
/// assert_eq!(event.reason.as_deref(), Some("Route not found"));
/// ```
pub fn from_pubsub(name: &str, data: &Value, tracked: &str) -> Result<Option<StatusEvent>> {
    if name != PUBSUB_UPDATE && name != PUBSUB_SUCCESS {
        debug!(name, "Ignoring unknown pub/sub message");
        return Ok(None);
    }
    let payload = decode_payload(data)?;
    if is_foreign(payload.payment_id.as_deref(), tracked, TransportKind::PubSub) {
        return Ok(None);
    }
    let status = match payload.event.as_deref() {
        Some(event) => event_status(event),
        None if name == PUBSUB_SUCCESS => Some(PaymentStatus::Completed),
        None => None,
    };
    Ok(status.map(|status| build(tracked, status, payload.reason, TransportKind::PubSub)))
}

/// Normalizes a socket event.
///
/// Only `payment-completed`, `payment-failed` and `payment-expired` are
/// status events; the payload must carry the tracked `paymentId`.
#[must_use]
pub fn from_socket(event: &str, payload: &Value, tracked: &str) -> Option<StatusEvent> {
    let status = match event {
        SOCKET_COMPLETED => PaymentStatus::Completed,
        SOCKET_FAILED => PaymentStatus::Failed,
        SOCKET_EXPIRED => PaymentStatus::Expired,
        _ => {
            debug!(event, "Ignoring unknown socket event");
            return None;
        }
    };
    let payment_id = payload.get("paymentId").and_then(Value::as_str);
    if is_foreign(payment_id, tracked, TransportKind::Socket) {
        return None;
    }
    let reason = payload.get("reason").and_then(Value::as_str).map(str::to_owned);
    Some(build(tracked, status, reason, TransportKind::Socket))
}

/// Normalizes the data of one server-sent event.
///
/// The data must be a JSON envelope `{type: "payment-update", paymentId, event}`;
/// other envelope types are ignored.
///
/// # Errors
///
/// Returns [`SyncError::MalformedPayload`] if the data is not valid JSON or
/// not an object of the expected shape.
pub fn from_stream(data: &str, tracked: &str) -> Result<Option<StatusEvent>> {
    let payload: UpdatePayload = serde_json::from_str(data)
        .map_err(|e| SyncError::MalformedPayload(format!("invalid stream message: {e}")))?;
    if payload.kind.as_deref() != Some(STREAM_UPDATE_TYPE) {
        debug!(kind = ?payload.kind, "Ignoring non-status stream message");
        return Ok(None);
    }
    if is_foreign(payload.payment_id.as_deref(), tracked, TransportKind::ServerStream) {
        return Ok(None);
    }
    let status = payload.event.as_deref().and_then(event_status);
    Ok(status.map(|status| build(tracked, status, payload.reason, TransportKind::ServerStream)))
}

/// Normalizes a polling response body `{status, ...Payment fields}`.
///
/// The body's `id`, when present, must match the tracked payment. When the
/// body also parses as a full [`Payment`] it is attached as snapshot.
///
/// # Errors
///
/// Returns [`SyncError::MalformedPayload`] if the body is not a JSON object
/// with a string `status`.
pub fn from_poll(body: &[u8], tracked: &str) -> Result<Option<StatusEvent>> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| SyncError::MalformedPayload(format!("invalid status response: {e}")))?;
    let status_name = value.get("status").and_then(Value::as_str).ok_or_else(|| {
        SyncError::MalformedPayload("status response without string 'status'".to_owned())
    })?;
    let Some(status) = PaymentStatus::from_wire(status_name) else {
        debug!(status = status_name, "Ignoring unknown polled status");
        return Ok(None);
    };
    let id = value.get("id").and_then(Value::as_str);
    if id.is_some() && is_foreign(id, tracked, TransportKind::Polling) {
        return Ok(None);
    }
    let reason = value.get("reason").and_then(Value::as_str).map(str::to_owned);
    let mut event = build(tracked, status, reason, TransportKind::Polling);
    if let Ok(payment) = serde_json::from_value::<Payment>(value) {
        event = event.with_payment(payment);
    }
    Ok(Some(event))
}

fn build(
    tracked: &str,
    status: PaymentStatus,
    reason: Option<String>,
    kind: TransportKind,
) -> StatusEvent {
    let mut event = StatusEvent::new(tracked, status, EventOrigin::Transport(kind));
    event.reason = reason.filter(|r| !r.is_empty());
    event
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_event_status_names() {
        assert_eq!(event_status("payment.completed"), Some(PaymentStatus::Completed));
        assert_eq!(event_status("payment.failed"), Some(PaymentStatus::Failed));
        assert_eq!(event_status("payment.expired"), Some(PaymentStatus::Expired));
        assert_eq!(event_status("payment.refunded"), None);
    }

    #[test]
    fn test_pubsub_update() {
        let data = json!({"paymentId": "p1", "event": "payment.completed"});
        let event = from_pubsub(PUBSUB_UPDATE, &data, "p1").unwrap().unwrap();
        assert_eq!(event.status, PaymentStatus::Completed);
        assert_eq!(event.payment_id, "p1");
        assert!(event.reason.is_none());
        assert_eq!(event.origin, EventOrigin::Transport(TransportKind::PubSub));
    }

    #[test]
    fn test_pubsub_string_encoded_data() {
        let data = Value::String(r#"{"paymentId":"p1","event":"payment.expired"}"#.to_owned());
        let event = from_pubsub(PUBSUB_UPDATE, &data, "p1").unwrap().unwrap();
        assert_eq!(event.status, PaymentStatus::Expired);
    }

    #[test]
    fn test_pubsub_success_without_event_means_completed() {
        let data = json!({"paymentId": "p1"});
        let event = from_pubsub(PUBSUB_SUCCESS, &data, "p1").unwrap().unwrap();
        assert_eq!(event.status, PaymentStatus::Completed);
    }

    #[test]
    fn test_pubsub_foreign_payment_ignored() {
        let data = json!({"paymentId": "p2", "event": "payment.completed"});
        assert!(from_pubsub(PUBSUB_UPDATE, &data, "p1").unwrap().is_none());

        let data = json!({"event": "payment.completed"});
        assert!(from_pubsub(PUBSUB_UPDATE, &data, "p1").unwrap().is_none());
    }

    #[test]
    fn test_pubsub_unknown_name_ignored() {
        let data = json!({"paymentId": "p1", "event": "payment.completed"});
        assert!(from_pubsub("presence", &data, "p1").unwrap().is_none());
    }

    #[test]
    fn test_pubsub_unknown_event_ignored() {
        let data = json!({"paymentId": "p1", "event": "payment.refunded"});
        assert!(from_pubsub(PUBSUB_UPDATE, &data, "p1").unwrap().is_none());
    }

    #[test]
    fn test_pubsub_malformed_data() {
        let data = json!(["not", "an", "object"]);
        let result = from_pubsub(PUBSUB_UPDATE, &data, "p1");
        assert!(matches!(result.unwrap_err(), SyncError::MalformedPayload(_)));
    }

    #[test]
    fn test_socket_events() {
        let payload = json!({"paymentId": "p1"});
        assert_eq!(from_socket(SOCKET_COMPLETED, &payload, "p1").unwrap().status, PaymentStatus::Completed);
        assert_eq!(from_socket(SOCKET_FAILED, &payload, "p1").unwrap().status, PaymentStatus::Failed);
        assert_eq!(from_socket(SOCKET_EXPIRED, &payload, "p1").unwrap().status, PaymentStatus::Expired);
        assert!(from_socket("payment-created", &payload, "p1").is_none());
    }

    #[test]
    fn test_socket_foreign_payment_ignored() {
        assert!(from_socket(SOCKET_COMPLETED, &json!({"paymentId": "p9"}), "p1").is_none());
        assert!(from_socket(SOCKET_COMPLETED, &json!("p1"), "p1").is_none());
    }

    #[test]
    fn test_socket_reason_passed_through() {
        let payload = json!({"paymentId": "p1", "reason": "Insufficient liquidity"});
        let event = from_socket(SOCKET_FAILED, &payload, "p1").unwrap();
        assert_eq!(event.reason_or_default(), "Insufficient liquidity");
    }

    #[test]
    fn test_stream_envelope() {
        let data = r#"{"type":"payment-update","paymentId":"p1","event":"payment.completed"}"#;
        let event = from_stream(data, "p1").unwrap().unwrap();
        assert_eq!(event.status, PaymentStatus::Completed);
        assert_eq!(event.origin, EventOrigin::Transport(TransportKind::ServerStream));
    }

    #[test]
    fn test_stream_other_type_ignored() {
        let data = r#"{"type":"connected","paymentId":"p1"}"#;
        assert!(from_stream(data, "p1").unwrap().is_none());
    }

    #[test]
    fn test_stream_foreign_payment_ignored() {
        let data = r#"{"type":"payment-update","paymentId":"p2","event":"payment.completed"}"#;
        assert!(from_stream(data, "p1").unwrap().is_none());
    }

    #[test]
    fn test_stream_malformed_json() {
        let result = from_stream("{not json", "p1");
        assert!(matches!(result.unwrap_err(), SyncError::MalformedPayload(_)));
    }

    #[test]
    fn test_poll_pending_yields_pending_event() {
        let event = from_poll(br#"{"status":"pending"}"#, "p1").unwrap().unwrap();
        assert_eq!(event.status, PaymentStatus::Pending);
        assert!(event.payment.is_none());
    }

    #[test]
    fn test_poll_completed_with_snapshot() {
        let body = br#"{"id":"p1","amount":1000,"description":"Coffee","invoice":"lnbc1","status":"completed"}"#;
        let event = from_poll(body, "p1").unwrap().unwrap();
        assert_eq!(event.status, PaymentStatus::Completed);
        let payment = event.payment.unwrap();
        assert_eq!(payment.amount, 1000);
        assert_eq!(payment.status, PaymentStatus::Completed);
    }

    #[test]
    fn test_poll_foreign_id_ignored() {
        assert!(from_poll(br#"{"id":"p2","status":"completed"}"#, "p1").unwrap().is_none());
    }

    #[test]
    fn test_poll_unknown_status_ignored() {
        assert!(from_poll(br#"{"status":"settling"}"#, "p1").unwrap().is_none());
    }

    #[test]
    fn test_poll_malformed_body() {
        assert!(from_poll(b"<html>", "p1").is_err());
        assert!(from_poll(br#"{"state":"completed"}"#, "p1").is_err());
    }
}
