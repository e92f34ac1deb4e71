//! Managed pub/sub transport (Ably-style realtime protocol).
//!
//! Each session authenticates, opens the realtime WebSocket and attaches to
//! the channel `payment-{id}`. Frames are JSON objects with a numeric
//! `action`; channel messages arrive batched under action `15`.
//!
//! Token authentication fetches a fresh token for every session, so a
//! reconnect after token expiry works without extra handling.

use std::fmt;

use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{
    ConnectionState, EventSink, StatusTransport, TransportKind, TransportTask,
    http::{build_client, get_bytes, with_query},
    ws,
};
use crate::{
    config::{PubSubAuth, SyncConfig},
    error::{Result, SyncError},
    normalize,
    reliability::{Backoff, ReconnectPolicy, is_transient},
};

/// Protocol action codes.
mod action {
    pub(super) const HEARTBEAT: u8 = 0;
    pub(super) const CONNECTED: u8 = 4;
    pub(super) const DISCONNECTED: u8 = 6;
    pub(super) const CLOSED: u8 = 8;
    pub(super) const ERROR: u8 = 9;
    pub(super) const ATTACH: u8 = 10;
    pub(super) const ATTACHED: u8 = 11;
    pub(super) const DETACHED: u8 = 13;
    pub(super) const MESSAGE: u8 = 15;
}

/// Channel name for a payment.
#[must_use]
pub fn channel_name(payment_id: &str) -> String {
    format!("payment-{payment_id}")
}

#[derive(Clone)]
enum Credentials {
    TokenUrl(Url),
    Key(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenUrl(url) => f.debug_tuple("TokenUrl").field(&url.as_str()).finish(),
            Self::Key(_) => f.debug_tuple("Key").field(&"<redacted>").finish(),
        }
    }
}

/// Pub/sub channel subscription.
#[derive(Debug)]
pub struct PubSubTransport {
    client: Client,
    realtime_url: Url,
    credentials: Credentials,
    policy: ReconnectPolicy,
    task: Option<TransportTask>,
}

impl PubSubTransport {
    /// Creates a pub/sub transport from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if neither an auth URL nor a key
    /// is configured, and [`SyncError::InvalidUrl`] if a URL cannot be
    /// resolved.
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let credentials = match config.pubsub_auth() {
            Some(PubSubAuth::TokenUrl(auth_url)) => Credentials::TokenUrl(config.resolve(&auth_url)?),
            Some(PubSubAuth::Key(key)) => {
                warn!("Pre-shared key authentication is discouraged, configure pubsub_auth_url instead");
                Credentials::Key(key)
            }
            None => {
                return Err(SyncError::InvalidConfig(
                    "pubsub transport requires pubsub_auth_url or a key".to_owned(),
                ));
            }
        };
        let realtime_url = ws::to_ws_url(&Url::parse(&config.pubsub_realtime_url).map_err(|e| {
            SyncError::InvalidUrl(format!("invalid pubsub_realtime_url: {e}"))
        })?)?;

        Ok(Self {
            client: build_client(&config.http)?,
            realtime_url,
            credentials,
            policy: config.reconnect.policy(),
            task: None,
        })
    }

    /// Returns `true` when authenticating with a per-payment token.
    #[must_use]
    pub const fn uses_token_auth(&self) -> bool {
        matches!(self.credentials, Credentials::TokenUrl(_))
    }
}

impl StatusTransport for PubSubTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::PubSub
    }

    fn connect(&mut self, payment_id: &str, sink: EventSink) -> Result<()> {
        self.disconnect();
        let worker = PubSubWorker {
            client: self.client.clone(),
            realtime_url: self.realtime_url.clone(),
            credentials: self.credentials.clone(),
            payment_id: payment_id.to_owned(),
            channel: channel_name(payment_id),
            sink,
        };
        let backoff = self.policy.backoff();
        self.task = Some(TransportTask::spawn(worker.run(backoff)));
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.task.take().is_some() {
            debug!(transport = "pubsub", "Channel subscription closed");
        }
    }

    fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

#[derive(Debug, Deserialize)]
struct ProtocolFrame {
    action: u8,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    messages: Vec<ChannelMessage>,
    #[serde(default)]
    error: Option<ErrorInfo>,
}

#[derive(Debug, Deserialize)]
struct ChannelMessage {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorInfo {
    #[serde(default)]
    code: Option<u32>,
    #[serde(default)]
    message: Option<String>,
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.message.as_deref().unwrap_or("unspecified error");
        match self.code {
            Some(code) => write!(f, "{message} (code {code})"),
            None => f.write_str(message),
        }
    }
}

/// Extracts the token from an auth endpoint response.
fn parse_token(body: &[u8]) -> Result<String> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| SyncError::AuthError(format!("invalid token response: {e}")))?;
    let token = match value {
        Value::String(token) => Some(token),
        Value::Object(mut map) => match map.remove("token") {
            Some(Value::String(token)) => Some(token),
            _ => None,
        },
        _ => None,
    };
    token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| SyncError::AuthError("token response without a token".to_owned()))
}

enum SessionEnd {
    Closed,
    Terminal,
}

struct PubSubWorker {
    client: Client,
    realtime_url: Url,
    credentials: Credentials,
    payment_id: String,
    channel: String,
    sink: EventSink,
}

impl PubSubWorker {
    #[instrument(skip(self, backoff), fields(transport = "pubsub", channel = %self.channel))]
    async fn run(self, mut backoff: Backoff) {
        loop {
            self.sink.connection(ConnectionState::Connecting);
            match self.session(&mut backoff).await {
                Ok(SessionEnd::Terminal) => return,
                Ok(SessionEnd::Closed) => info!("Realtime connection closed"),
                Err(error) if is_transient(&error) => warn!(%error, "Realtime connection failed"),
                Err(error) => warn!(%error, attempts = backoff.attempts(), "Realtime connection rejected"),
            }
            if !self.sink.connection(ConnectionState::Disconnected) {
                return;
            }
            backoff.wait("pubsub").await;
        }
    }

    async fn session_url(&self) -> Result<Url> {
        let url = match &self.credentials {
            Credentials::TokenUrl(auth_url) => {
                let token = self.fetch_token(auth_url).await?;
                with_query(&self.realtime_url, "access_token", &token)
            }
            Credentials::Key(key) => with_query(&self.realtime_url, "key", key),
        };
        Ok(with_query(&url, "format", "json"))
    }

    async fn fetch_token(&self, auth_url: &Url) -> Result<String> {
        let url = with_query(auth_url, "paymentId", &self.payment_id);
        let body = match get_bytes(&self.client, &url).await {
            Ok(body) => body,
            Err(SyncError::TransportError(message)) => {
                return Err(SyncError::AuthError(format!("token request rejected: {message}")));
            }
            Err(error) => return Err(error),
        };
        parse_token(&body)
    }

    async fn session(&self, backoff: &mut Backoff) -> Result<SessionEnd> {
        let url = self.session_url().await?;
        let mut stream = ws::connect(&url).await?;

        while let Some(message) = stream.next().await {
            let text = match message? {
                Message::Text(text) => text,
                Message::Close(_) => return Ok(SessionEnd::Closed),
                _ => continue,
            };
            let frame: ProtocolFrame = match serde_json::from_str(text.as_str()) {
                Ok(frame) => frame,
                Err(error) => {
                    warn!(%error, "Dropping malformed realtime frame");
                    continue;
                }
            };

            match frame.action {
                action::HEARTBEAT => {}
                action::CONNECTED => {
                    let attach = json!({"action": action::ATTACH, "channel": self.channel});
                    stream.send(Message::text(attach.to_string())).await?;
                }
                action::ATTACHED => {
                    self.sink.connection(ConnectionState::Connected);
                    backoff.reset();
                    info!("Attached to payment channel");
                }
                action::MESSAGE => {
                    if self.deliver(&frame.messages) {
                        let _ = stream.close(None).await;
                        return Ok(SessionEnd::Terminal);
                    }
                }
                action::ERROR => {
                    let detail = frame.error.map_or_else(|| "unspecified error".to_owned(), |e| e.to_string());
                    match frame.channel {
                        Some(channel) => warn!(%channel, %detail, "Channel error"),
                        None => {
                            return Err(SyncError::TransportError(format!(
                                "realtime connection error: {detail}"
                            )));
                        }
                    }
                }
                action::DISCONNECTED | action::CLOSED | action::DETACHED => {
                    return Ok(SessionEnd::Closed);
                }
                other => debug!(action = other, "Ignoring realtime frame"),
            }
        }
        Ok(SessionEnd::Closed)
    }

    /// Normalizes a message batch. Returns `true` after a terminal event.
    fn deliver(&self, messages: &[ChannelMessage]) -> bool {
        for message in messages {
            let Some(name) = message.name.as_deref() else {
                continue;
            };
            match normalize::from_pubsub(name, &message.data, &self.payment_id) {
                Ok(Some(event)) if event.status.is_terminal() => {
                    self.sink.emit(event);
                    return true;
                }
                Ok(_) => {}
                Err(error) => warn!(%error, name, "Dropping malformed channel message"),
            }
        }
        false
    }
}
