//! Socket transport: Socket.IO events over an Engine.IO v4 WebSocket.
//!
//! Session flow:
//!
//! 1. connect `{socket_url}/socket.io/?EIO=4&transport=websocket`
//! 2. server sends open (`0{...}`), client connects the default namespace (`40`)
//! 3. server acknowledges (`40{...}`), client joins the payment room with
//!    `42["join-payment-room","<id>"]`
//! 4. status arrives as `42["payment-completed",{"paymentId":...}]`
//!
//! Engine.IO pings (`2`) are answered with pongs (`3`). Any drop reconnects
//! with backoff and re-joins the room.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{
    ConnectionState, EventSink, StatusTransport, TransportKind, TransportTask,
    ws::{self, WsStream},
};
use crate::{
    config::SyncConfig,
    error::{Result, SyncError},
    normalize,
    reliability::{Backoff, ReconnectPolicy, is_transient},
};

/// Room join event name.
pub const JOIN_ROOM_EVENT: &str = "join-payment-room";

/// Bidirectional socket subscribed to a per-payment room.
#[derive(Debug)]
pub struct SocketTransport {
    endpoint: Url,
    policy: ReconnectPolicy,
    task: Option<TransportTask>,
}

impl SocketTransport {
    /// Creates a socket transport from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if `socket_url` is not set and
    /// [`SyncError::InvalidUrl`] if it cannot be turned into a WebSocket URL.
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let socket_url = config.socket_url.as_deref().ok_or_else(|| {
            SyncError::InvalidConfig("socket transport requires socket_url".to_owned())
        })?;
        let base = Url::parse(socket_url)
            .map_err(|e| SyncError::InvalidUrl(format!("invalid socket_url '{socket_url}': {e}")))?;
        Ok(Self { endpoint: engine_io_url(&base)?, policy: config.reconnect.policy(), task: None })
    }

    /// Engine.IO endpoint the transport connects to.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl StatusTransport for SocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    fn connect(&mut self, payment_id: &str, sink: EventSink) -> Result<()> {
        self.disconnect();
        let worker = SocketWorker {
            url: self.endpoint.clone(),
            payment_id: payment_id.to_owned(),
            sink,
        };
        let backoff = self.policy.backoff();
        self.task = Some(TransportTask::spawn(worker.run(backoff)));
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.task.take().is_some() {
            debug!(transport = "socket", "Socket closed");
        }
    }

    fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

pub(super) fn engine_io_url(base: &Url) -> Result<Url> {
    let mut url = ws::to_ws_url(base)?;
    url.set_path("/socket.io/");
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

/// Decoded Engine.IO frame, with Socket.IO packets unpacked from `4` messages.
#[derive(Debug, PartialEq, Eq)]
enum Frame<'a> {
    Open,
    Close,
    Ping,
    NamespaceConnected,
    NamespaceDisconnected,
    ConnectError(&'a str),
    Event(&'a str),
    Other,
}

fn decode_frame(text: &str) -> Frame<'_> {
    let mut chars = text.chars();
    match chars.next() {
        Some('0') => Frame::Open,
        Some('1') => Frame::Close,
        Some('2') => Frame::Ping,
        Some('4') => {
            let packet = chars.as_str();
            let body = packet.get(1..).unwrap_or_default();
            match packet.chars().next() {
                Some('0') => Frame::NamespaceConnected,
                Some('1') => Frame::NamespaceDisconnected,
                Some('2') => Frame::Event(body),
                Some('4') => Frame::ConnectError(body),
                _ => Frame::Other,
            }
        }
        _ => Frame::Other,
    }
}

/// Splits an event array `["name", payload]`.
fn decode_event(body: &str) -> Result<(String, Value)> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| SyncError::MalformedPayload(format!("invalid socket event: {e}")))?;
    let Value::Array(mut items) = value else {
        return Err(SyncError::MalformedPayload("socket event is not an array".to_owned()));
    };
    if items.is_empty() {
        return Err(SyncError::MalformedPayload("socket event without a name".to_owned()));
    }
    let payload = if items.len() > 1 { items.swap_remove(1) } else { Value::Null };
    match items.swap_remove(0) {
        Value::String(name) => Ok((name, payload)),
        _ => Err(SyncError::MalformedPayload("socket event name is not a string".to_owned())),
    }
}

fn join_frame(payment_id: &str) -> String {
    format!("42{}", serde_json::json!([JOIN_ROOM_EVENT, payment_id]))
}

enum SessionEnd {
    Closed,
    Terminal,
}

struct SocketWorker {
    url: Url,
    payment_id: String,
    sink: EventSink,
}

impl SocketWorker {
    #[instrument(skip(self, backoff), fields(transport = "socket", payment_id = %self.payment_id))]
    async fn run(self, mut backoff: Backoff) {
        loop {
            self.sink.connection(ConnectionState::Connecting);
            match self.session(&mut backoff).await {
                Ok(SessionEnd::Terminal) => return,
                Ok(SessionEnd::Closed) => info!("Socket closed by server"),
                Err(error) if is_transient(&error) => warn!(%error, "Socket connection failed"),
                Err(error) => warn!(%error, attempts = backoff.attempts(), "Socket rejected, check configuration"),
            }
            if !self.sink.connection(ConnectionState::Disconnected) {
                return;
            }
            backoff.wait("socket").await;
        }
    }

    async fn session(&self, backoff: &mut Backoff) -> Result<SessionEnd> {
        let mut stream = ws::connect(&self.url).await?;

        while let Some(message) = stream.next().await {
            let text = match message? {
                Message::Text(text) => text,
                Message::Close(_) => return Ok(SessionEnd::Closed),
                _ => continue,
            };
            match decode_frame(text.as_str()) {
                Frame::Open => send(&mut stream, "40".to_owned()).await?,
                Frame::Ping => send(&mut stream, "3".to_owned()).await?,
                Frame::NamespaceConnected => {
                    send(&mut stream, join_frame(&self.payment_id)).await?;
                    self.sink.connection(ConnectionState::Connected);
                    backoff.reset();
                    info!("Socket connected, joined payment room");
                }
                Frame::Event(body) => match decode_event(body) {
                    Ok((name, payload)) => {
                        if let Some(event) = normalize::from_socket(&name, &payload, &self.payment_id)
                        {
                            self.sink.emit(event);
                            let _ = stream.close(None).await;
                            return Ok(SessionEnd::Terminal);
                        }
                    }
                    Err(error) => warn!(%error, "Dropping malformed socket event"),
                },
                Frame::ConnectError(detail) => {
                    return Err(SyncError::TransportError(format!(
                        "socket namespace refused: {detail}"
                    )));
                }
                Frame::Close | Frame::NamespaceDisconnected => return Ok(SessionEnd::Closed),
                Frame::Other => {}
            }
        }
        Ok(SessionEnd::Closed)
    }
}

async fn send(stream: &mut WsStream, text: String) -> Result<()> {
    stream.send(Message::text(text)).await?;
    Ok(())
}
