//! Status transport abstraction layer.
//!
//! A transport opens one channel for one payment and pushes
//! [`TransportSignal`]s into an [`EventSink`] owned by the engine. Four
//! implementations exist, chosen once by [`select_transport`]:
//!
//! | Kind | Wire | Implementation |
//! |------|------|----------------|
//! | `PubSub` | Ably-style realtime protocol over WebSocket | [`PubSubTransport`] |
//! | `Socket` | Engine.IO v4 / Socket.IO events over WebSocket | [`SocketTransport`] |
//! | `ServerStream` | Server-sent events over HTTP | [`ServerStreamTransport`] |
//! | `Polling` | Periodic HTTP GET | [`PollingTransport`] |
//!
//! # Contract
//!
//! - [`StatusTransport::connect`] returns immediately; the work runs on a
//!   spawned task and must be called from within a Tokio runtime.
//! - Transports never return errors past their task boundary. Failures are
//!   logged, reported as [`ConnectionState::Disconnected`] and retried.
//! - [`StatusTransport::disconnect`] aborts the task synchronously; nothing is
//!   delivered to the sink afterwards.

use std::fmt;

use tokio::{sync::mpsc, task::JoinHandle};

use crate::{error::Result, payment::StatusEvent};

pub mod config;
pub mod http;
pub mod polling;
pub mod pubsub;
pub mod selector;
pub mod socket;
pub mod stream;
mod ws;

pub use config::{HttpConfig, ReconnectConfig};
pub use polling::PollingTransport;
pub use pubsub::PubSubTransport;
pub use selector::select_transport;
pub use socket::SocketTransport;
pub use stream::ServerStreamTransport;

/// Transport variants in selection precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Managed pub/sub channel.
    PubSub,
    /// Bidirectional socket with rooms.
    Socket,
    /// Unidirectional server-sent event stream.
    ServerStream,
    /// Periodic status requests.
    Polling,
}

impl TransportKind {
    /// Name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PubSub => "pubsub",
            Self::Socket => "socket",
            Self::ServerStream => "server-stream",
            Self::Polling => "polling",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Connection state of the active transport. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; a retry may be scheduled.
    #[default]
    Disconnected,
    /// Connection attempt in progress.
    Connecting,
    /// Channel established (for polling: last request succeeded).
    Connected,
}

/// Message from a transport task to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// Normalized status update.
    Event(StatusEvent),
    /// Connection state change.
    Connection(ConnectionState),
}

/// Sending half handed to a transport on connect.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<TransportSignal>,
}

impl EventSink {
    /// Creates a sink and the receiver the engine drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Delivers a status event. Returns `false` once the engine is gone.
    pub fn emit(&self, event: StatusEvent) -> bool {
        self.tx.send(TransportSignal::Event(event)).is_ok()
    }

    /// Reports a connection state change. Returns `false` once the engine is gone.
    pub fn connection(&self, state: ConnectionState) -> bool {
        self.tx.send(TransportSignal::Connection(state)).is_ok()
    }

    /// Returns `true` once the receiving engine has been dropped or stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A channel that reports status updates for one payment.
///
/// Implemented by the four built-in transports; custom implementations can
/// be handed to [`SyncEngine::with_transport`](crate::engine::SyncEngine::with_transport).
pub trait StatusTransport: Send + fmt::Debug {
    /// Transport variant, for logs and connection reporting.
    fn kind(&self) -> TransportKind;

    /// Starts listening for updates on `payment_id`.
    ///
    /// Calling `connect` on an already connected transport replaces the
    /// previous connection.
    ///
    /// # Errors
    ///
    /// Returns error only for problems detectable before any I/O, such as an
    /// endpoint that cannot be resolved. Runtime failures are retried
    /// internally.
    fn connect(&mut self, payment_id: &str, sink: EventSink) -> Result<()>;

    /// Releases the connection. Idempotent.
    fn disconnect(&mut self);

    /// Returns `true` while a connection task is alive.
    fn is_active(&self) -> bool;
}

/// Owned handle of a transport task; aborts the task when dropped.
#[derive(Debug)]
pub(crate) struct TransportTask(JoinHandle<()>);

impl TransportTask {
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self(tokio::spawn(future))
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl Drop for TransportTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}
