//! Transport selection.
//!
//! Precedence is fixed: pub/sub, socket, server stream, polling. A transport
//! whose flag is set but whose prerequisites are missing is skipped with a
//! warning. Polling is always available.

use tracing::{info, warn};
use url::Url;

use super::{
    PollingTransport, PubSubTransport, ServerStreamTransport, SocketTransport, StatusTransport,
    TransportKind, socket, ws,
};
use crate::{
    config::{PubSubAuth, SyncConfig},
    error::{Result, SyncError},
};

/// Returns the kind [`select_transport`] would build, without building it.
#[must_use]
pub fn selected_kind(config: &SyncConfig) -> TransportKind {
    if config.use_pubsub {
        match pubsub_ready(config) {
            Ok(()) => return TransportKind::PubSub,
            Err(reason) => warn!(%reason, "use_pubsub is set but cannot be used, falling through"),
        }
    }
    if config.use_socket {
        match socket_ready(config) {
            Ok(()) => return TransportKind::Socket,
            Err(reason) => warn!(%reason, "use_socket is set but cannot be used, falling through"),
        }
    }
    if config.use_server_stream {
        if config.resolve(&config.stream_endpoint).is_ok() {
            return TransportKind::ServerStream;
        }
        warn!("use_server_stream is set but stream_endpoint cannot be resolved, falling through");
    }
    TransportKind::Polling
}

fn pubsub_ready(config: &SyncConfig) -> Result<()> {
    match config.pubsub_auth() {
        Some(PubSubAuth::TokenUrl(auth_url)) => {
            config.resolve(&auth_url)?;
        }
        Some(PubSubAuth::Key(_)) => {}
        None => {
            return Err(SyncError::InvalidConfig("no pubsub_auth_url or key configured".to_owned()));
        }
    }
    let realtime_url = Url::parse(&config.pubsub_realtime_url)
        .map_err(|e| SyncError::InvalidUrl(format!("invalid pubsub_realtime_url: {e}")))?;
    ws::to_ws_url(&realtime_url).map(drop)
}

fn socket_ready(config: &SyncConfig) -> Result<()> {
    let socket_url = config
        .socket_url
        .as_deref()
        .filter(|url| !url.is_empty())
        .ok_or_else(|| SyncError::InvalidConfig("socket_url is missing".to_owned()))?;
    let base = Url::parse(socket_url)
        .map_err(|e| SyncError::InvalidUrl(format!("invalid socket_url '{socket_url}': {e}")))?;
    socket::engine_io_url(&base).map(drop)
}

/// Builds exactly one transport according to the configured preference.
///
/// Nothing is connected; the engine calls [`StatusTransport::connect`].
///
/// # Errors
///
/// Returns error only when the chosen transport cannot be built, e.g.
/// polling with a relative status endpoint and no `base_url`.
///
/// # Examples
///
/// ```
/// use nakapay_sync::{config::SyncConfig, transport::{TransportKind, select_transport}};
///
/// let config = SyncConfig::from_toml(
///     r#"
///     base_url = "https://shop.example.com"
///     use_server_stream = true
///     "#,
/// )
/// .unwrap();
/// let transport = select_transport(&config).unwrap();
/// assert_eq!(transport.kind(), TransportKind::ServerStream);
/// ```
pub fn select_transport(config: &SyncConfig) -> Result<Box<dyn StatusTransport>> {
    let kind = selected_kind(config);
    let transport: Box<dyn StatusTransport> = match kind {
        TransportKind::PubSub => Box::new(PubSubTransport::new(config)?),
        TransportKind::Socket => Box::new(SocketTransport::new(config)?),
        TransportKind::ServerStream => Box::new(ServerStreamTransport::new(config)?),
        TransportKind::Polling => Box::new(PollingTransport::new(config)?),
    };
    info!(transport = %kind, "Status transport selected");
    Ok(transport)
}
