//! WebSocket helpers shared by the pub/sub and socket transports.

use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::error::{Result, SyncError};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Maps `http(s)` to `ws(s)`; leaves `ws(s)` untouched.
pub(crate) fn to_ws_url(url: &Url) -> Result<Url> {
    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => {
            return Err(SyncError::InvalidUrl(format!(
                "unsupported WebSocket scheme '{other}' in {url}"
            )));
        }
    };
    let mut url = url.clone();
    url.set_scheme(scheme)
        .map_err(|()| SyncError::InvalidUrl(format!("cannot switch {url} to {scheme}")))?;
    Ok(url)
}

/// Opens a WebSocket connection.
pub(crate) async fn connect(url: &Url) -> Result<WsStream> {
    let (stream, _response) = connect_async(url.as_str()).await?;
    Ok(stream)
}
