//! Server-sent events transport.
//!
//! Opens `GET {stream_endpoint}?paymentId={id}` with
//! `Accept: text/event-stream` and reads the body as an SSE stream. Each
//! event's data is a JSON envelope handed to
//! [`normalize::from_stream`]. Malformed messages are logged and dropped;
//! a closed or failed stream is reopened with backoff.

use futures_util::StreamExt;
use reqwest::{Client, header};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{
    ConnectionState, EventSink, StatusTransport, TransportKind, TransportTask,
    http::{build_stream_client, with_query},
};
use crate::{
    config::SyncConfig,
    error::{Result, SyncError},
    normalize,
    reliability::{Backoff, ReconnectPolicy, is_transient},
};

/// Unidirectional server push over SSE.
#[derive(Debug)]
pub struct ServerStreamTransport {
    client: Client,
    stream_url: Url,
    policy: ReconnectPolicy,
    task: Option<TransportTask>,
}

impl ServerStreamTransport {
    /// Creates a server-stream transport from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the stream endpoint cannot be resolved or the HTTP
    /// client cannot be built.
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let stream_url = config.resolve(&config.stream_endpoint)?;
        let client = build_stream_client(&config.http)?;
        Ok(Self { client, stream_url, policy: config.reconnect.policy(), task: None })
    }

    /// Stream URL for `payment_id`.
    #[must_use]
    pub fn url_for(&self, payment_id: &str) -> Url {
        with_query(&self.stream_url, "paymentId", payment_id)
    }
}

impl StatusTransport for ServerStreamTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::ServerStream
    }

    fn connect(&mut self, payment_id: &str, sink: EventSink) -> Result<()> {
        self.disconnect();
        let worker = StreamWorker {
            client: self.client.clone(),
            url: self.url_for(payment_id),
            payment_id: payment_id.to_owned(),
            sink,
        };
        let backoff = self.policy.backoff();
        self.task = Some(TransportTask::spawn(worker.run(backoff)));
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.task.take().is_some() {
            debug!(transport = "server-stream", "Event stream closed");
        }
    }

    fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

enum StreamEnd {
    /// Server ended the response body.
    Closed,
    /// A terminal status was delivered; no reconnect.
    Terminal,
}

struct StreamWorker {
    client: Client,
    url: Url,
    payment_id: String,
    sink: EventSink,
}

impl StreamWorker {
    #[instrument(skip(self, backoff), fields(transport = "server-stream", payment_id = %self.payment_id))]
    async fn run(self, mut backoff: Backoff) {
        loop {
            self.sink.connection(ConnectionState::Connecting);
            match self.listen(&mut backoff).await {
                Ok(StreamEnd::Terminal) => return,
                Ok(StreamEnd::Closed) => info!("Event stream ended by server"),
                Err(error) if is_transient(&error) => warn!(%error, "Event stream failed"),
                Err(error) => warn!(%error, attempts = backoff.attempts(), "Event stream failed, check configuration"),
            }
            if !self.sink.connection(ConnectionState::Disconnected) {
                return;
            }
            backoff.wait("server-stream").await;
        }
    }

    async fn listen(&self, backoff: &mut Backoff) -> Result<StreamEnd> {
        let response = self
            .client
            .get(self.url.clone())
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::TransportError(format!(
                "stream endpoint returned status {}",
                status.as_u16()
            )));
        }

        self.sink.connection(ConnectionState::Connected);
        backoff.reset();
        info!("Event stream connected");

        let mut decoder = SseDecoder::default();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for data in decoder.feed(&chunk) {
                let data = match data {
                    Ok(data) => data,
                    Err(error) => {
                        warn!(%error, "Dropping malformed stream message");
                        continue;
                    }
                };
                match normalize::from_stream(&data, &self.payment_id) {
                    Ok(Some(event)) if event.status.is_terminal() => {
                        self.sink.emit(event);
                        return Ok(StreamEnd::Terminal);
                    }
                    Ok(_) => {}
                    Err(error) => warn!(%error, "Dropping malformed stream message"),
                }
            }
        }
        Ok(StreamEnd::Closed)
    }
}

/// Longest line the decoder buffers before giving up on it.
pub(crate) const MAX_LINE_BYTES: usize = 64 * 1024;

/// Incremental decoder for the `text/event-stream` format.
///
/// Yields the joined `data` of each complete event. `event`, `id` and
/// `retry` fields and comment lines are skipped. A line longer than
/// [`MAX_LINE_BYTES`] is reported once as malformed and discarded along
/// with the data gathered so far for its event.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    // Bytes of `buffer` already known to hold no newline.
    scanned: usize,
    discarding: bool,
    data: Vec<String>,
}

impl SseDecoder {
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<Result<String>> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            let mut raw: Vec<u8> = self.buffer.drain(..=end).collect();
            self.scanned = 0;
            raw.pop();
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if raw.len() > MAX_LINE_BYTES {
                events.push(Err(self.oversized()));
                continue;
            }
            if let Some(data) = self.line(&String::from_utf8_lossy(&raw)) {
                events.push(Ok(data));
            }
        }

        self.scanned = self.buffer.len();
        if self.buffer.len() > MAX_LINE_BYTES {
            self.buffer.clear();
            self.scanned = 0;
            if !self.discarding {
                self.discarding = true;
                events.push(Err(self.oversized()));
            }
        }
        events
    }

    fn line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            let data = self.data.join("\n");
            self.data.clear();
            return Some(data);
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_owned());
        }
        None
    }

    fn oversized(&mut self) -> SyncError {
        self.data.clear();
        SyncError::MalformedPayload(format!("stream line exceeds {MAX_LINE_BYTES} bytes"))
    }
}
