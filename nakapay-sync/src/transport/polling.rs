//! Polling transport.
//!
//! Requests `{status_endpoint}/{paymentId}` once per interval. The first
//! request goes out one interval after connect. A non-success response is a
//! miss, not an error: the next tick simply tries again. Polling stops by
//! itself after reporting a terminal status.

use std::time::Duration;

use reqwest::Client;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{
    ConnectionState, EventSink, StatusTransport, TransportKind, TransportTask,
    http::{append_segment, build_client, get_bytes},
};
use crate::{
    config::SyncConfig,
    error::{Result, SyncError},
    normalize,
};

/// Periodic HTTP status polling.
///
/// Requires no configuration beyond the status endpoint, which has a default,
/// so it is always selectable.
///
/// # Examples
///
/// ```rust,no_run
/// use nakapay_sync::{
///     config::SyncConfig,
///     transport::{EventSink, PollingTransport, StatusTransport},
/// };
///
/// # async fn example() -> nakapay_sync::Result<()> {
/// let config = SyncConfig::from_toml(r#"base_url = "https://shop.example.com""#)?;
/// let mut transport = PollingTransport::new(&config)?;
///
/// let (sink, mut signals) = EventSink::channel();
/// transport.connect("p1", sink)?;
/// while let Some(signal) = signals.recv().await {
///     println!("{signal:?}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PollingTransport {
    client: Client,
    status_url: Url,
    interval: Duration,
    task: Option<TransportTask>,
}

impl PollingTransport {
    /// Creates a polling transport from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the status endpoint cannot be resolved or the HTTP
    /// client cannot be built.
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let status_url = config.resolve(&config.status_endpoint)?;
        let client = build_client(&config.http)?;
        Ok(Self::with_client(client, status_url, config.poll_interval()))
    }

    /// Creates a polling transport around an existing client.
    #[must_use]
    pub fn with_client(client: Client, status_url: Url, interval: Duration) -> Self {
        Self { client, status_url, interval, task: None }
    }

    /// Polling interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

impl StatusTransport for PollingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Polling
    }

    fn connect(&mut self, payment_id: &str, sink: EventSink) -> Result<()> {
        self.disconnect();
        let url = append_segment(&self.status_url, payment_id)?;
        let worker = PollWorker {
            client: self.client.clone(),
            url,
            interval: self.interval,
            payment_id: payment_id.to_owned(),
            sink,
            state: ConnectionState::Disconnected,
        };
        self.task = Some(TransportTask::spawn(worker.run()));
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.task.take().is_some() {
            debug!(transport = "polling", "Polling stopped");
        }
    }

    fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

struct PollWorker {
    client: Client,
    url: Url,
    interval: Duration,
    payment_id: String,
    sink: EventSink,
    state: ConnectionState,
}

impl PollWorker {
    #[instrument(skip(self), fields(transport = "polling", payment_id = %self.payment_id))]
    async fn run(mut self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.set_state(ConnectionState::Connecting);
        info!(interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX), "Polling started");

        loop {
            ticker.tick().await;
            if self.sink.is_closed() {
                break;
            }
            if self.poll_once().await {
                debug!("Terminal status observed, polling finished");
                break;
            }
        }
    }

    /// Returns `true` once a terminal status has been delivered.
    async fn poll_once(&mut self) -> bool {
        let body = match get_bytes(&self.client, &self.url).await {
            Ok(body) => body,
            Err(SyncError::TransportError(message)) => {
                // Reachable but not answering with a status yet.
                debug!(%message, "Status poll missed");
                return false;
            }
            Err(error) => {
                warn!(%error, "Status poll failed, retrying next tick");
                self.set_state(ConnectionState::Disconnected);
                return false;
            }
        };
        self.set_state(ConnectionState::Connected);

        match normalize::from_poll(&body, &self.payment_id) {
            Ok(Some(event)) if event.status.is_terminal() => {
                self.sink.emit(event);
                true
            }
            Ok(_) => false,
            Err(error) => {
                warn!(%error, "Dropping malformed status response");
                false
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            self.state = state;
            self.sink.connection(state);
        }
    }
}
