//! Payment status synchronization engine.
//!
//! A [`SyncEngine`] tracks one payment from `pending` to exactly one terminal
//! status. It owns the selected transport, the expiry countdown and the
//! receiving end of the transport channel; all state changes happen inside
//! methods taking `&mut self`, driven by [`SyncEngine::run`] on a single
//! task.
//!
//! # Guarantees
//!
//! - The first terminal event wins. Later events, including the countdown,
//!   are discarded.
//! - Events for another payment id are discarded.
//! - After [`SyncEngine::stop`] returns no observer method is called again.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use nakapay_sync::{
//!     config::SyncConfig, engine::SyncEngine, observer::CallbackObserver, payment::Payment,
//! };
//!
//! # async fn example(payment: Payment) -> nakapay_sync::Result<()> {
//! let config = SyncConfig::from_file("nakapay.toml")?;
//! let observer = CallbackObserver::new().on_success(|p| println!("paid {}", p.id));
//!
//! let mut engine = SyncEngine::start(payment, &config, Arc::new(observer))?;
//! let status = engine.run().await?;
//! println!("final status: {status}");
//! # Ok(())
//! # }
//! ```

use std::{fmt, future::Future, sync::Arc};

use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use crate::{
    config::SyncConfig,
    countdown::Countdown,
    error::{PaymentError, Result, SyncError},
    observer::PaymentObserver,
    payment::{Payment, PaymentStatus, StatusEvent},
    transport::{
        ConnectionState, EventSink, StatusTransport, TransportKind, TransportSignal,
        select_transport,
    },
};

/// Single-payment synchronization state machine.
pub struct SyncEngine {
    payment: Payment,
    state: PaymentStatus,
    transport: Box<dyn StatusTransport>,
    connection: ConnectionState,
    countdown: Option<Countdown>,
    remaining: u64,
    signals: mpsc::UnboundedReceiver<TransportSignal>,
    // Keeps `signals` open while the transport reconnects.
    _sink: EventSink,
    observer: Arc<dyn PaymentObserver>,
    stopped: bool,
}

enum Step {
    Signal(Option<TransportSignal>),
    Tick(u64),
}

impl SyncEngine {
    /// Selects a transport from `config`, connects it and starts the countdown.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the selected transport cannot be built or connected.
    pub fn start(
        payment: Payment,
        config: &SyncConfig,
        observer: Arc<dyn PaymentObserver>,
    ) -> Result<Self> {
        let transport = select_transport(config)?;
        Self::with_transport(payment, transport, config.countdown_budget_secs, observer)
    }

    /// Starts tracking with an explicit transport and countdown budget.
    ///
    /// # Errors
    ///
    /// Returns error if the transport fails to connect.
    pub fn with_transport(
        mut payment: Payment,
        mut transport: Box<dyn StatusTransport>,
        budget_secs: u64,
        observer: Arc<dyn PaymentObserver>,
    ) -> Result<Self> {
        let (sink, signals) = EventSink::channel();
        transport.connect(&payment.id, sink.clone())?;
        payment.status = PaymentStatus::Pending;

        info!(
            payment_id = %payment.id,
            transport = %transport.kind(),
            budget_secs,
            "Tracking payment"
        );

        Ok(Self {
            payment,
            state: PaymentStatus::Pending,
            transport,
            connection: ConnectionState::Disconnected,
            countdown: Some(Countdown::start(budget_secs)),
            remaining: budget_secs,
            signals,
            _sink: sink,
            observer,
            stopped: false,
        })
    }

    /// Current status.
    #[must_use]
    pub const fn state(&self) -> PaymentStatus {
        self.state
    }

    /// Tracked payment, updated with the terminal snapshot once known.
    #[must_use]
    pub const fn payment(&self) -> &Payment {
        &self.payment
    }

    /// Seconds left before local expiry.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Last reported connection state of the transport.
    #[must_use]
    pub const fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    /// Kind of the active transport.
    #[must_use]
    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Returns `true` once stopped explicitly or after a terminal status.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Applies a status event.
    ///
    /// Returns the new status when this event caused the terminal
    /// transition, `None` when it was discarded.
    pub fn on_status_event(&mut self, event: StatusEvent) -> Option<PaymentStatus> {
        if self.stopped || self.state.is_terminal() {
            debug!(status = %event.status, origin = %event.origin, "Discarding event after terminal status");
            return None;
        }
        if event.payment_id != self.payment.id {
            debug!(
                payment_id = %event.payment_id,
                tracked = %self.payment.id,
                "Discarding event for another payment"
            );
            return None;
        }

        let status = event.status;
        let error = match status {
            PaymentStatus::Pending => return None,
            PaymentStatus::Completed => None,
            PaymentStatus::Failed => Some(PaymentError::Failed { reason: event.reason_or_default() }),
            PaymentStatus::Expired => Some(PaymentError::Expired { reason: event.reason_or_default() }),
        };

        self.state = status;
        if let Some(snapshot) = event.payment.filter(|p| p.id == self.payment.id) {
            self.payment = snapshot;
        }
        self.payment.status = status;
        info!(payment_id = %self.payment.id, %status, origin = %event.origin, "Payment reached terminal status");

        self.observer.on_status_change(status);
        match &error {
            None => self.observer.on_payment_success(&self.payment),
            Some(error) => self.observer.on_payment_error(error),
        }

        self.shutdown();
        Some(status)
    }

    /// Drives the engine until the payment reaches a terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::EngineStopped`] if the engine was stopped before
    /// a terminal status was reached.
    #[instrument(skip(self), fields(payment_id = %self.payment.id))]
    pub async fn run(&mut self) -> Result<PaymentStatus> {
        loop {
            if self.state.is_terminal() {
                return Ok(self.state);
            }
            if self.stopped {
                return Err(SyncError::EngineStopped);
            }

            let step = tokio::select! {
                biased;
                signal = self.signals.recv() => Step::Signal(signal),
                remaining = next_tick(&mut self.countdown) => Step::Tick(remaining),
            };

            match step {
                Step::Signal(Some(TransportSignal::Event(event))) => {
                    self.on_status_event(event);
                }
                Step::Signal(Some(TransportSignal::Connection(state))) => self.on_connection(state),
                Step::Signal(None) => return Err(SyncError::EngineStopped),
                Step::Tick(remaining) => self.on_tick(remaining),
            }
        }
    }

    /// Like [`run`](Self::run), but stops the engine when `shutdown` resolves
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::EngineStopped`] if `shutdown` won.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<PaymentStatus>
    where
        F: Future<Output = ()>,
    {
        let outcome = tokio::select! {
            biased;
            () = shutdown => None,
            result = self.run() => Some(result),
        };
        outcome.unwrap_or_else(|| {
            self.stop();
            Err(SyncError::EngineStopped)
        })
    }

    /// Disconnects the transport and halts the countdown. Idempotent.
    ///
    /// No observer method is invoked after this returns.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.shutdown();
        info!(payment_id = %self.payment.id, state = %self.state, "Synchronization stopped");
    }

    fn shutdown(&mut self) {
        self.stopped = true;
        self.transport.disconnect();
        self.countdown = None;
        self.signals.close();
    }

    fn on_connection(&mut self, state: ConnectionState) {
        if state == self.connection {
            return;
        }
        self.connection = state;
        let kind = self.transport.kind();
        debug!(transport = %kind, ?state, "Connection state changed");
        self.observer.on_connection_change(kind, state);
    }

    fn on_tick(&mut self, remaining: u64) {
        self.remaining = remaining;
        self.observer.on_countdown(remaining);
        if remaining == 0 {
            info!(payment_id = %self.payment.id, "Countdown expired");
            self.on_status_event(StatusEvent::countdown_expired(self.payment.id.clone()));
        }
    }
}

async fn next_tick(countdown: &mut Option<Countdown>) -> u64 {
    match countdown {
        Some(countdown) => countdown.tick().await,
        None => std::future::pending().await,
    }
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("payment_id", &self.payment.id)
            .field("state", &self.state)
            .field("transport", &self.transport)
            .field("connection", &self.connection)
            .field("remaining", &self.remaining)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
