//! Consumer-facing callbacks.
//!
//! The engine reports through a [`PaymentObserver`]. Every method has a no-op
//! default, so consumers implement only what they render. Calls are made
//! from the task driving the engine, one at a time, and never after
//! [`SyncEngine::stop`](crate::engine::SyncEngine::stop) returns.

use std::fmt;

use crate::{
    error::PaymentError,
    payment::{Payment, PaymentStatus},
    transport::{ConnectionState, TransportKind},
};

/// Receiver of payment lifecycle notifications.
///
/// `on_status_change`, `on_payment_success` and `on_payment_error` fire at
/// most once per engine, for the single terminal transition.
pub trait PaymentObserver: Send + Sync {
    /// Terminal status reached.
    fn on_status_change(&self, _status: PaymentStatus) {}

    /// Payment created by the creation service, before tracking starts.
    fn on_payment_created(&self, _payment: &Payment) {}

    /// Payment completed. Receives the latest known snapshot.
    fn on_payment_success(&self, _payment: &Payment) {}

    /// Creation failed, or the payment failed or expired.
    fn on_payment_error(&self, _error: &PaymentError) {}

    /// Transport connection state changed. Informational.
    fn on_connection_change(&self, _transport: TransportKind, _state: ConnectionState) {}

    /// Countdown ticked; `remaining` seconds left.
    fn on_countdown(&self, _remaining: u64) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PaymentObserver for NoopObserver {}

type Callback<T> = Box<dyn Fn(T) + Send + Sync>;

/// Observer assembled from closures.
///
/// # Examples
///
/// ```
/// use nakapay_sync::observer::CallbackObserver;
///
/// let observer = CallbackObserver::new()
///     .on_success(|payment| println!("paid: {}", payment.id))
///     .on_error(|error| eprintln!("payment error: {error}"));
/// ```
#[derive(Default)]
pub struct CallbackObserver {
    status: Option<Callback<PaymentStatus>>,
    created: Option<Box<dyn Fn(&Payment) + Send + Sync>>,
    success: Option<Box<dyn Fn(&Payment) + Send + Sync>>,
    error: Option<Box<dyn Fn(&PaymentError) + Send + Sync>>,
    connection: Option<Callback<(TransportKind, ConnectionState)>>,
    countdown: Option<Callback<u64>>,
}

impl CallbackObserver {
    /// Creates an observer with no callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the terminal status callback.
    #[must_use]
    pub fn on_status(mut self, f: impl Fn(PaymentStatus) + Send + Sync + 'static) -> Self {
        self.status = Some(Box::new(f));
        self
    }

    /// Sets the payment created callback.
    #[must_use]
    pub fn on_created(mut self, f: impl Fn(&Payment) + Send + Sync + 'static) -> Self {
        self.created = Some(Box::new(f));
        self
    }

    /// Sets the success callback.
    #[must_use]
    pub fn on_success(mut self, f: impl Fn(&Payment) + Send + Sync + 'static) -> Self {
        self.success = Some(Box::new(f));
        self
    }

    /// Sets the error callback.
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&PaymentError) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    /// Sets the connection state callback.
    #[must_use]
    pub fn on_connection(
        mut self,
        f: impl Fn(TransportKind, ConnectionState) + Send + Sync + 'static,
    ) -> Self {
        self.connection = Some(Box::new(move |(kind, state)| f(kind, state)));
        self
    }

    /// Sets the countdown callback, called with the remaining seconds.
    #[must_use]
    pub fn on_tick(mut self, f: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.countdown = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for CallbackObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackObserver")
            .field("status", &self.status.is_some())
            .field("created", &self.created.is_some())
            .field("success", &self.success.is_some())
            .field("error", &self.error.is_some())
            .field("connection", &self.connection.is_some())
            .field("countdown", &self.countdown.is_some())
            .finish_non_exhaustive()
    }
}

impl PaymentObserver for CallbackObserver {
    fn on_status_change(&self, status: PaymentStatus) {
        if let Some(f) = &self.status {
            f(status);
        }
    }

    fn on_payment_created(&self, payment: &Payment) {
        if let Some(f) = &self.created {
            f(payment);
        }
    }

    fn on_payment_success(&self, payment: &Payment) {
        if let Some(f) = &self.success {
            f(payment);
        }
    }

    fn on_payment_error(&self, error: &PaymentError) {
        if let Some(f) = &self.error {
            f(error);
        }
    }

    fn on_connection_change(&self, transport: TransportKind, state: ConnectionState) {
        if let Some(f) = &self.connection {
            f((transport, state));
        }
    }

    fn on_countdown(&self, remaining: u64) {
        if let Some(f) = &self.countdown {
            f(remaining);
        }
    }
}
