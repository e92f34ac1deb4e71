//! Shared fixtures for integration tests.

#![allow(dead_code, reason = "not every test binary uses every fixture")]

use std::sync::Mutex;

use nakapay_sync::{
    PaymentError, PaymentObserver,
    payment::{Payment, PaymentStatus},
    transport::{ConnectionState, TransportKind},
};

/// Observer that records terminal callbacks as strings.
#[derive(Debug, Default)]
pub struct Recorder {
    log: Mutex<Vec<String>>,
    snapshots: Mutex<Vec<Payment>>,
    connections: Mutex<Vec<ConnectionState>>,
}

impl Recorder {
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn snapshots(&self) -> Vec<Payment> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn connections(&self) -> Vec<ConnectionState> {
        self.connections.lock().unwrap().clone()
    }

    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl PaymentObserver for Recorder {
    fn on_status_change(&self, status: PaymentStatus) {
        self.push(format!("status:{status}"));
    }

    fn on_payment_created(&self, payment: &Payment) {
        self.push(format!("created:{}", payment.id));
    }

    fn on_payment_success(&self, payment: &Payment) {
        self.snapshots.lock().unwrap().push(payment.clone());
        self.push(format!("success:{}", payment.id));
    }

    fn on_payment_error(&self, error: &PaymentError) {
        self.push(format!("error:{error}"));
    }

    fn on_connection_change(&self, _transport: TransportKind, state: ConnectionState) {
        self.connections.lock().unwrap().push(state);
    }
}

pub fn payment(id: &str) -> Payment {
    Payment {
        id: id.to_owned(),
        amount: 1000,
        description: "Coffee".to_owned(),
        invoice: "lnbc10u1pexample".to_owned(),
        status: PaymentStatus::Pending,
        metadata: None,
    }
}
