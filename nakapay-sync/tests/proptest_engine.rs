//! Property tests for the engine's terminal-transition rules.

mod common;

use std::sync::Arc;

use common::{Recorder, payment};
use nakapay_sync::{
    SyncEngine,
    error::Result,
    payment::{EventOrigin, PaymentStatus, StatusEvent},
    transport::{EventSink, StatusTransport, TransportKind},
};
use proptest::prelude::*;

/// Transport that never produces anything on its own.
#[derive(Debug)]
struct SilentTransport;

impl StatusTransport for SilentTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Polling
    }

    fn connect(&mut self, _payment_id: &str, _sink: EventSink) -> Result<()> {
        Ok(())
    }

    fn disconnect(&mut self) {}

    fn is_active(&self) -> bool {
        false
    }
}

fn status() -> impl Strategy<Value = PaymentStatus> {
    prop_oneof![
        Just(PaymentStatus::Pending),
        Just(PaymentStatus::Completed),
        Just(PaymentStatus::Failed),
        Just(PaymentStatus::Expired),
    ]
}

fn event() -> impl Strategy<Value = StatusEvent> {
    ("p1|p2|other", status()).prop_map(|(id, status)| {
        StatusEvent::new(id, status, EventOrigin::Transport(TransportKind::Polling))
    })
}

fn engine(recorder: &Arc<Recorder>) -> SyncEngine {
    SyncEngine::with_transport(payment("p1"), Box::new(SilentTransport), 3600, recorder.clone())
        .expect("silent transport connects")
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_time().build().expect("runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn test_first_matching_terminal_event_wins(events in prop::collection::vec(event(), 0..24)) {
        let rt = runtime();
        let _guard = rt.enter();
        let recorder = Arc::new(Recorder::default());
        let mut engine = engine(&recorder);

        let transitions: Vec<PaymentStatus> =
            events.iter().cloned().filter_map(|e| engine.on_status_event(e)).collect();

        let expected = events
            .iter()
            .find(|e| e.payment_id == "p1" && e.status.is_terminal())
            .map(|e| e.status);

        prop_assert!(transitions.len() <= 1);
        prop_assert_eq!(transitions.first().copied(), expected);
        prop_assert_eq!(engine.state(), expected.unwrap_or(PaymentStatus::Pending));

        let outcomes = recorder
            .log()
            .iter()
            .filter(|entry| entry.starts_with("success:") || entry.starts_with("error:"))
            .count();
        prop_assert_eq!(outcomes, usize::from(expected.is_some()));
    }

    #[test]
    fn test_foreign_events_never_transition(
        events in prop::collection::vec(("p2|other|P1|p1 ", status()), 0..24),
    ) {
        let rt = runtime();
        let _guard = rt.enter();
        let recorder = Arc::new(Recorder::default());
        let mut engine = engine(&recorder);

        for (id, status) in events {
            let event = StatusEvent::new(id, status, EventOrigin::Transport(TransportKind::Socket));
            prop_assert_eq!(engine.on_status_event(event), None);
        }
        prop_assert_eq!(engine.state(), PaymentStatus::Pending);
        prop_assert!(recorder.log().is_empty());
    }

    #[test]
    fn test_nothing_is_reported_after_stop(events in prop::collection::vec(event(), 0..24)) {
        let rt = runtime();
        let _guard = rt.enter();
        let recorder = Arc::new(Recorder::default());
        let mut engine = engine(&recorder);

        engine.stop();
        for event in events {
            prop_assert_eq!(engine.on_status_event(event), None);
        }
        prop_assert!(recorder.log().is_empty());
    }
}
