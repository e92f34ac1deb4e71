//! Reliability patterns for push transports.
//!
//! Provides the exponential reconnect backoff used by the pub/sub, socket and
//! server-stream adapters when their connection drops.

mod reconnect;

pub use reconnect::{Backoff, ReconnectPolicy, is_transient};
