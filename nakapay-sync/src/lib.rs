//! NakaPay Sync: Payment Status Synchronization
//!
//! A Rust library that follows a single payment from creation until it
//! completes, fails or expires, reporting exactly one terminal outcome even
//! when several sources race to report it.
//!
//! # What does it do?
//!
//! A payment created by a merchant backend settles asynchronously. The
//! consumer needs to know when, over whatever notification channel the
//! deployment offers. NakaPay Sync provides:
//!
//! - **Transport selection**: pub/sub, socket, server-sent events or polling,
//!   chosen once by fixed precedence and available configuration
//! - **Normalization**: every transport's payload mapped to one [`StatusEvent`]
//! - **Local expiry**: a one-second countdown that forces `expired` when the
//!   budget runs out, independent of connectivity
//! - **At-most-once delivery**: success or error is reported once per payment
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐      ┌────────────────────────────────────────┐
//! │ Creation Service │─────▶│             SyncEngine                 │
//! │ (POST payment)   │      │  ┌──────────────┐   ┌──────────────┐   │
//! └──────────────────┘      │  │  Transport   │   │  Countdown   │   │
//!                           │  │  (selected)  │   │  (1s ticks)  │   │
//!                           │  └──────┬───────┘   └──────┬───────┘   │
//!                           │         │ StatusEvent      │ expired   │
//!                           │  ┌──────▼──────────────────▼───────┐   │
//!                           │  │  Pending ──▶ terminal (once)    │   │
//!                           │  └──────────────┬──────────────────┘   │
//!                           └─────────────────┼──────────────────────┘
//!                                             ▼
//!                                     PaymentObserver
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use nakapay_sync::{
//!     checkout::Checkout, config::SyncConfig, observer::CallbackObserver,
//!     payment::CreatePaymentRequest,
//! };
//!
//! # async fn example() -> nakapay_sync::Result<()> {
//! let config = SyncConfig::from_toml(
//!     r#"
//!     base_url = "https://shop.example.com"
//!     use_server_stream = true
//!     "#,
//! )?;
//!
//! let observer = CallbackObserver::new()
//!     .on_created(|payment| println!("pay this invoice: {}", payment.invoice))
//!     .on_success(|payment| println!("payment {} completed", payment.id))
//!     .on_error(|error| eprintln!("payment error: {error}"));
//!
//! let request = CreatePaymentRequest::new(1000, "Coffee");
//! let mut engine = Checkout::begin(&request, &config, Arc::new(observer)).await?;
//! let status = engine.run().await?;
//! println!("final status: {status}");
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`engine`]: the synchronization state machine
//! - [`transport`]: transport trait, the four implementations and the selector
//! - [`normalize`]: per-transport payload mapping
//! - [`countdown`]: local expiry timer
//! - [`observer`]: consumer callbacks
//! - [`creation`] and [`checkout`]: payment creation and the create-then-track flow
//! - [`config`]: TOML configuration
//! - [`reliability`]: reconnect backoff for push transports
//!
//! # Error Handling
//!
//! Plumbing failures are [`SyncError`]s. Transports absorb them, log them and
//! retry; they never end tracking. Payment outcomes reach the consumer as
//! [`PaymentError`] through [`PaymentObserver::on_payment_error`].
//!
//! [`StatusEvent`]: payment::StatusEvent
//! [`PaymentObserver::on_payment_error`]: observer::PaymentObserver::on_payment_error

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![allow(
    clippy::multiple_crate_versions,
    reason = "transitive dependencies from reqwest and tokio-tungstenite"
)]

pub mod checkout;
pub mod config;
pub mod countdown;
pub mod creation;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod observer;
pub mod payment;
pub mod reliability;
pub mod transport;

pub use checkout::Checkout;
pub use config::SyncConfig;
pub use engine::SyncEngine;
pub use error::{PaymentError, Result, SyncError};
pub use observer::{CallbackObserver, PaymentObserver};
pub use payment::{Payment, PaymentStatus};
