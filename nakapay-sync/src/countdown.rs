//! Local expiry countdown.
//!
//! Ticks once per second from a fixed budget, independent of transport
//! connectivity. The engine polls [`Countdown::tick`] alongside the
//! transport channel and forces an `expired` event when it reaches zero.

use std::time::Duration;

use tokio::time::{Instant, Interval, interval_at};

const TICK: Duration = Duration::from_secs(1);

/// One-second countdown from a budget in seconds.
#[derive(Debug)]
pub struct Countdown {
    remaining: u64,
    ticker: Interval,
}

impl Countdown {
    /// Starts a countdown. The first tick fires one second from now.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(budget_secs: u64) -> Self {
        Self { remaining: budget_secs, ticker: interval_at(Instant::now() + TICK, TICK) }
    }

    /// Seconds left before expiry.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Returns `true` once the budget is used up.
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        self.remaining == 0
    }

    /// Waits for the next tick and returns the remaining seconds.
    ///
    /// Cancel safe: a tick that is not awaited to completion is not lost.
    pub async fn tick(&mut self) -> u64 {
        self.ticker.tick().await;
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining
    }
}

/// Formats seconds as `MM:SS`. Minutes are not wrapped into hours.
///
/// # Examples
///
/// ```
/// use nakapay_sync::countdown::format_remaining;
///
/// assert_eq!(format_remaining(3600), "60:00");
/// assert_eq!(format_remaining(61), "01:01");
/// ```
#[must_use]
pub fn format_remaining(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
