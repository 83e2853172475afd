//! Trailing-edge debouncing.
//!
//! Rapid toggles (clicking through several tag checkboxes, flipping recursive
//! mode back and forth) should produce one recompute, not one per click. A
//! [`Debouncer`] holds the latest pending value and releases it once no new
//! value has arrived for a full quiescence window.
//!
//! It is meant to sit in a `tokio::select!` next to the event source:
//!
//! ```text
//! loop {
//!     select! {
//!         event = events.recv()      => debouncer.push(event),
//!         value = debouncer.settled() => apply(value),
//!     }
//! }
//! ```
//!
//! [`Debouncer::settled`] is cancel-safe: dropping it mid-wait loses nothing.

use std::time::Duration;
use tokio::time::{Instant, sleep_until};

#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    /// Replace the pending value and restart the window.
    pub fn push(&mut self, value: T) {
        self.pending = Some((value, Instant::now() + self.window));
    }

    /// Replace the pending value with `f(previous)` and restart the window.
    pub fn update(&mut self, f: impl FnOnce(Option<T>) -> T) {
        let previous = self.pending.take().map(|(value, _)| value);
        self.push(f(previous));
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop the pending value without releasing it.
    pub fn clear(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }

    /// Wait until the pending value has been quiet for a full window, then
    /// take it. Never resolves while nothing is pending.
    pub async fn settled(&mut self) -> T {
        loop {
            let Some((_, deadline)) = self.pending.as_ref() else {
                std::future::pending::<()>().await;
                continue;
            };
            let deadline = *deadline;
            sleep_until(deadline).await;
            if let Some((value, _)) = self.pending.take() {
                return value;
            }
        }
    }
}
