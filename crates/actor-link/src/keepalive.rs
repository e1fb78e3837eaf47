//! Traffic bookkeeping for the keep-alive protocol.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

/// Records when traffic last moved in each direction and answers whether the
/// interval ticker should emit a Ping.
///
/// The tracker is shared between the channel's driver task (ticks, inbound
/// frames) and caller threads (outbound sends), so all methods take `&self`.
/// Timestamps use `tokio::time::Instant`, which follows the runtime's
/// virtual clock in paused-time tests.
pub struct KeepAliveTracker {
    interval: Duration,
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    running: bool,
    last_sent: Option<Instant>,
    last_received: Option<Instant>,
}

impl KeepAliveTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Begin tracking. Stamps both directions with the current time so the
    /// first interval is measured from session start, not from epoch.
    pub fn start(&self) {
        let mut inner = self.lock();
        inner.running = true;
        inner.last_sent = Some(Instant::now());
        inner.last_received = Some(Instant::now());
    }

    pub fn stop(&self) {
        self.lock().running = false;
    }

    /// Restart the interval measurement from now.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.last_sent = Some(Instant::now());
        inner.last_received = Some(Instant::now());
    }

    pub fn on_data_sent(&self) {
        self.lock().last_sent = Some(Instant::now());
    }

    pub fn on_data_received(&self) {
        self.lock().last_received = Some(Instant::now());
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// True when the tracker is running and nothing was sent within the
    /// interval. Quiet outbound halves are what Pings are for; a chatty
    /// connection never needs one.
    pub fn should_send_keepalive(&self) -> bool {
        let inner = self.lock();
        if !inner.running {
            return false;
        }
        match inner.last_sent {
            Some(at) => at.elapsed() >= self.interval,
            None => true,
        }
    }

    /// Time since the last outbound traffic, if any was ever recorded.
    pub fn last_sent_elapsed(&self) -> Option<Duration> {
        self.lock().last_sent.map(|at| at.elapsed())
    }

    /// Time since the last inbound traffic, if any was ever recorded.
    pub fn last_received_elapsed(&self) -> Option<Duration> {
        self.lock().last_received.map(|at| at.elapsed())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
