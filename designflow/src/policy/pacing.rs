//! Pacing of calls against a throughput-limited provider.

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Decides when the next provider call may start.
#[async_trait]
pub trait Pacer: Send + Sync + Debug {
    /// Waits until a call may be issued.
    async fn acquire(&self);
}

/// A pacer that never waits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacing;

#[async_trait]
impl Pacer for NoPacing {
    async fn acquire(&self) {}
}

/// Enforces a minimum spacing between consecutive call starts.
///
/// Each caller reserves the next free slot under the lock and then sleeps
/// outside it, so concurrent callers are released one interval apart in the
/// order they reserved.
#[derive(Debug)]
pub struct MinIntervalPacer {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl MinIntervalPacer {
    /// Creates a pacer with the given minimum interval.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Returns the configured interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl Pacer for MinIntervalPacer {
    async fn acquire(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };

        if slot > Instant::now() {
            tracing::debug!(wait_ms = (slot - Instant::now()).as_millis() as u64, "Pacing image call");
            tokio::time::sleep_until(slot).await;
        }
    }
}
