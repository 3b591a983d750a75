// =============================================================================
// Clock abstraction — wall-clock time and scheduled waits
// =============================================================================
//
// All internal timestamps are UTC milliseconds. The engine never calls
// `Utc::now()` directly; everything flows through a `Clock` so that replay
// sessions and tests can drive time deterministically.
// =============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::Duration;

/// Source of wall-clock time plus the ability to suspend until a deadline.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current time in UTC milliseconds.
    fn now_ms(&self) -> i64;

    /// Suspend until the wall clock reaches `deadline_ms`. Returns
    /// immediately if the deadline is already past.
    async fn wait_until(&self, deadline_ms: i64);
}

// ---------------------------------------------------------------------------
// SystemClock
// ---------------------------------------------------------------------------

/// Real wall-clock backed by chrono + tokio timers.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    async fn wait_until(&self, deadline_ms: i64) {
        let now = self.now_ms();
        if deadline_ms > now {
            tokio::time::sleep(Duration::from_millis((deadline_ms - now) as u64)).await;
        }
    }
}

// ---------------------------------------------------------------------------
// SimulatedClock
// ---------------------------------------------------------------------------

/// Deterministic clock for replay sessions and tests.
///
/// `wait_until` advances the simulated time to the deadline instead of
/// sleeping, so a full trading session replays in microseconds while every
/// time-derived decision (session windows, pacing windows) stays faithful.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    now_ms: Arc<Mutex<i64>>,
}

impl SimulatedClock {
    /// Create a simulated clock starting at `start_ms`.
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: Arc::new(Mutex::new(start_ms)),
        }
    }

    /// Move the clock forward to `ms`. Ignored if `ms` is in the past —
    /// simulated time never runs backwards.
    pub fn advance_to(&self, ms: i64) {
        let mut now = self.now_ms.lock();
        if ms > *now {
            *now = ms;
        }
    }

    /// Move the clock forward by `delta_ms`.
    pub fn advance_by(&self, delta_ms: i64) {
        let mut now = self.now_ms.lock();
        *now += delta_ms.max(0);
    }
}

#[async_trait]
impl Clock for SimulatedClock {
    fn now_ms(&self) -> i64 {
        *self.now_ms.lock()
    }

    async fn wait_until(&self, deadline_ms: i64) {
        self.advance_to(deadline_ms);
        // Yield once so concurrent tasks observe the new time.
        tokio::task::yield_now().await;
    }
}
