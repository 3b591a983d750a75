// =============================================================================
// Pacing manager — three-tier admission control for historical-data requests
// =============================================================================
//
// The upstream provider enforces a documented rate-limit regime; this
// manager gates every outbound historical request through three tiers and
// the longest wait wins:
//
//   1. Identity    — the same request key must not repeat within 15 s.
//   2. Contract    — at most 6 admissions per contract per sliding 2 s.
//   3. Global      — at most 60 admissions per sliding 10 min.
//
// Admissions are strictly FIFO: callers serialize through a single
// tokio::sync::Mutex (granted in request order) and only the queue head
// evaluates its wait. After every sleep the wait is recomputed — windows
// slide while we were parked.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex as StateMutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex as QueueMutex};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::EngineError;
use crate::session_config::PacingParams;

/// Snapshot of pacing state after pruning, suitable for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingStatus {
    pub global_used: usize,
    pub global_remaining: usize,
    pub contract_counts: HashMap<String, usize>,
}

// ---------------------------------------------------------------------------
// Internal ledger (behind a parking_lot mutex)
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Ledger {
    /// Last admission time per request key (tier 1).
    last_admit: HashMap<String, i64>,
    /// Admission times per contract within the burst window (tier 2).
    bursts: HashMap<String, VecDeque<i64>>,
    /// Admission times within the global window (tier 3).
    global: VecDeque<i64>,
}

impl Ledger {
    fn prune(&mut self, now: i64, params: &PacingParams) {
        for deque in self.bursts.values_mut() {
            while deque
                .front()
                .is_some_and(|&t| t <= now - params.burst_window_ms)
            {
                deque.pop_front();
            }
        }
        self.bursts.retain(|_, d| !d.is_empty());
        while self
            .global
            .front()
            .is_some_and(|&t| t <= now - params.global_window_ms)
        {
            self.global.pop_front();
        }
    }

    /// Wait (ms) before `request_key`/`contract_id` may be admitted at `now`.
    fn required_wait(
        &mut self,
        now: i64,
        contract_id: &str,
        request_key: &str,
        params: &PacingParams,
    ) -> i64 {
        self.prune(now, params);

        let identity_wait = self
            .last_admit
            .get(request_key)
            .map(|&t| t + params.identity_window_ms - now)
            .unwrap_or(0);

        let burst_wait = match self.bursts.get(contract_id) {
            Some(deque) if deque.len() >= params.burst_limit => deque
                .front()
                .map(|&oldest| oldest + params.burst_window_ms - now)
                .unwrap_or(0),
            _ => 0,
        };

        let global_wait = if self.global.len() >= params.global_limit {
            self.global
                .front()
                .map(|&oldest| oldest + params.global_window_ms - now)
                .unwrap_or(0)
        } else {
            0
        };

        identity_wait.max(burst_wait).max(global_wait).max(0)
    }

    fn record_admission(&mut self, now: i64, contract_id: &str, request_key: &str) {
        self.last_admit.insert(request_key.to_string(), now);
        self.bursts
            .entry(contract_id.to_string())
            .or_default()
            .push_back(now);
        self.global.push_back(now);
    }
}

// ---------------------------------------------------------------------------
// PacingManager
// ---------------------------------------------------------------------------

/// FIFO admission controller over the three pacing tiers.
pub struct PacingManager {
    params: PacingParams,
    clock: Arc<dyn Clock>,
    ledger: StateMutex<Ledger>,
    /// FIFO queue: tokio's mutex grants the lock in request order, so
    /// concurrent callers can never overtake one another.
    queue: QueueMutex<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl PacingManager {
    pub fn new(params: PacingParams, clock: Arc<dyn Clock>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        info!(
            identity_window_ms = params.identity_window_ms,
            burst_limit = params.burst_limit,
            burst_window_ms = params.burst_window_ms,
            global_limit = params.global_limit,
            global_window_ms = params.global_window_ms,
            "pacing manager initialised"
        );
        Self {
            params,
            clock,
            ledger: StateMutex::new(Ledger::default()),
            queue: QueueMutex::new(()),
            shutdown_tx,
        }
    }

    /// Wait until the request identified by (`contract_id`, `request_key`)
    /// may be issued. Resolves in admission order; cancelled waits complete
    /// with an `Interrupted` error.
    pub async fn acquire(&self, contract_id: &str, request_key: &str) -> Result<(), EngineError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow() {
            return Err(EngineError::Interrupted {
                context: format!("pacing wait for {request_key}"),
            });
        }

        let _head = self.queue.lock().await;
        let mut waited_total: i64 = 0;

        loop {
            let now = self.clock.now_ms();
            let wait = self
                .ledger
                .lock()
                .required_wait(now, contract_id, request_key, &self.params);

            if wait <= 0 {
                self.ledger
                    .lock()
                    .record_admission(now, contract_id, request_key);
                debug!(contract_id, request_key, waited_ms = waited_total, "request admitted");
                return Ok(());
            }

            if let Some(cap) = self.params.max_wait_ms {
                if waited_total + wait > cap {
                    warn!(contract_id, request_key, wait, cap, "pacing wait exceeds cap");
                    return Err(EngineError::PacingExhausted {
                        request_key: request_key.to_string(),
                        cap_ms: cap as u64,
                    });
                }
            }

            debug!(contract_id, request_key, wait_ms = wait, "pacing wait");
            waited_total += wait;

            tokio::select! {
                _ = self.clock.wait_until(now + wait) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        return Err(EngineError::Interrupted {
                            context: format!("pacing wait for {request_key}"),
                        });
                    }
                }
            }
            // Loop: windows may have slid while we were parked.
        }
    }

    /// Cancel all outstanding and future waits.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Post-prune usage snapshot.
    pub fn status(&self) -> PacingStatus {
        let now = self.clock.now_ms();
        let mut ledger = self.ledger.lock();
        ledger.prune(now, &self.params);
        PacingStatus {
            global_used: ledger.global.len(),
            global_remaining: self.params.global_limit.saturating_sub(ledger.global.len()),
            contract_counts: ledger
                .bursts
                .iter()
                .map(|(k, v)| (k.clone(), v.len()))
                .collect(),
        }
    }

    /// Clear all pacing state.
    pub fn reset(&self) {
        *self.ledger.lock() = Ledger::default();
        debug!("pacing state reset");
    }
}

impl std::fmt::Debug for PacingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status();
        f.debug_struct("PacingManager")
            .field("global_used", &status.global_used)
            .field("global_remaining", &status.global_remaining)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
