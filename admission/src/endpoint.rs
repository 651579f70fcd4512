use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::controller::{DEGRADE_THRESHOLD, RESTORE_THRESHOLD};

/// Key identifying one physical connection target.
///
/// Networked paths reduce to `scheme://host:port` (default ports applied),
/// cloud paths to `cloud://provider` plus an optional account tag. Paths
/// that reach the same server over the same link share a key and therefore
/// share throttle state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointKey(String);

impl EndpointKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for EndpointKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Mutable portion of the per-endpoint state machine.
///
/// Guarded by one mutex so that streak accounting, limit stepping and the
/// capacity rebuild are serialized per endpoint.
#[derive(Debug)]
pub(crate) struct Adaptive {
    /// Target concurrency, always within `[min_limit, max_limit]`.
    pub current_limit: usize,
    /// Capacity actually installed in the semaphore; trails `current_limit`
    /// until the endpoint reaches a quiescent point.
    pub applied_limit: usize,
    pub consecutive_timeouts: u32,
    pub consecutive_successes: u32,
    pub degraded: bool,
}

#[derive(Debug)]
pub(crate) struct EndpointState {
    pub min_limit: usize,
    pub max_limit: usize,
    pub adaptive: parking_lot::Mutex<Adaptive>,
    pub active: AtomicUsize,
    pub semaphore: Arc<tokio::sync::Semaphore>,
}

impl EndpointState {
    pub fn new(max_limit: usize, min_limit: usize) -> Self {
        Self {
            min_limit,
            max_limit,
            adaptive: parking_lot::Mutex::new(Adaptive {
                current_limit: max_limit,
                applied_limit: max_limit,
                consecutive_timeouts: 0,
                consecutive_successes: 0,
                degraded: false,
            }),
            active: AtomicUsize::new(0),
            semaphore: Arc::new(tokio::sync::Semaphore::new(max_limit)),
        }
    }

    /// Successful round trip: reset the timeout streak, and after
    /// `RESTORE_THRESHOLD` consecutive successes step the limit back up and
    /// clear the degraded flag. The link has proven itself for a full
    /// streak, so extended timeouts end even before the limit is back at
    /// its ceiling.
    pub fn record_success(&self) {
        let mut adaptive = self.adaptive.lock();
        adaptive.consecutive_timeouts = 0;
        adaptive.consecutive_successes += 1;
        if adaptive.consecutive_successes >= RESTORE_THRESHOLD {
            if adaptive.current_limit < self.max_limit {
                adaptive.current_limit += 1;
                adaptive.degraded = false;
                tracing::info!(
                    "endpoint restored one concurrency step, limit now {}/{}",
                    adaptive.current_limit,
                    self.max_limit
                );
            }
            adaptive.consecutive_successes = 0;
        }
    }

    /// Timeout-class failure: reset the success streak, and after
    /// `DEGRADE_THRESHOLD` consecutive timeouts step the limit down and mark
    /// the endpoint degraded.
    pub fn record_timeout(&self) {
        let mut adaptive = self.adaptive.lock();
        adaptive.consecutive_successes = 0;
        adaptive.consecutive_timeouts += 1;
        if adaptive.consecutive_timeouts >= DEGRADE_THRESHOLD {
            if adaptive.current_limit > self.min_limit {
                adaptive.current_limit -= 1;
                adaptive.degraded = true;
                tracing::warn!(
                    "endpoint degraded after repeated timeouts, limit now {} (floor {})",
                    adaptive.current_limit,
                    self.min_limit
                );
            }
            adaptive.consecutive_timeouts = 0;
        }
    }

    /// Bring the semaphore capacity in line with `current_limit`.
    ///
    /// Only runs once the endpoint is quiescent (no active tasks, every
    /// permit back home). Uses permit deltas so that a task slipping in
    /// concurrently can at worst defer the shrink, never inflate capacity.
    pub fn maybe_rebuild(&self) {
        let mut adaptive = self.adaptive.lock();
        self.maybe_rebuild_locked(&mut adaptive);
    }

    pub fn maybe_rebuild_locked(&self, adaptive: &mut Adaptive) {
        if self.active.load(Ordering::Acquire) != 0 {
            return;
        }
        if adaptive.current_limit > adaptive.applied_limit {
            self.semaphore
                .add_permits(adaptive.current_limit - adaptive.applied_limit);
            adaptive.applied_limit = adaptive.current_limit;
        } else if adaptive.current_limit < adaptive.applied_limit {
            let removed = self
                .semaphore
                .forget_permits(adaptive.applied_limit - adaptive.current_limit);
            adaptive.applied_limit -= removed;
        }
    }
}

/// Keeps the in-flight accounting honest across every exit path.
///
/// Dropping the guard first returns the permit (if one was held), then
/// decrements the active count, then rebuilds capacity if this was the last
/// task out. Cancellation of the wrapped future takes exactly this path.
pub(crate) struct InFlightGuard {
    state: Arc<EndpointState>,
    permit: Option<tokio::sync::OwnedSemaphorePermit>,
}

impl InFlightGuard {
    pub fn enter(
        state: Arc<EndpointState>,
        permit: Option<tokio::sync::OwnedSemaphorePermit>,
    ) -> Self {
        state.active.fetch_add(1, Ordering::AcqRel);
        Self { state, permit }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        // the permit must be back in the pool before the count can hit zero
        drop(self.permit.take());
        if self.state.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.state.maybe_rebuild();
        }
    }
}
