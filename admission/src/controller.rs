use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use enum_map::EnumMap;
use tracing::instrument;

use crate::endpoint::{EndpointKey, EndpointState, InFlightGuard};
use crate::limits::{default_limits, effective_limits, Priority, Protocol, ProtocolLimits};

/// Consecutive timeout-class failures before a one-step degrade.
pub const DEGRADE_THRESHOLD: u32 = 3;
/// Consecutive successes before a one-step restore.
pub const RESTORE_THRESHOLD: u32 = 10;
/// Read buffer used by strategies when no endpoint recommendation exists.
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

/// Classification seam between the controller and the caller's error type.
///
/// `with_throttle` never inspects errors beyond this trait: `is_timeout`
/// feeds the degrade accounting, `rejected` constructs the cancellation-class
/// error returned when exclusive mode turns low-priority work away.
pub trait ThrottleError {
    fn is_timeout(&self) -> bool;
    fn rejected(key: &EndpointKey) -> Self;
}

#[derive(Debug, Default)]
struct Tuning {
    user_network_limit: Option<usize>,
}

/// Adaptive admission control, one state machine per remote endpoint.
///
/// Endpoint state is created lazily on first use and dropped whenever a
/// tuning change invalidates it; in-flight guards keep an `Arc` to the state
/// they entered, so clearing the registry never corrupts accounting.
#[derive(Debug)]
pub struct AdmissionControl {
    limits: EnumMap<Protocol, ProtocolLimits>,
    endpoints: DashMap<EndpointKey, Arc<EndpointState>>,
    recommended: DashMap<EndpointKey, usize>,
    buffers: DashMap<EndpointKey, usize>,
    exclusive: dashmap::DashSet<EndpointKey>,
    tuning: parking_lot::RwLock<Tuning>,
}

impl Default for AdmissionControl {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionControl {
    pub fn new() -> Self {
        Self::with_limits(default_limits())
    }

    pub fn with_limits(limits: EnumMap<Protocol, ProtocolLimits>) -> Self {
        Self {
            limits,
            endpoints: DashMap::new(),
            recommended: DashMap::new(),
            buffers: DashMap::new(),
            exclusive: dashmap::DashSet::new(),
            tuning: parking_lot::RwLock::new(Tuning::default()),
        }
    }

    /// Run `op` under the endpoint's admission gate.
    ///
    /// `Local` operations run inline and never create state. Low-priority
    /// work queues on the endpoint semaphore (or is rejected outright while
    /// exclusive mode is active); high-priority work runs even when the
    /// semaphore is exhausted. The outcome of `op` feeds the adaptive limit:
    /// timeouts degrade, sustained success restores. Accounting is released
    /// by a drop guard, so cancelling the returned future mid-operation
    /// cannot leak a slot.
    #[instrument(level = "debug", skip(self, op))]
    pub async fn with_throttle<T, E, F, Fut>(
        &self,
        protocol: Protocol,
        key: &EndpointKey,
        priority: Priority,
        op: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ThrottleError,
    {
        if protocol == Protocol::Local {
            return op().await;
        }
        if priority == Priority::Low && self.exclusive.contains(key) {
            tracing::debug!("rejecting low-priority work, endpoint is in exclusive mode");
            return Err(E::rejected(key));
        }
        let state = self.state_for(protocol, key);
        let permit = match priority {
            Priority::High => state.semaphore.clone().try_acquire_owned().ok(),
            Priority::Low => Some(state.semaphore.clone().acquire_owned().await.unwrap()),
        };
        if permit.is_none() {
            tracing::debug!("endpoint saturated, admitting high-priority work unthrottled");
        }
        let _guard = InFlightGuard::enter(state.clone(), permit);
        let result = op().await;
        match &result {
            Ok(_) => state.record_success(),
            Err(error) if error.is_timeout() => state.record_timeout(),
            // the endpoint answered; a non-stall failure says nothing about
            // link health, so neither streak moves
            Err(_) => {}
        }
        result
    }

    /// Global concurrency ceiling chosen by the user (`None` lifts it).
    ///
    /// Clears all endpoint state so the new ceiling applies immediately.
    pub fn set_user_network_limit(&self, limit: Option<usize>) {
        self.tuning.write().user_network_limit = limit;
        self.endpoints.clear();
        tracing::info!("user network limit set to {limit:?}, endpoint state cleared");
    }

    /// Per-endpoint concurrency recommendation (`0` removes it).
    ///
    /// Clears that endpoint's state so the next operation starts from the
    /// recommended ceiling.
    pub fn set_recommended_threads(&self, key: &EndpointKey, threads: usize) {
        if threads == 0 {
            self.recommended.remove(key);
        } else {
            self.recommended.insert(key.clone(), threads);
        }
        self.endpoints.remove(key);
    }

    /// Per-endpoint read-buffer recommendation in bytes (`0` removes it).
    pub fn set_recommended_buffer_size(&self, key: &EndpointKey, bytes: usize) {
        if bytes == 0 {
            self.buffers.remove(key);
        } else {
            self.buffers.insert(key.clone(), bytes);
        }
    }

    /// Read buffer strategies should use against this endpoint.
    pub fn buffer_size(&self, key: &EndpointKey) -> usize {
        self.buffers
            .get(key)
            .map_or(DEFAULT_BUFFER_SIZE, |entry| *entry)
    }

    /// Reserve the endpoint for high-priority work only.
    ///
    /// Exclusive mode is tuning, not adaptive state: it survives state
    /// clears and needs no throttle state to exist.
    pub fn activate_exclusive_mode(&self, key: &EndpointKey) {
        self.exclusive.insert(key.clone());
        tracing::info!("exclusive mode activated for {key}");
    }

    pub fn deactivate_exclusive_mode(&self, key: &EndpointKey) {
        self.exclusive.remove(key);
    }

    /// Drop the endpoint's state entirely, zeroing active-task accounting.
    ///
    /// Guards still in flight finish against the orphaned state and are
    /// invisible to the fresh one.
    pub fn force_reset(&self, key: &EndpointKey) {
        self.endpoints.remove(key);
        tracing::info!("throttle state reset for {key}");
    }

    /// Whether repeated stalls degraded the endpoint and no restore step
    /// has happened since. Strategies use this to pick extended timeouts.
    pub fn is_degraded(&self, key: &EndpointKey) -> bool {
        self.endpoints
            .get(key)
            .is_some_and(|state| state.adaptive.lock().degraded)
    }

    /// Current adaptive limit, `None` when the endpoint holds no state.
    pub fn current_limit(&self, key: &EndpointKey) -> Option<usize> {
        self.endpoints
            .get(key)
            .map(|state| state.adaptive.lock().current_limit)
    }

    /// Operations currently in flight against the endpoint.
    pub fn active_tasks(&self, key: &EndpointKey) -> usize {
        self.endpoints
            .get(key)
            .map_or(0, |state| state.active.load(Ordering::Acquire))
    }

    /// Number of endpoints with live throttle state.
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    fn state_for(&self, protocol: Protocol, key: &EndpointKey) -> Arc<EndpointState> {
        if let Some(state) = self.endpoints.get(key) {
            return state.clone();
        }
        let recommended = self.recommended.get(key).map(|entry| *entry);
        let user_limit = self.tuning.read().user_network_limit;
        let (max_limit, min_limit) = effective_limits(self.limits[protocol], recommended, user_limit);
        self.endpoints
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::debug!(
                    "creating {protocol} throttle state for {key}: limit {max_limit} (floor {min_limit})"
                );
                Arc::new(EndpointState::new(max_limit, min_limit))
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    enum TestError {
        Timeout,
        Plain,
        Rejected,
    }

    impl ThrottleError for TestError {
        fn is_timeout(&self) -> bool {
            matches!(self, TestError::Timeout)
        }

        fn rejected(_key: &EndpointKey) -> Self {
            TestError::Rejected
        }
    }

    async fn run_outcome(
        control: &AdmissionControl,
        protocol: Protocol,
        key: &EndpointKey,
        outcome: Result<(), TestError>,
    ) -> Result<(), TestError> {
        control
            .with_throttle(protocol, key, Priority::Low, move || async move { outcome })
            .await
    }

    async fn wait_for_active(control: &AdmissionControl, key: &EndpointKey, expected: usize) {
        while control.active_tasks(key) != expected {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn local_operations_bypass_the_registry() {
        let control = AdmissionControl::new();
        let key = EndpointKey::from("local");
        let result = run_outcome(&control, Protocol::Local, &key, Ok(())).await;
        assert!(result.is_ok());
        assert_eq!(control.endpoint_count(), 0);
        assert_eq!(control.current_limit(&key), None);
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn repeated_timeouts_step_the_limit_down() {
        let control = AdmissionControl::new();
        let key = EndpointKey::from("smb://10.0.0.5:445");
        control.set_recommended_threads(&key, 2);
        for _ in 0..DEGRADE_THRESHOLD {
            let result =
                run_outcome(&control, Protocol::Smb, &key, Err(TestError::Timeout)).await;
            assert_eq!(result.unwrap_err(), TestError::Timeout);
        }
        assert_eq!(control.current_limit(&key), Some(1));
        assert!(control.is_degraded(&key));
        assert!(logs_contain("endpoint degraded after repeated timeouts"));
        // further stalls stay clamped at the floor
        for _ in 0..DEGRADE_THRESHOLD {
            run_outcome(&control, Protocol::Smb, &key, Err(TestError::Timeout))
                .await
                .unwrap_err();
        }
        assert_eq!(control.current_limit(&key), Some(1));
        assert!(control.is_degraded(&key));
    }

    #[tokio::test]
    async fn sustained_success_restores_the_limit() {
        let control = AdmissionControl::new();
        let key = EndpointKey::from("smb://10.0.0.5:445");
        control.set_recommended_threads(&key, 2);
        for _ in 0..DEGRADE_THRESHOLD {
            run_outcome(&control, Protocol::Smb, &key, Err(TestError::Timeout))
                .await
                .unwrap_err();
        }
        assert_eq!(control.current_limit(&key), Some(1));
        for _ in 0..RESTORE_THRESHOLD {
            run_outcome(&control, Protocol::Smb, &key, Ok(())).await.unwrap();
        }
        assert_eq!(control.current_limit(&key), Some(2));
        assert!(!control.is_degraded(&key));
    }

    #[tokio::test]
    async fn a_timeout_breaks_the_success_streak() {
        let control = AdmissionControl::new();
        let key = EndpointKey::from("sftp://files.example.com:22");
        control.set_recommended_threads(&key, 2);
        for _ in 0..DEGRADE_THRESHOLD {
            run_outcome(&control, Protocol::Sftp, &key, Err(TestError::Timeout))
                .await
                .unwrap_err();
        }
        // nine successes, one stall, nine successes: no restore
        for _ in 0..(RESTORE_THRESHOLD - 1) {
            run_outcome(&control, Protocol::Sftp, &key, Ok(())).await.unwrap();
        }
        run_outcome(&control, Protocol::Sftp, &key, Err(TestError::Timeout))
            .await
            .unwrap_err();
        for _ in 0..(RESTORE_THRESHOLD - 1) {
            run_outcome(&control, Protocol::Sftp, &key, Ok(())).await.unwrap();
        }
        assert_eq!(control.current_limit(&key), Some(1));
        assert!(control.is_degraded(&key));
    }

    #[tokio::test]
    async fn plain_failures_leave_both_streaks_alone() {
        let control = AdmissionControl::new();
        let key = EndpointKey::from("ftp://mirror.example.com:21");
        control.set_recommended_threads(&key, 2);
        // two stalls, a missing-file error, then a third stall: the
        // interleaved failure is not a link signal and must not shelter a
        // stalling endpoint from the degrade step
        for _ in 0..2 {
            run_outcome(&control, Protocol::Ftp, &key, Err(TestError::Timeout))
                .await
                .unwrap_err();
        }
        run_outcome(&control, Protocol::Ftp, &key, Err(TestError::Plain))
            .await
            .unwrap_err();
        assert_eq!(control.current_limit(&key), Some(2));
        assert!(!control.is_degraded(&key));
        run_outcome(&control, Protocol::Ftp, &key, Err(TestError::Timeout))
            .await
            .unwrap_err();
        assert_eq!(control.current_limit(&key), Some(1));
        assert!(control.is_degraded(&key));
    }

    #[tokio::test]
    async fn plain_failures_do_not_break_the_success_streak() {
        let control = AdmissionControl::new();
        let key = EndpointKey::from("ftp://mirror.example.com:21");
        control.set_recommended_threads(&key, 2);
        for _ in 0..DEGRADE_THRESHOLD {
            run_outcome(&control, Protocol::Ftp, &key, Err(TestError::Timeout))
                .await
                .unwrap_err();
        }
        assert_eq!(control.current_limit(&key), Some(1));
        // nine successes, a permission error, one success: the restore
        // streak survives the interleaved failure
        for _ in 0..(RESTORE_THRESHOLD - 1) {
            run_outcome(&control, Protocol::Ftp, &key, Ok(())).await.unwrap();
        }
        run_outcome(&control, Protocol::Ftp, &key, Err(TestError::Plain))
            .await
            .unwrap_err();
        run_outcome(&control, Protocol::Ftp, &key, Ok(())).await.unwrap();
        assert_eq!(control.current_limit(&key), Some(2));
        assert!(!control.is_degraded(&key));
    }

    #[tokio::test]
    async fn each_restore_step_clears_the_degraded_flag() {
        let control = AdmissionControl::new();
        // default Smb ceiling is 8 with a floor of 4
        let key = EndpointKey::from("smb://10.0.0.5:445");
        for _ in 0..(2 * DEGRADE_THRESHOLD) {
            run_outcome(&control, Protocol::Smb, &key, Err(TestError::Timeout))
                .await
                .unwrap_err();
        }
        assert_eq!(control.current_limit(&key), Some(6));
        assert!(control.is_degraded(&key));
        // one full restore step: still below the ceiling, but the link has
        // proven itself, so extended timeouts end here
        for _ in 0..RESTORE_THRESHOLD {
            run_outcome(&control, Protocol::Smb, &key, Ok(())).await.unwrap();
        }
        assert_eq!(control.current_limit(&key), Some(7));
        assert!(!control.is_degraded(&key));
    }

    #[tokio::test]
    async fn high_priority_is_admitted_when_saturated() {
        let control = Arc::new(AdmissionControl::new());
        let key = EndpointKey::from("sftp://files.example.com:22");
        control.set_recommended_threads(&key, 1);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let holder = {
            let control = control.clone();
            let key = key.clone();
            tokio::spawn(async move {
                control
                    .with_throttle(Protocol::Sftp, &key, Priority::Low, move || async move {
                        release_rx.await.ok();
                        Ok::<_, TestError>(())
                    })
                    .await
            })
        };
        wait_for_active(&control, &key, 1).await;
        // the single permit is taken, yet high-priority work still runs
        let result = control
            .with_throttle(Protocol::Sftp, &key, Priority::High, || async {
                Ok::<_, TestError>(7)
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        release_tx.send(()).unwrap();
        holder.await.unwrap().unwrap();
        assert_eq!(control.active_tasks(&key), 0);
    }

    #[tokio::test]
    async fn exclusive_mode_rejects_low_priority_without_enqueueing() {
        let control = AdmissionControl::new();
        let key = EndpointKey::from("smb://nas.example.com:445");
        control.activate_exclusive_mode(&key);
        let result = run_outcome(&control, Protocol::Smb, &key, Ok(())).await;
        assert_eq!(result.unwrap_err(), TestError::Rejected);
        // rejected before enqueueing: no throttle state was even created
        assert_eq!(control.endpoint_count(), 0);
        let result = control
            .with_throttle(Protocol::Smb, &key, Priority::High, || async {
                Ok::<_, TestError>(())
            })
            .await;
        assert!(result.is_ok());
        control.deactivate_exclusive_mode(&key);
        let result = run_outcome(&control, Protocol::Smb, &key, Ok(())).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn cancelled_work_releases_its_slot() {
        let control = Arc::new(AdmissionControl::new());
        let key = EndpointKey::from("ftp://mirror.example.com:21");
        control.set_recommended_threads(&key, 1);
        let task = {
            let control = control.clone();
            let key = key.clone();
            tokio::spawn(async move {
                control
                    .with_throttle(Protocol::Ftp, &key, Priority::Low, || async {
                        std::future::pending::<Result<(), TestError>>().await
                    })
                    .await
            })
        };
        wait_for_active(&control, &key, 1).await;
        task.abort();
        let _ = task.await;
        assert_eq!(control.active_tasks(&key), 0);
        // the slot is usable again
        let result = run_outcome(&control, Protocol::Ftp, &key, Ok(())).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_shrink_is_deferred_until_quiescent() {
        let control = Arc::new(AdmissionControl::new());
        let key = EndpointKey::from("smb://10.0.0.5:445");
        control.set_recommended_threads(&key, 2);
        let spawn_holder = |rx: tokio::sync::oneshot::Receiver<()>| {
            let control = control.clone();
            let key = key.clone();
            tokio::spawn(async move {
                control
                    .with_throttle(Protocol::Smb, &key, Priority::Low, move || async move {
                        rx.await.ok();
                        Ok::<_, TestError>(())
                    })
                    .await
            })
        };
        let (tx1, rx1) = tokio::sync::oneshot::channel();
        let (tx2, rx2) = tokio::sync::oneshot::channel();
        let holder1 = spawn_holder(rx1);
        let holder2 = spawn_holder(rx2);
        wait_for_active(&control, &key, 2).await;
        // degrade while both permits are out (high priority bypasses the gate)
        for _ in 0..DEGRADE_THRESHOLD {
            control
                .with_throttle(Protocol::Smb, &key, Priority::High, || async {
                    Err::<(), _>(TestError::Timeout)
                })
                .await
                .unwrap_err();
        }
        assert_eq!(control.current_limit(&key), Some(1));
        // not yet quiescent: a freed permit is still usable at the old capacity
        tx1.send(()).unwrap();
        holder1.await.unwrap().unwrap();
        wait_for_active(&control, &key, 1).await;
        run_outcome(&control, Protocol::Smb, &key, Ok(())).await.unwrap();
        // drain to quiescence, capacity rebuilds to the new limit
        tx2.send(()).unwrap();
        holder2.await.unwrap().unwrap();
        wait_for_active(&control, &key, 0).await;
        let (tx3, rx3) = tokio::sync::oneshot::channel();
        let holder3 = spawn_holder(rx3);
        wait_for_active(&control, &key, 1).await;
        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            run_outcome(&control, Protocol::Smb, &key, Ok(())),
        )
        .await;
        assert!(blocked.is_err(), "second task should wait at the shrunk capacity");
        tx3.send(()).unwrap();
        holder3.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn tuning_changes_clear_endpoint_state() {
        let control = AdmissionControl::new();
        let key = EndpointKey::from("sftp://files.example.com:22");
        control.set_recommended_threads(&key, 2);
        for _ in 0..DEGRADE_THRESHOLD {
            run_outcome(&control, Protocol::Sftp, &key, Err(TestError::Timeout))
                .await
                .unwrap_err();
        }
        assert!(control.is_degraded(&key));
        control.set_user_network_limit(Some(4));
        assert_eq!(control.current_limit(&key), None);
        assert!(!control.is_degraded(&key));
        // the per-endpoint recommendation survives and still wins
        run_outcome(&control, Protocol::Sftp, &key, Ok(())).await.unwrap();
        assert_eq!(control.current_limit(&key), Some(2));
        // dropping the recommendation falls back to the user limit
        control.set_recommended_threads(&key, 0);
        run_outcome(&control, Protocol::Sftp, &key, Ok(())).await.unwrap();
        assert_eq!(control.current_limit(&key), Some(4));
    }

    #[tokio::test]
    async fn force_reset_drops_state_but_keeps_tuning() {
        let control = AdmissionControl::new();
        let key = EndpointKey::from("smb://10.0.0.5:445");
        control.set_recommended_threads(&key, 2);
        for _ in 0..DEGRADE_THRESHOLD {
            run_outcome(&control, Protocol::Smb, &key, Err(TestError::Timeout))
                .await
                .unwrap_err();
        }
        control.force_reset(&key);
        assert_eq!(control.current_limit(&key), None);
        run_outcome(&control, Protocol::Smb, &key, Ok(())).await.unwrap();
        assert_eq!(control.current_limit(&key), Some(2));
        assert!(!control.is_degraded(&key));
    }

    #[tokio::test]
    async fn buffer_size_recommendation_round_trips() {
        let control = AdmissionControl::new();
        let key = EndpointKey::from("sftp://files.example.com:22");
        assert_eq!(control.buffer_size(&key), DEFAULT_BUFFER_SIZE);
        control.set_recommended_buffer_size(&key, 1024 * 1024);
        assert_eq!(control.buffer_size(&key), 1024 * 1024);
        control.set_recommended_buffer_size(&key, 0);
        assert_eq!(control.buffer_size(&key), DEFAULT_BUFFER_SIZE);
    }
}
