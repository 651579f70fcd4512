//! Adaptive per-endpoint admission control for transfer operations
//!
//! This crate decides how many operations may run concurrently against each
//! remote endpoint (an SMB server, an SFTP host, a cloud provider account)
//! and adapts that number to the endpoint's observed health. It exists so
//! that a struggling NAS does not get buried under retries while a healthy
//! server is kept busy.
//!
//! # Overview
//!
//! The controller keeps one small state machine per endpoint key:
//!
//! 1. **Admission gate** - a semaphore sized to the endpoint's current limit
//! 2. **Adaptive limit** - walks down one step after [`DEGRADE_THRESHOLD`]
//!    consecutive timeout-class failures, and back up one step after
//!    [`RESTORE_THRESHOLD`] consecutive successes, always clamped to the
//!    endpoint's `[min, max]` range
//! 3. **Degraded flag** - set when the limit steps down, cleared again by
//!    the next restore step, so callers can stretch their I/O timeouts
//!    while the link is shaky
//!
//! State is created lazily on first use, keyed by [`EndpointKey`], and
//! dropped whenever tuning changes invalidate it. Local filesystem work
//! bypasses the crate entirely.
//!
//! # Usage
//!
//! Wrap each remote operation in [`AdmissionControl::with_throttle`]. The
//! error type carries the classification the controller needs via the
//! [`ThrottleError`] trait:
//!
//! ```rust,no_run
//! use admission::{AdmissionControl, EndpointKey, Priority, Protocol, ThrottleError};
//!
//! #[derive(Debug)]
//! struct OpError {
//!     timed_out: bool,
//! }
//!
//! impl ThrottleError for OpError {
//!     fn is_timeout(&self) -> bool {
//!         self.timed_out
//!     }
//!     fn rejected(_key: &EndpointKey) -> Self {
//!         OpError { timed_out: false }
//!     }
//! }
//!
//! async fn example(control: &AdmissionControl) -> Result<u64, OpError> {
//!     let key = EndpointKey::from("smb://10.0.0.5:445");
//!     control
//!         .with_throttle(Protocol::Smb, &key, Priority::Low, || async {
//!             // talk to the server here
//!             Ok(42)
//!         })
//!         .await
//! }
//! ```
//!
//! # Priorities and exclusive mode
//!
//! Low-priority (background) work queues on the endpoint semaphore.
//! High-priority (interactive) work takes a permit when one is free but is
//! admitted regardless, temporarily oversubscribing the endpoint rather
//! than making a user wait. Activating exclusive mode for an endpoint
//! rejects low-priority work up front with a cancellation-class error while
//! letting high-priority work through.
//!
//! # Capacity rebuilds
//!
//! Limit changes take effect in the semaphore only at a quiescent point
//! (no task in flight against the endpoint). Until then the old capacity
//! stays installed; the accounting guard rebuilds it when the last task
//! leaves. Rebuilds move permits by delta (`add_permits` to grow,
//! `forget_permits` to shrink), so concurrent arrivals can only defer a
//! shrink, never inflate the ceiling.
//!
//! # Cancellation safety
//!
//! Every admitted operation is tracked by a drop guard. If the caller's
//! future is cancelled mid-flight the guard still returns the permit and
//! decrements the active count, so an aborted transfer can never leak an
//! admission slot.

mod controller;
mod endpoint;
mod limits;

pub use controller::{
    AdmissionControl, ThrottleError, DEFAULT_BUFFER_SIZE, DEGRADE_THRESHOLD, RESTORE_THRESHOLD,
};
pub use endpoint::EndpointKey;
pub use limits::{default_limits, Priority, Protocol, ProtocolLimits};
