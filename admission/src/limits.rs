use enum_map::{enum_map, Enum, EnumMap};

/// Transfer protocol a path belongs to.
///
/// `Local` operations are never throttled; the remaining protocols each get
/// their own concurrency baseline via [`ProtocolLimits`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum Protocol {
    Local,
    Smb,
    Sftp,
    Ftp,
    Cloud,
}

/// Scheduling class of a throttled operation.
///
/// `High` work is admitted even when an endpoint's semaphore is exhausted or
/// the endpoint is in exclusive mode; `Low` work queues (or is rejected).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Priority {
    #[default]
    Low,
    High,
}

/// Static concurrency baseline for a protocol.
///
/// `max_concurrent` is the ceiling used when neither a per-endpoint
/// recommendation nor a global user limit applies; `min_concurrent` is the
/// floor adaptive degradation may not cross.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolLimits {
    pub max_concurrent: usize,
    pub min_concurrent: usize,
}

impl ProtocolLimits {
    pub const fn new(max_concurrent: usize, min_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            min_concurrent,
        }
    }
}

/// Default per-protocol limits.
///
/// The `Local` entry is a placeholder; local operations bypass admission
/// control entirely and never instantiate endpoint state.
pub fn default_limits() -> EnumMap<Protocol, ProtocolLimits> {
    enum_map! {
        Protocol::Local => ProtocolLimits::new(0, 0),
        Protocol::Smb => ProtocolLimits::new(8, 4),
        Protocol::Sftp => ProtocolLimits::new(6, 3),
        Protocol::Ftp => ProtocolLimits::new(4, 2),
        Protocol::Cloud => ProtocolLimits::new(8, 4),
    }
}

/// Resolve the effective `(max, min)` pair for one endpoint.
///
/// A per-endpoint thread recommendation wins over the global user network
/// limit, which wins over the protocol baseline. Whenever an override is in
/// play the floor is recomputed as `max(1, max / 2)`.
pub(crate) fn effective_limits(
    base: ProtocolLimits,
    recommended: Option<usize>,
    user_limit: Option<usize>,
) -> (usize, usize) {
    match recommended.or(user_limit) {
        Some(limit) => {
            let max = limit.max(1);
            (max, (max / 2).max(1))
        }
        None => {
            let max = base.max_concurrent.max(1);
            (max, base.min_concurrent.clamp(1, max))
        }
    }
}
