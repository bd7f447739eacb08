use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{info, warn};

/// Process-wide counter for session ids
static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// One caller's monitoring session for one node
///
/// Created by [`MonitorService::start_monitoring`](super::MonitorService),
/// mutated only by the owning monitor's probe loop; callers poll the health
/// verdict through atomics.
pub struct MonitorContext {
    id: u64,
    node_keys: HashSet<String>,
    node_addr: String,
    failure_detection_time: Duration,
    failure_detection_interval: Duration,
    failure_detection_count: u32,
    /// Re-stamped by the owning monitor when the session is registered
    start_time: RwLock<Instant>,
    failure_count: AtomicU32,
    unhealthy: AtomicBool,
    active: AtomicBool,
}

impl MonitorContext {
    pub fn new(
        node_keys: HashSet<String>,
        node_addr: String,
        failure_detection_time: Duration,
        failure_detection_interval: Duration,
        failure_detection_count: u32,
    ) -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            node_keys,
            node_addr,
            failure_detection_time,
            failure_detection_interval,
            failure_detection_count,
            start_time: RwLock::new(Instant::now()),
            failure_count: AtomicU32::new(0),
            unhealthy: AtomicBool::new(false),
            active: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn node_keys(&self) -> &HashSet<String> {
        &self.node_keys
    }

    pub fn node_addr(&self) -> &str {
        &self.node_addr
    }

    /// Probe cadence this session requests (milliseconds)
    pub fn failure_detection_interval_ms(&self) -> u64 {
        self.failure_detection_interval.as_millis() as u64
    }

    /// Whether the node has crossed this session's failure threshold
    pub fn is_unhealthy(&self) -> bool {
        self.unhealthy.load(Ordering::Acquire)
    }

    /// Whether the session is still registered with a monitor
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn mark_inactive(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Consecutive invalid probes observed so far
    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Acquire)
    }

    pub(crate) fn reset_start_time(&self) {
        *self.start_time.write() = Instant::now();
    }

    /// Whether this session's key set shares a key with `keys`
    pub fn intersects(&self, keys: &HashSet<String>) -> bool {
        self.node_keys.iter().any(|k| keys.contains(k))
    }

    /// Fold one probe verdict into the session state
    ///
    /// Verdicts are ignored during the grace period. A probe that nominally
    /// succeeded but took longer than the requested interval counts as
    /// invalid: a node that slow is in trouble.
    pub(crate) fn update_status(&self, now: Instant, is_valid: bool, probe_elapsed: Duration) {
        let start = *self.start_time.read();
        if now.saturating_duration_since(start) <= self.failure_detection_time {
            return;
        }

        let valid = is_valid && probe_elapsed <= self.failure_detection_interval;
        if valid {
            self.failure_count.store(0, Ordering::Release);
            if self.unhealthy.swap(false, Ordering::AcqRel) {
                info!(addr = %self.node_addr, "Node recovered");
            }
            return;
        }

        let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.failure_detection_count
            && !self.unhealthy.swap(true, Ordering::AcqRel)
        {
            warn!(
                addr = %self.node_addr,
                failures = failures,
                threshold = self.failure_detection_count,
                "Node judged unhealthy"
            );
        }
    }
}
