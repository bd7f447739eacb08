use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::NodeConfig;
use crate::metrics::metrics;
use crate::probe::{NodeConnector, ProbeConnection};

use super::context::MonitorContext;
use super::registry::MonitoringRuntime;

static NEXT_MONITOR_ID: AtomicU64 = AtomicU64::new(1);

/// Sleep between emptiness re-checks while the monitor has no sessions
const IDLE_RECHECK: Duration = Duration::from_millis(100);

/// `check_interval_ms` value while no session is registered
const INTERVAL_UNBOUNDED: u64 = u64::MAX;

/// One background probe loop for one distinct node identity
///
/// Owns the probe connection and every active [`MonitorContext`] registered
/// against this node. The loop probes at the shortest interval any session
/// requests and disposes itself after sitting without sessions for the
/// disposal timeout.
pub struct NodeMonitor {
    id: u64,
    node: NodeConfig,
    /// Aliases known to denote this node, merged as callers bring new ones
    known_keys: RwLock<HashSet<String>>,
    contexts: DashMap<u64, Arc<MonitorContext>>,
    check_interval_ms: AtomicU64,
    cancel: CancellationToken,
    connector: Arc<dyn NodeConnector>,
    disposal_timeout: Duration,
}

impl NodeMonitor {
    pub(crate) fn new(
        keys: HashSet<String>,
        node: NodeConfig,
        connector: Arc<dyn NodeConnector>,
        disposal_timeout: Duration,
    ) -> Self {
        Self {
            id: NEXT_MONITOR_ID.fetch_add(1, Ordering::Relaxed),
            node,
            known_keys: RwLock::new(keys),
            contexts: DashMap::new(),
            check_interval_ms: AtomicU64::new(INTERVAL_UNBOUNDED),
            cancel: CancellationToken::new(),
            connector,
            disposal_timeout,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn node_addr(&self) -> String {
        self.node.addr()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Shortest interval among active sessions, None while there are none
    pub fn check_interval_ms(&self) -> Option<u64> {
        match self.check_interval_ms.load(Ordering::Acquire) {
            INTERVAL_UNBOUNDED => None,
            ms => Some(ms),
        }
    }

    pub fn active_context_count(&self) -> usize {
        self.contexts.len()
    }

    pub(crate) fn known_keys(&self) -> HashSet<String> {
        self.known_keys.read().clone()
    }

    pub(crate) fn merge_keys(&self, keys: &HashSet<String>) {
        self.known_keys.write().extend(keys.iter().cloned());
    }

    pub(crate) fn intersects(&self, keys: &HashSet<String>) -> bool {
        let known = self.known_keys.read();
        keys.iter().any(|k| known.contains(k))
    }

    /// Register a session with this monitor
    pub(crate) fn start_monitoring(&self, context: Arc<MonitorContext>) {
        context.reset_start_time();
        self.check_interval_ms
            .fetch_min(context.failure_detection_interval_ms(), Ordering::AcqRel);
        self.contexts.insert(context.id(), context);
        metrics().contexts_active.inc();
    }

    /// Remove a session; removing one that is already gone is a no-op
    pub(crate) fn stop_monitoring(&self, context: &MonitorContext) {
        if self.contexts.remove(&context.id()).is_some() {
            context.mark_inactive();
            self.recompute_interval();
            metrics().contexts_active.dec();
        }
    }

    /// Stop every session whose key set intersects `keys`
    pub(crate) fn stop_contexts_matching(&self, keys: &HashSet<String>) {
        let matching: Vec<Arc<MonitorContext>> = self
            .contexts
            .iter()
            .filter(|e| e.value().intersects(keys))
            .map(|e| e.value().clone())
            .collect();
        for context in matching {
            self.stop_monitoring(&context);
        }
    }

    fn recompute_interval(&self) {
        let min = self
            .contexts
            .iter()
            .map(|e| e.value().failure_detection_interval_ms())
            .min()
            .unwrap_or(INTERVAL_UNBOUNDED);
        self.check_interval_ms.store(min, Ordering::Release);
    }

    /// The probe loop. Runs until cancelled or self-disposed.
    pub(crate) async fn run(self: Arc<Self>, runtime: Weak<MonitoringRuntime>) {
        debug!(addr = %self.node.addr(), monitor_id = self.id, "Monitor loop started");

        let mut conn: Option<Box<dyn ProbeConnection>> = None;
        let mut idle_since: Option<Instant> = None;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            if self.contexts.is_empty() {
                let since = *idle_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= self.disposal_timeout {
                    match runtime.upgrade() {
                        Some(rt) => {
                            if rt.try_dispose(&self) {
                                break;
                            }
                            // A session arrived while we were deciding
                            idle_since = None;
                            continue;
                        }
                        None => break,
                    }
                }
                if self.sleep_cancellable(IDLE_RECHECK).await {
                    break;
                }
                continue;
            }
            idle_since = None;

            let (is_valid, elapsed) = self.probe(&mut conn).await;
            let now = Instant::now();
            for entry in self.contexts.iter() {
                entry.value().update_status(now, is_valid, elapsed);
            }

            let interval = match self.check_interval_ms.load(Ordering::Acquire) {
                INTERVAL_UNBOUNDED => IDLE_RECHECK,
                ms => Duration::from_millis(ms),
            };
            if self.sleep_cancellable(interval.saturating_sub(elapsed)).await {
                break;
            }
        }

        if let Some(mut c) = conn {
            // Close failures are irrelevant at this point
            let _ = c.close().await;
        }
        debug!(addr = %self.node.addr(), monitor_id = self.id, "Monitor loop ended");
    }

    /// Probe node health once
    ///
    /// With no usable probe connection, opening one is itself the probe: a
    /// fresh connection by definition reached the node. With an open one,
    /// run its liveness check bounded by the shortest registered interval
    /// (floored to whole seconds; zero means unbounded).
    async fn probe(&self, conn: &mut Option<Box<dyn ProbeConnection>>) -> (bool, Duration) {
        let reusable = conn.as_ref().map(|c| !c.is_closed()).unwrap_or(false);

        if !reusable {
            *conn = None;
            return match self.connector.connect(&self.node.probe_config()).await {
                Ok(c) => {
                    *conn = Some(c);
                    self.record_probe(true);
                    (true, Duration::ZERO)
                }
                Err(e) => {
                    trace!(addr = %self.node.addr(), error = %e, "Probe connect failed");
                    self.record_probe(false);
                    (false, Duration::ZERO)
                }
            };
        }

        let timeout = match self.check_interval_ms.load(Ordering::Acquire) {
            INTERVAL_UNBOUNDED => Duration::ZERO,
            ms => Duration::from_secs(ms / 1000),
        };

        let Some(c) = conn.as_mut() else {
            return (false, Duration::ZERO);
        };

        let started = Instant::now();
        match c.is_valid(timeout).await {
            Ok(valid) => {
                self.record_probe(valid);
                (valid, started.elapsed())
            }
            Err(e) => {
                trace!(addr = %self.node.addr(), error = %e, "Probe check failed");
                *conn = None;
                self.record_probe(false);
                (false, Duration::ZERO)
            }
        }
    }

    fn record_probe(&self, valid: bool) {
        let label = if valid { "valid" } else { "invalid" };
        metrics().probes_total.with_label_values(&[label]).inc();
    }

    /// Returns true when cancelled during the sleep
    async fn sleep_cancellable(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }
}
