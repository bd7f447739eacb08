use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::NodeConfig;
use crate::metrics::metrics;
use crate::probe::{MySqlConnector, NodeConnector};

use super::context::MonitorContext;
use super::node::NodeMonitor;

/// Shared monitoring runtime: node identity -> monitor map plus the tasks
/// running their probe loops
///
/// Explicitly constructed and injected rather than a process-wide singleton.
/// Reference counted across [`MonitorService`](super::MonitorService)
/// instances; the last release tears everything down.
pub struct MonitoringRuntime {
    /// Every known alias of a monitored node maps to its monitor
    monitors: DashMap<String, Arc<NodeMonitor>>,
    /// Probe loop task per monitor id
    tasks: DashMap<u64, JoinHandle<()>>,
    /// Serializes resolution and disposal so overlapping key sets cannot
    /// race into two monitors for one node
    resolution_lock: Mutex<()>,
    connector: Arc<dyn NodeConnector>,
    disposal_timeout: Duration,
    ref_count: AtomicUsize,
}

impl MonitoringRuntime {
    pub fn new(connector: Arc<dyn NodeConnector>, disposal_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            monitors: DashMap::new(),
            tasks: DashMap::new(),
            resolution_lock: Mutex::new(()),
            connector,
            disposal_timeout,
            ref_count: AtomicUsize::new(0),
        })
    }

    /// Runtime probing over MySQL with the default disposal window
    pub fn with_defaults() -> Arc<Self> {
        Self::new(Arc::new(MySqlConnector), Duration::from_millis(60_000))
    }

    pub(crate) fn acquire(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release(&self) {
        if self.ref_count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shutdown();
        }
    }

    /// Number of distinct monitors currently registered
    pub fn monitor_count(&self) -> usize {
        let mut seen = HashSet::new();
        for entry in self.monitors.iter() {
            seen.insert(entry.value().id());
        }
        seen.len()
    }

    /// Resolve the monitor for a key set, creating one if no existing
    /// monitor's known keys intersect it
    ///
    /// Overlapping concurrent calls are serialized so one node never gets
    /// two probe loops; on reuse the requested keys are merged into the
    /// monitor's identity and indexed as aliases.
    pub(crate) fn get_or_create(
        self: &Arc<Self>,
        keys: &HashSet<String>,
        node: &NodeConfig,
    ) -> Arc<NodeMonitor> {
        let _guard = self.resolution_lock.lock();
        self.resolve_locked(keys, node)
    }

    /// Resolve the monitor for a key set and register the context on it in
    /// one step
    ///
    /// Registration shares the resolution lock with [`try_dispose`], so a
    /// monitor cannot dispose itself between being resolved and receiving
    /// the context.
    ///
    /// [`try_dispose`]: MonitoringRuntime::try_dispose
    pub(crate) fn register_context(
        self: &Arc<Self>,
        keys: &HashSet<String>,
        node: &NodeConfig,
        context: Arc<MonitorContext>,
    ) -> Arc<NodeMonitor> {
        let _guard = self.resolution_lock.lock();
        let monitor = self.resolve_locked(keys, node);
        monitor.start_monitoring(context);
        monitor
    }

    /// Caller holds the resolution lock
    fn resolve_locked(
        self: &Arc<Self>,
        keys: &HashSet<String>,
        node: &NodeConfig,
    ) -> Arc<NodeMonitor> {
        let existing = keys
            .iter()
            .find_map(|k| self.monitors.get(k).map(|e| e.value().clone()))
            .filter(|m| !m.is_cancelled());

        if let Some(monitor) = existing {
            monitor.merge_keys(keys);
            for key in keys {
                self.monitors.insert(key.clone(), monitor.clone());
            }
            debug!(addr = %monitor.node_addr(), monitor_id = monitor.id(), "Reusing monitor");
            return monitor;
        }

        let monitor = Arc::new(NodeMonitor::new(
            keys.clone(),
            node.clone(),
            self.connector.clone(),
            self.disposal_timeout,
        ));
        for key in keys {
            self.monitors.insert(key.clone(), monitor.clone());
        }

        let task = tokio::spawn(monitor.clone().run(Arc::downgrade(self)));
        self.tasks.insert(monitor.id(), task);
        metrics().monitors_active.inc();

        info!(addr = %monitor.node_addr(), monitor_id = monitor.id(), "Monitor created");
        monitor
    }

    /// Find the monitor whose known keys intersect `keys`, if any
    pub(crate) fn monitor_for_keys(&self, keys: &HashSet<String>) -> Option<Arc<NodeMonitor>> {
        keys.iter()
            .find_map(|k| self.monitors.get(k).map(|e| e.value().clone()))
    }

    /// Stop every session across all monitors whose key set intersects `keys`
    pub(crate) fn stop_for_keys(&self, keys: &HashSet<String>) {
        let mut seen = HashSet::new();
        for key in keys {
            if let Some(entry) = self.monitors.get(key) {
                let monitor = entry.value().clone();
                drop(entry);
                if seen.insert(monitor.id()) {
                    monitor.stop_contexts_matching(keys);
                }
            }
        }
    }

    /// Deregister an idle monitor. Refuses when sessions re-appeared since
    /// the monitor decided to dispose itself.
    pub(crate) fn try_dispose(&self, monitor: &NodeMonitor) -> bool {
        let _guard = self.resolution_lock.lock();

        if monitor.active_context_count() > 0 {
            return false;
        }

        self.monitors.retain(|_, m| m.id() != monitor.id());
        // Dropping the handle detaches the (terminating) task
        self.tasks.remove(&monitor.id());
        metrics().monitors_active.dec();

        info!(addr = %monitor.node_addr(), monitor_id = monitor.id(), "Monitor disposed after idle timeout");
        true
    }

    /// Cancel every monitor, abort undone tasks, clear all maps
    pub(crate) fn shutdown(&self) {
        let _guard = self.resolution_lock.lock();

        let mut seen = HashSet::new();
        for entry in self.monitors.iter() {
            let monitor = entry.value();
            if seen.insert(monitor.id()) {
                monitor.cancel_token().cancel();
                metrics().monitors_active.dec();
            }
        }
        self.monitors.clear();

        let ids: Vec<u64> = self.tasks.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, handle)) = self.tasks.remove(&id) {
                handle.abort();
            }
        }

        debug!("Monitoring runtime shut down");
    }
}
