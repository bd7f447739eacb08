use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::config::NodeConfig;

use super::context::MonitorContext;
use super::registry::MonitoringRuntime;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Cannot monitor a node with an empty key set")]
    EmptyNodeKeys,
}

/// Session API over the monitoring runtime
///
/// One service per consumer (typically per plugin instance). Holds a runtime
/// reference for its lifetime; dropping the last service shuts the runtime
/// down.
pub struct MonitorService {
    runtime: Arc<MonitoringRuntime>,
    released: AtomicBool,
}

impl MonitorService {
    pub fn new(runtime: Arc<MonitoringRuntime>) -> Self {
        runtime.acquire();
        Self {
            runtime,
            released: AtomicBool::new(false),
        }
    }

    /// Begin a monitoring session for a node
    ///
    /// Resolves (or creates) the monitor for the node's key set and registers
    /// a fresh context carrying the caller's thresholds. Fails fast on an
    /// empty key set since such a session could never be stopped or matched.
    pub fn start_monitoring(
        &self,
        node_keys: HashSet<String>,
        node: &NodeConfig,
        failure_detection_time: Duration,
        failure_detection_interval: Duration,
        failure_detection_count: u32,
    ) -> Result<Arc<MonitorContext>, MonitorError> {
        if node_keys.is_empty() {
            return Err(MonitorError::EmptyNodeKeys);
        }

        let context = Arc::new(MonitorContext::new(
            node_keys.clone(),
            node.addr(),
            failure_detection_time,
            failure_detection_interval,
            failure_detection_count,
        ));

        // Resolution and registration are one atomic step; an idle monitor
        // past its disposal window cannot slip away in between
        self.runtime
            .register_context(&node_keys, node, context.clone());

        debug!(
            addr = %node.addr(),
            context_id = context.id(),
            "Monitoring session started"
        );
        Ok(context)
    }

    /// End a monitoring session; ending one already ended is a no-op
    pub fn stop_monitoring(&self, context: &MonitorContext) {
        if let Some(monitor) = self.runtime.monitor_for_keys(context.node_keys()) {
            monitor.stop_monitoring(context);
        }
    }

    /// End every session (from any consumer) whose key set intersects `keys`
    ///
    /// Used when a node's identity changes under a live connection.
    pub fn stop_monitoring_for_node_keys(&self, keys: &HashSet<String>) {
        self.runtime.stop_for_keys(keys);
    }

    /// Release this service's hold on the runtime. Idempotent.
    pub fn release_resources(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.runtime.release();
        }
    }
}

impl Drop for MonitorService {
    fn drop(&mut self) {
        self.release_resources();
    }
}
