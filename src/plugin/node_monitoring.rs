use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::config::{NodeConfig, SharedWatchdogConfig};
use crate::metrics::metrics;
use crate::monitor::{MonitorContext, MonitorService};

use super::{
    ConnectionPlugin, ExecuteError, NodeAliasProvider, Operation, OperationValue, PluginFactory,
    PluginServices,
};

/// How often the watchdog re-checks the session verdict while the operation
/// runs
const VERDICT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Methods that must not be guarded: teardown and cheap local accessors.
/// Aborting `close` would leak the very resource being released.
fn is_exempt(method_name: &str) -> bool {
    matches!(method_name, "close" | "next" | "abort") || method_name.starts_with("get")
}

/// The watchdog plugin
///
/// Runs the rest of the chain on a worker task under an active monitoring
/// session and aborts it as soon as the session judges the node unhealthy,
/// turning a hang into a prompt [`ExecuteError::NodeUnresponsive`].
pub struct NodeMonitoringPlugin {
    next: Arc<dyn ConnectionPlugin>,
    monitor: Arc<MonitorService>,
    watchdog_config: SharedWatchdogConfig,
    current_node: Arc<RwLock<NodeConfig>>,
    aliases: Arc<dyn NodeAliasProvider>,
    /// Canonical addr and key set of the node currently being monitored
    monitored: RwLock<Option<(String, HashSet<String>)>>,
}

impl NodeMonitoringPlugin {
    pub fn new(next: Arc<dyn ConnectionPlugin>, services: &PluginServices) -> Self {
        Self {
            next,
            monitor: services.monitor.clone(),
            watchdog_config: services.watchdog_config.clone(),
            current_node: services.current_node.clone(),
            aliases: services.aliases.clone(),
            monitored: RwLock::new(None),
        }
    }

    /// Key set for `node`, recomputed when the connection moved to a new node
    ///
    /// Node identity is the canonical host:port string. On a change the old
    /// node's sessions are stopped and the new key set is the canonical addr
    /// plus whatever aliases the provider reports; an alias lookup failure
    /// degrades to the canonical addr alone.
    async fn node_keys(&self, node: &NodeConfig, addr: &str) -> HashSet<String> {
        if let Some((last_addr, keys)) = self.monitored.read().as_ref() {
            if last_addr == addr {
                return keys.clone();
            }
        }

        let mut keys = HashSet::from([addr.to_string()]);
        match self.aliases.aliases(node).await {
            Ok(aliases) => keys.extend(aliases),
            Err(e) => {
                trace!(addr = addr, error = %e, "Alias lookup failed, using canonical address only")
            }
        }

        let previous = self
            .monitored
            .write()
            .replace((addr.to_string(), keys.clone()));
        if let Some((old_addr, old_keys)) = previous {
            trace!(from = %old_addr, to = addr, "Connection moved to a new node");
            self.monitor.stop_monitoring_for_node_keys(&old_keys);
        }

        keys
    }

    async fn run_guarded(
        &self,
        node: &NodeConfig,
        keys: HashSet<String>,
        thresholds: (Duration, Duration, u32),
        target: &str,
        method_name: &str,
        operation: Operation,
    ) -> Result<OperationValue, ExecuteError> {
        let (detection_time, interval, count) = thresholds;
        let context = self
            .monitor
            .start_monitoring(keys, node, detection_time, interval, count)?;

        let next = self.next.clone();
        let target_owned = target.to_string();
        let method_owned = method_name.to_string();
        let worker =
            tokio::spawn(
                async move { next.execute(&target_owned, &method_owned, operation).await },
            );

        let mut session = SessionGuard {
            service: self.monitor.clone(),
            context,
            worker,
        };

        loop {
            tokio::select! {
                joined = &mut session.worker => {
                    return match joined {
                        Ok(result) => result,
                        Err(e) => Err(ExecuteError::Worker(e.to_string())),
                    };
                }
                _ = tokio::time::sleep(VERDICT_POLL_INTERVAL) => {
                    if session.context.is_unhealthy() {
                        metrics().operations_aborted_total.inc();
                        warn!(
                            addr = %session.context.node_addr(),
                            method = method_name,
                            "Aborting operation on unhealthy node"
                        );
                        return Err(ExecuteError::NodeUnresponsive {
                            addr: session.context.node_addr().to_string(),
                        });
                    }
                }
            }
        }
    }
}

/// Ties the worker and the monitoring session to the guarded call itself
///
/// Dropping the guard stops the session and cancels the worker, so cleanup
/// also runs when the caller drops the `execute` future mid-flight (timeouts,
/// select). Aborting an already finished worker is a no-op.
struct SessionGuard {
    service: Arc<MonitorService>,
    context: Arc<MonitorContext>,
    worker: JoinHandle<Result<OperationValue, ExecuteError>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.worker.abort();
        self.service.stop_monitoring(&self.context);
    }
}

#[async_trait]
impl ConnectionPlugin for NodeMonitoringPlugin {
    async fn execute(
        &self,
        target: &str,
        method_name: &str,
        operation: Operation,
    ) -> Result<OperationValue, ExecuteError> {
        // Snapshot once per call so live config edits apply to the next call
        let (enabled, detection_time, interval, count) = {
            let cfg = self.watchdog_config.read();
            (
                cfg.enabled,
                Duration::from_millis(cfg.failure_detection_time_ms),
                Duration::from_millis(cfg.failure_detection_interval_ms),
                cfg.failure_detection_count,
            )
        };

        if !enabled || is_exempt(method_name) {
            return self.next.execute(target, method_name, operation).await;
        }

        let node = self.current_node.read().clone();
        let addr = node.addr();
        let keys = self.node_keys(&node, &addr).await;

        self.run_guarded(
            &node,
            keys,
            (detection_time, interval, count),
            target,
            method_name,
            operation,
        )
        .await
    }

    async fn release_resources(&self) {
        self.monitor.release_resources();
        self.next.release_resources().await;
    }
}

pub struct NodeMonitoringPluginFactory;

impl PluginFactory for NodeMonitoringPluginFactory {
    fn id(&self) -> &'static str {
        "node_monitoring"
    }

    fn create(
        &self,
        next: Arc<dyn ConnectionPlugin>,
        services: &PluginServices,
    ) -> Arc<dyn ConnectionPlugin> {
        Arc::new(NodeMonitoringPlugin::new(next, services))
    }
}
