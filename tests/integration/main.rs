//! Integration test entry point
//!
//! Run with: cargo test --test integration
//!
//! These tests exercise the public surface end to end against scripted
//! connectors; no live database is required.

mod abort;
mod dedup;
mod watchdog;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use argus::config::{shared_watchdog_config, NodeConfig, WatchdogConfig};
use argus::monitor::{MonitorService, MonitoringRuntime};
use argus::plugin::{NoAliasProvider, PluginServices};
use argus::probe::{ConnectionError, NodeConnector, ProbeConnection};
use parking_lot::RwLock;

/// Connector whose liveness is flipped from the test body
pub struct FakeConnector {
    pub node_alive: Arc<AtomicBool>,
    pub connects: Arc<AtomicU64>,
}

impl FakeConnector {
    pub fn new(alive: bool) -> Arc<Self> {
        Arc::new(Self {
            node_alive: Arc::new(AtomicBool::new(alive)),
            connects: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn set_alive(&self, alive: bool) {
        self.node_alive.store(alive, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }
}

pub struct FakeConnection {
    node_alive: Arc<AtomicBool>,
    closed: bool,
}

#[async_trait]
impl NodeConnector for FakeConnector {
    async fn connect(
        &self,
        _node: &NodeConfig,
    ) -> Result<Box<dyn ProbeConnection>, ConnectionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.node_alive.load(Ordering::SeqCst) {
            Ok(Box::new(FakeConnection {
                node_alive: self.node_alive.clone(),
                closed: false,
            }))
        } else {
            Err(ConnectionError::Connect("node down".into()))
        }
    }
}

#[async_trait]
impl ProbeConnection for FakeConnection {
    async fn is_valid(&mut self, _timeout: Duration) -> Result<bool, ConnectionError> {
        Ok(self.node_alive.load(Ordering::SeqCst))
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.closed = true;
        Ok(())
    }
}

pub fn test_node(host: &str, port: u16) -> NodeConfig {
    NodeConfig {
        host: host.to_string(),
        port,
        user: "probe".to_string(),
        password: String::new(),
        database: None,
        connect_timeout_ms: 500,
    }
}

pub fn node_keys(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Watchdog thresholds scaled down for tests
pub fn fast_watchdog(interval_ms: u64, count: u32) -> WatchdogConfig {
    WatchdogConfig {
        enabled: true,
        failure_detection_time_ms: 1,
        failure_detection_interval_ms: interval_ms,
        failure_detection_count: count,
        monitor_disposal_time_ms: 60_000,
    }
}

/// Opt-in tracing for debugging test failures: ARGUS_TEST_LOG=debug
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        if let Ok(filter) = std::env::var("ARGUS_TEST_LOG") {
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        }
    });
}

/// Full service bundle over a fake connector
pub fn fake_services(
    watchdog: WatchdogConfig,
    connector: Arc<FakeConnector>,
) -> (PluginServices, Arc<MonitoringRuntime>) {
    fake_services_with_disposal(watchdog, connector, Duration::from_millis(60_000))
}

/// Service bundle with a custom monitor disposal window
pub fn fake_services_with_disposal(
    watchdog: WatchdogConfig,
    connector: Arc<FakeConnector>,
    disposal: Duration,
) -> (PluginServices, Arc<MonitoringRuntime>) {
    init_tracing();
    let runtime = MonitoringRuntime::new(connector, disposal);
    let services = PluginServices {
        monitor: Arc::new(MonitorService::new(runtime.clone())),
        watchdog_config: shared_watchdog_config(watchdog),
        current_node: Arc::new(RwLock::new(test_node("localhost", 3306))),
        aliases: Arc::new(NoAliasProvider),
    };
    (services, runtime)
}
