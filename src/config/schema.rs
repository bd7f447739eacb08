use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Node this connection layer is currently attached to
    pub node: NodeConfig,
    /// Watchdog (node monitoring) configuration
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    /// Ordered plugin factory identifiers; first entry runs outermost
    #[serde(default = "default_plugins")]
    pub plugins: Vec<String>,
}

fn default_plugins() -> Vec<String> {
    vec!["node_monitoring".to_string()]
}

// ============================================================================
// Watchdog Configuration
// ============================================================================

/// Node monitoring thresholds
///
/// Re-read on every guarded call, so changes through a `SharedWatchdogConfig`
/// take effect live.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogConfig {
    /// Whether node monitoring is enabled
    #[serde(default = "default_watchdog_enabled")]
    pub enabled: bool,
    /// Grace period after monitoring starts before failures count (milliseconds)
    #[serde(default = "default_failure_detection_time_ms")]
    pub failure_detection_time_ms: u64,
    /// Probe cadence requested by each monitoring session (milliseconds)
    #[serde(default = "default_failure_detection_interval_ms")]
    pub failure_detection_interval_ms: u64,
    /// Consecutive probe failures before a node is judged unhealthy
    #[serde(default = "default_failure_detection_count")]
    pub failure_detection_count: u32,
    /// How long a monitor may sit without sessions before disposing itself (milliseconds)
    #[serde(default = "default_monitor_disposal_time_ms")]
    pub monitor_disposal_time_ms: u64,
}

fn default_watchdog_enabled() -> bool {
    true
}

fn default_failure_detection_time_ms() -> u64 {
    30_000
}

fn default_failure_detection_interval_ms() -> u64 {
    5_000
}

fn default_failure_detection_count() -> u32 {
    3
}

fn default_monitor_disposal_time_ms() -> u64 {
    60_000
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: default_watchdog_enabled(),
            failure_detection_time_ms: default_failure_detection_time_ms(),
            failure_detection_interval_ms: default_failure_detection_interval_ms(),
            failure_detection_count: default_failure_detection_count(),
            monitor_disposal_time_ms: default_monitor_disposal_time_ms(),
        }
    }
}

/// Watchdog settings shared between the connection owner and plugins
pub type SharedWatchdogConfig = Arc<RwLock<WatchdogConfig>>;

pub fn shared_watchdog_config(config: WatchdogConfig) -> SharedWatchdogConfig {
    Arc::new(RwLock::new(config))
}

// ============================================================================
// Node Configuration
// ============================================================================

/// Connection parameters for a single database node
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeConfig {
    /// Hostname or IP
    pub host: String,
    /// Port number
    pub port: u16,
    /// MySQL username
    pub user: String,
    /// MySQL password
    pub password: String,
    /// Default database
    #[serde(default)]
    pub database: Option<String>,
    /// Connect timeout (milliseconds)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl NodeConfig {
    /// Get the canonical address string (host:port)
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Copy of this config with overrides suitable for a probe connection
    ///
    /// Probes open their own connection to the node; they use a short connect
    /// timeout and never select a default database.
    pub fn probe_config(&self) -> Self {
        Self {
            database: None,
            connect_timeout_ms: PROBE_CONNECT_TIMEOUT_MS,
            ..self.clone()
        }
    }
}

const PROBE_CONNECT_TIMEOUT_MS: u64 = 3_000;

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                host: "127.0.0.1".to_string(),
                port: 3306,
                user: "root".to_string(),
                password: String::new(),
                database: None,
                connect_timeout_ms: default_connect_timeout_ms(),
            },
            watchdog: WatchdogConfig::default(),
            plugins: default_plugins(),
        }
    }
}
