//! argus: failover-aware connectivity layer for clustered MySQL
//!
//! Sits between application code and a live database connection. Every
//! database operation flows through an ordered plugin chain; the bundled
//! watchdog plugin keeps a background liveness probe running against the
//! operation's node and aborts operations whose node stops responding,
//! turning multi-minute TCP hangs into prompt errors.
//!
//! Probes are deduplicated: concurrent callers targeting the same node, even
//! under different alias names, share one background monitor.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use argus::config::{shared_watchdog_config, Config};
//! use argus::monitor::{MonitorService, MonitoringRuntime};
//! use argus::plugin::{
//!     ExecuteError, NoAliasProvider, NodeMonitoringPluginFactory, PluginFactory,
//!     PluginManager, PluginServices,
//! };
//!
//! # async fn demo() -> Result<(), ExecuteError> {
//! let config = Config::default();
//! let services = PluginServices {
//!     monitor: Arc::new(MonitorService::new(MonitoringRuntime::with_defaults())),
//!     watchdog_config: shared_watchdog_config(config.watchdog.clone()),
//!     current_node: Arc::new(parking_lot::RwLock::new(config.node.clone())),
//!     aliases: Arc::new(NoAliasProvider),
//! };
//! let factories: Vec<Box<dyn PluginFactory>> = vec![Box::new(NodeMonitoringPluginFactory)];
//! let manager = PluginManager::init(&services, &config.plugins, &factories)?;
//!
//! let rows: u64 = manager
//!     .execute("conn", "executeUpdate", || async {
//!         // run the real statement here
//!         Ok(1)
//!     })
//!     .await?;
//! # let _ = rows;
//! manager.release_resources().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod metrics;
pub mod monitor;
pub mod plugin;
pub mod probe;
pub mod wire;
