//! Plugin (decorator) chain wrapped around database operations
//!
//! Every guarded database call flows through an ordered chain of
//! [`ConnectionPlugin`]s ending in a passthrough terminal that invokes the
//! operation itself. Chains are folded once at construction and never mutated
//! afterwards.

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use thiserror::Error;

use crate::config::{NodeConfig, SharedWatchdogConfig};
use crate::monitor::{MonitorError, MonitorService};
use crate::probe::ConnectionError;

mod manager;
mod node_monitoring;
mod passthrough;

pub use manager::PluginManager;
pub use node_monitoring::{NodeMonitoringPlugin, NodeMonitoringPluginFactory};
pub use passthrough::PassthroughPlugin;

/// Type-erased result of a guarded operation
pub type OperationValue = Box<dyn Any + Send>;

/// A deferred database operation handed down the chain
pub type Operation =
    Box<dyn FnOnce() -> BoxFuture<'static, Result<OperationValue, ExecuteError>> + Send>;

#[derive(Error, Debug)]
pub enum ExecuteError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The watchdog judged the operation's node unhealthy and aborted it
    #[error("Node {addr} is unresponsive")]
    NodeUnresponsive { addr: String },

    /// The spawned worker running the operation panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Worker(String),

    /// Error raised by the operation itself, passed through untouched
    #[error(transparent)]
    Application(#[from] Box<dyn std::error::Error + Send + Sync>),

    /// The operation completed with a value of a type the caller did not ask
    /// for
    #[error("Operation returned a value of an unexpected type")]
    UnexpectedResult,

    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

/// One link in the chain
///
/// A plugin either delegates to `next` (possibly with behavior layered
/// around the call) or short-circuits with an error. The terminal link runs
/// the operation.
#[async_trait]
pub trait ConnectionPlugin: Send + Sync {
    async fn execute(
        &self,
        target: &str,
        method_name: &str,
        operation: Operation,
    ) -> Result<OperationValue, ExecuteError>;

    /// Release held resources. Implementations recurse into `next` and must
    /// tolerate repeated calls.
    async fn release_resources(&self);
}

/// Resolves the alias names a node is reachable under
///
/// Alias sets come from outside the crate (DNS, cluster metadata tables).
/// A failed query is not fatal; callers fall back to the canonical address.
#[async_trait]
pub trait NodeAliasProvider: Send + Sync {
    async fn aliases(&self, node: &NodeConfig) -> Result<HashSet<String>, ConnectionError>;
}

/// Alias provider for deployments without any alias source
pub struct NoAliasProvider;

#[async_trait]
impl NodeAliasProvider for NoAliasProvider {
    async fn aliases(&self, _node: &NodeConfig) -> Result<HashSet<String>, ConnectionError> {
        Ok(HashSet::new())
    }
}

/// Collaborators handed to plugin factories at chain construction
pub struct PluginServices {
    pub monitor: Arc<MonitorService>,
    pub watchdog_config: SharedWatchdogConfig,
    /// The node the wrapped connection currently talks to. Swapped by the
    /// caller on failover.
    pub current_node: Arc<RwLock<NodeConfig>>,
    pub aliases: Arc<dyn NodeAliasProvider>,
}

/// Builds one chain link around the rest of the chain
pub trait PluginFactory: Send + Sync {
    fn id(&self) -> &'static str;

    fn create(
        &self,
        next: Arc<dyn ConnectionPlugin>,
        services: &PluginServices,
    ) -> Arc<dyn ConnectionPlugin>;
}

/// Fold the configured factories into a chain
///
/// The terminal passthrough is built first, then factories wrap it in
/// reverse configuration order so the first-configured plugin sits
/// outermost. An id with no registered factory is an error.
pub fn build_chain(
    plugin_ids: &[String],
    factories: &[Box<dyn PluginFactory>],
    services: &PluginServices,
) -> Result<Arc<dyn ConnectionPlugin>, ExecuteError> {
    let mut head: Arc<dyn ConnectionPlugin> = Arc::new(PassthroughPlugin);

    for id in plugin_ids.iter().rev() {
        let factory = factories
            .iter()
            .find(|f| f.id() == id)
            .ok_or_else(|| ExecuteError::InvalidArgument(format!("Unknown plugin id: {id}")))?;
        head = factory.create(head, services);
    }

    Ok(head)
}
