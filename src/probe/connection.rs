use std::time::Duration;

use async_trait::async_trait;

use crate::config::NodeConfig;

/// A single probe connection to one database node
///
/// Owned exclusively by that node's monitor; never shared with the caller's
/// operation connection.
#[async_trait]
pub trait ProbeConnection: Send {
    /// Liveness check. A zero timeout means wait indefinitely.
    async fn is_valid(&mut self, timeout: Duration) -> Result<bool, ConnectionError>;

    /// Whether the connection is known to be unusable
    fn is_closed(&self) -> bool;

    /// Close the connection. Failures are for the caller to ignore.
    async fn close(&mut self) -> Result<(), ConnectionError>;
}

/// Opens probe connections from node connection parameters
#[async_trait]
pub trait NodeConnector: Send + Sync {
    async fn connect(&self, node: &NodeConfig) -> Result<Box<dyn ProbeConnection>, ConnectionError>;
}

/// Connection errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection disconnected")]
    Disconnected,
}
