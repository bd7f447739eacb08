//! Probe connections: how a monitor reaches its node
//!
//! The monitoring core only sees the [`ProbeConnection`] and [`NodeConnector`]
//! traits; [`MySqlConnector`] is the shipped implementation. Tests inject
//! their own connectors to script probe outcomes.

mod connection;
mod mysql;

pub use connection::{ConnectionError, NodeConnector, ProbeConnection};
pub use mysql::{MySqlConnector, MySqlProbeConnection};
