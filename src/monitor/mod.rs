//! Node health monitoring
//!
//! This module provides:
//! - Monitoring sessions ([`MonitorContext`]) carrying per-caller thresholds
//! - One background probe loop per distinct node identity ([`NodeMonitor`])
//! - Deduplication across callers whose node key sets overlap
//!   ([`MonitoringRuntime`])
//! - The session API used by plugins ([`MonitorService`])

mod context;
mod node;
mod registry;
mod service;

pub use context::MonitorContext;
pub use node::NodeMonitor;
pub use registry::MonitoringRuntime;
pub use service::{MonitorError, MonitorService};
