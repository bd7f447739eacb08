use async_trait::async_trait;
use tracing::trace;

use super::{ConnectionPlugin, ExecuteError, Operation, OperationValue};

/// Terminal chain link: runs the operation itself
pub struct PassthroughPlugin;

#[async_trait]
impl ConnectionPlugin for PassthroughPlugin {
    async fn execute(
        &self,
        target: &str,
        method_name: &str,
        operation: Operation,
    ) -> Result<OperationValue, ExecuteError> {
        trace!(target = target, method = method_name, "Entering operation");
        let result = operation().await;
        match &result {
            Ok(_) => trace!(target = target, method = method_name, "Exiting operation"),
            Err(e) => trace!(
                target = target,
                method = method_name,
                error = %e,
                "Exiting operation with error"
            ),
        }
        result
    }

    async fn release_resources(&self) {}
}
