use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use super::{
    build_chain, ConnectionPlugin, ExecuteError, Operation, OperationValue, PluginFactory,
    PluginServices,
};

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Every manager still alive in the process, for shutdown-time cleanup
static LIVE_MANAGERS: Mutex<Vec<(u64, Weak<PluginManager>)>> = Mutex::new(Vec::new());

/// Owner of one immutable plugin chain
///
/// Typically one manager per wrapped connection. The typed [`execute`]
/// surface erases the result through the chain and recovers it on the way
/// out.
///
/// [`execute`]: PluginManager::execute
pub struct PluginManager {
    id: u64,
    head: Arc<dyn ConnectionPlugin>,
    released: AtomicBool,
}

impl PluginManager {
    /// Build the chain from the configured plugin ids and register the
    /// manager for process-wide release
    pub fn init(
        services: &PluginServices,
        plugin_ids: &[String],
        factories: &[Box<dyn PluginFactory>],
    ) -> Result<Arc<Self>, ExecuteError> {
        let head = build_chain(plugin_ids, factories, services)?;
        let manager = Arc::new(Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            head,
            released: AtomicBool::new(false),
        });

        let mut live = LIVE_MANAGERS.lock();
        live.retain(|(_, weak)| weak.strong_count() > 0);
        live.push((manager.id, Arc::downgrade(&manager)));

        debug!(manager_id = manager.id, plugins = ?plugin_ids, "Plugin chain built");
        Ok(manager)
    }

    /// Run `operation` through the chain and recover its typed result
    pub async fn execute<T, F, Fut>(
        &self,
        target: &str,
        method_name: &str,
        operation: F,
    ) -> Result<T, ExecuteError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ExecuteError>> + Send + 'static,
    {
        let erased: Operation = Box::new(move || {
            Box::pin(async move {
                let value = operation().await?;
                Ok(Box::new(value) as OperationValue)
            })
        });

        let value = self.head.execute(target, method_name, erased).await?;
        value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| ExecuteError::UnexpectedResult)
    }

    /// Release the chain's resources and deregister. Idempotent, never
    /// fails.
    pub async fn release_resources(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.head.release_resources().await;
        }
        LIVE_MANAGERS
            .lock()
            .retain(|(id, weak)| *id != self.id && weak.strong_count() > 0);
    }

    /// Release every manager still alive in the process
    pub async fn release_all_resources() {
        let managers: Vec<Arc<PluginManager>> = {
            let mut live = LIVE_MANAGERS.lock();
            let upgraded = live.iter().filter_map(|(_, weak)| weak.upgrade()).collect();
            live.clear();
            upgraded
        };
        for manager in managers {
            manager.release_resources().await;
        }
    }
}
