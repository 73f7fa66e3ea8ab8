//! Lock store construction

use std::sync::Arc;
use std::time::Duration;

use baton_common::BatonError;
use baton_lock::{LockStore, MemoryLockStore, RedisLockStore};
use tracing::{info, warn};

use crate::model::config::{Configuration, StoreType};

/// Interval of the expired-entry sweep of the in-process store
const MEMORY_CLEANUP_INTERVAL: Duration = Duration::from_secs(5);

/// Build the configured lock store. Must be called inside the runtime.
pub fn build_lock_store(
    configuration: &Configuration,
) -> baton_common::Result<Arc<dyn LockStore>> {
    let store: Arc<dyn LockStore> = match configuration.store_type()? {
        StoreType::Redis => {
            let redis = configuration.redis_config()?;
            info!(
                address = %redis.address(),
                database = redis.database,
                "Using Redis lock store"
            );
            let store = RedisLockStore::new(redis)
                .map_err(|e| BatonError::ConfigError(format!("invalid Redis settings: {}", e)))?;
            Arc::new(store)
        }
        StoreType::Memory => {
            warn!("Using in-process lock store, instances in other processes are not coordinated");
            Arc::new(MemoryLockStore::new().with_cleanup(MEMORY_CLEANUP_INTERVAL))
        }
    };
    Ok(store)
}

/// Check the store once at startup.
///
/// Failure is not fatal: elections fail closed until the store recovers.
pub async fn check_lock_store(store: &dyn LockStore) -> bool {
    match store.ping().await {
        Ok(()) => {
            info!(backend = store.backend(), "Lock store reachable");
            true
        }
        Err(e) => {
            warn!(
                backend = store.backend(),
                error = %e,
                "Lock store unreachable at startup, elections will fail until it recovers"
            );
            false
        }
    }
}
