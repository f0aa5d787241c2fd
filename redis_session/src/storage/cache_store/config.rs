use std::sync::Arc;

use crate::config::{StoreConfig, StoreType};
use crate::storage::errors::StorageError;

use super::types::{CacheStore, InMemoryCacheStore, RedisCacheStore};

/// Build the cache store described by `config`. No connection is opened here.
pub fn build_cache_store(config: &StoreConfig) -> Result<Arc<dyn CacheStore>, StorageError> {
    let store: Arc<dyn CacheStore> = match config.store_type {
        StoreType::Memory => {
            tracing::info!("Initializing session cache store with type: memory");
            Arc::new(InMemoryCacheStore::new())
        }
        StoreType::Redis => {
            let url = config.connection_url();
            tracing::info!(
                "Initializing session cache store with type: redis, scheme: {}, host: {}",
                config.scheme,
                config.host
            );
            let store = RedisCacheStore::open(&url).map_err(|e| {
                tracing::error!("Failed to create Redis client: {}", e);
                e
            })?;
            Arc::new(store)
        }
    };

    Ok(store)
}
