use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::storage::errors::StorageError;
use crate::storage::types::CacheData;

use super::types::{CacheStore, InMemoryCacheStore, MemoryEntry};

impl InMemoryCacheStore {
    pub fn new() -> Self {
        tracing::info!("Creating new in-memory session cache store");
        Self {
            entry: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn init(&self) -> Result<(), StorageError> {
        Ok(()) // Nothing to initialize for in-memory store
    }

    async fn put_with_ttl(
        &self,
        key: &str,
        value: CacheData,
        ttl: u64,
    ) -> Result<(), StorageError> {
        if ttl == 0 {
            return Err(StorageError::Storage(
                "TTL must be at least one second".to_string(),
            ));
        }
        let ttl = i64::try_from(ttl)
            .map_err(|_| StorageError::Storage(format!("TTL out of range: {ttl}")))?;
        let expires_at = Utc::now() + Duration::seconds(ttl);

        self.entry.lock().await.insert(
            key.to_string(),
            MemoryEntry {
                data: value,
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<CacheData>, StorageError> {
        let mut entries = self.entry.lock().await;

        let expired = match entries.get(key) {
            Some(entry) => entry.expires_at <= Utc::now(),
            None => return Ok(None),
        };

        if expired {
            tracing::debug!("Evicting expired cache entry: {key}");
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|entry| entry.data.clone()))
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entry.lock().await.remove(key);
        Ok(())
    }
}
