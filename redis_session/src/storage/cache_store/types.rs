use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::storage::errors::StorageError;
use crate::storage::types::CacheData;

pub(super) struct MemoryEntry {
    pub(super) data: CacheData,
    pub(super) expires_at: DateTime<Utc>,
}

/// Process-local store; entries expire lazily when read.
pub struct InMemoryCacheStore {
    pub(super) entry: Mutex<HashMap<String, MemoryEntry>>,
}

/// Redis-backed store sharing one multiplexed connection across callers.
///
/// A connection that drops is discarded and reopened on the next command.
pub struct RedisCacheStore {
    pub(super) client: redis::Client,
    pub(super) connection: Mutex<Option<redis::aio::MultiplexedConnection>>,
}

/// Key-value backend holding serialized sessions.
///
/// Keys are passed fully formed; namespacing is the caller's job.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Establish the backend connection. Repeated calls reuse the open connection.
    async fn init(&self) -> Result<(), StorageError>;

    /// Write a value and (re)set its expiry in one operation.
    async fn put_with_ttl(
        &self,
        key: &str,
        value: CacheData,
        ttl: u64,
    ) -> Result<(), StorageError>;

    /// Get a value. Expired and missing keys both yield `None`.
    async fn get(&self, key: &str) -> Result<Option<CacheData>, StorageError>;

    /// Remove a key. Removing a missing key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}
